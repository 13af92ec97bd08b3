use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::piece::Player;

/// Board size constant
pub const BOARD_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Self {
        Position { row, col }
    }

    pub fn is_on_board(&self) -> bool {
        self.row < BOARD_SIZE && self.col < BOARD_SIZE
    }

    /// Shift by a signed displacement, `None` if the result leaves the board
    pub fn offset(&self, d_row: isize, d_col: isize) -> Option<Position> {
        let row = self.row.checked_add_signed(d_row)?;
        let col = self.col.checked_add_signed(d_col)?;
        let pos = Position::new(row, col);
        pos.is_on_board().then_some(pos)
    }

    /// Integer midpoint of two cells, rounding each axis down.
    pub fn midpoint(a: Position, b: Position) -> Position {
        Position::new((a.row + b.row) / 2, (a.col + b.col) / 2)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Handle to a piece: its owner plus its index in the owner's roster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PieceId {
    pub owner: Player,
    pub index: usize,
}

impl PieceId {
    pub fn new(owner: Player, index: usize) -> Self {
        PieceId { owner, index }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{0} is outside the 5x5 board")]
pub struct OutOfRange(pub Position);

/// Cell occupancy only; pieces themselves live in the rosters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Board {
    cells: [[Option<PieceId>; BOARD_SIZE]; BOARD_SIZE],
}

impl Board {
    pub fn new() -> Self {
        Board::default()
    }

    pub fn occupant(&self, pos: Position) -> Result<Option<PieceId>, OutOfRange> {
        if pos.is_on_board() {
            Ok(self.cells[pos.row][pos.col])
        } else {
            Err(OutOfRange(pos))
        }
    }

    /// Raw write, callers must have validated the move already.
    pub fn place(&mut self, id: PieceId, pos: Position) {
        self.cells[pos.row][pos.col] = Some(id);
    }

    pub fn clear(&mut self, pos: Position) {
        self.cells[pos.row][pos.col] = None;
    }

    pub fn occupied_cells(&self) -> impl Iterator<Item = (Position, PieceId)> + '_ {
        self.cells.iter().enumerate().flat_map(|(row, cells)| {
            cells
                .iter()
                .enumerate()
                .filter_map(move |(col, cell)| cell.map(|id| (Position::new(row, col), id)))
        })
    }
}
