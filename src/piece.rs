use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::board::Position;

/// The two sides, carried on the wire as slot index 0 or 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Player {
    First,
    Second,
}

impl Player {
    pub const ALL: [Player; 2] = [Player::First, Player::Second];

    pub fn opponent(&self) -> Player {
        match self {
            Player::First => Player::Second,
            Player::Second => Player::First,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Player::First => 0,
            Player::Second => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Player> {
        match index {
            0 => Some(Player::First),
            1 => Some(Player::Second),
            _ => None,
        }
    }

    /// Row direction this side calls "forward": away from its home row.
    pub fn facing(&self) -> isize {
        match self {
            Player::First => 1,
            Player::Second => -1,
        }
    }
}

impl From<Player> for u8 {
    fn from(player: Player) -> u8 {
        player.index() as u8
    }
}

impl TryFrom<u8> for Player {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Player::from_index(value as usize).ok_or_else(|| format!("no player slot {}", value))
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player {}", self.index())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PieceKind {
    Runner,
    JumperStraight,
    JumperDiagonal,
}

impl PieceKind {
    pub fn rule(&self) -> &'static MoveRule {
        &CATALOG[*self as usize]
    }

    pub fn name(&self) -> &'static str {
        match self {
            PieceKind::Runner => "runner",
            PieceKind::JumperStraight => "jumper_straight",
            PieceKind::JumperDiagonal => "jumper_diagonal",
        }
    }

    /// First letter of the names the standard setup gives this kind
    pub fn initial(&self) -> char {
        match self {
            PieceKind::Runner => 'P',
            PieceKind::JumperStraight | PieceKind::JumperDiagonal => 'H',
        }
    }
}

impl fmt::Display for PieceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Direction {
    Left,
    Right,
    Forward,
    Back,
    ForwardLeft,
    ForwardRight,
    BackLeft,
    BackRight,
}

impl Direction {
    pub fn token(&self) -> &'static str {
        match self {
            Direction::Left => "L",
            Direction::Right => "R",
            Direction::Forward => "F",
            Direction::Back => "B",
            Direction::ForwardLeft => "FL",
            Direction::ForwardRight => "FR",
            Direction::BackLeft => "BL",
            Direction::BackRight => "BR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown direction token {0:?}")]
pub struct UnknownDirection(pub String);

impl FromStr for Direction {
    type Err = UnknownDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "L" => Ok(Direction::Left),
            "R" => Ok(Direction::Right),
            "F" => Ok(Direction::Forward),
            "B" => Ok(Direction::Back),
            "FL" => Ok(Direction::ForwardLeft),
            "FR" => Ok(Direction::ForwardRight),
            "BL" => Ok(Direction::BackLeft),
            "BR" => Ok(Direction::BackRight),
            other => Err(UnknownDirection(other.to_string())),
        }
    }
}

impl TryFrom<String> for Direction {
    type Error = UnknownDirection;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Direction> for String {
    fn from(direction: Direction) -> String {
        direction.token().to_string()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stride {
    /// Lands on the adjacent cell, nothing in between
    Step,
    /// Passes over one midpoint cell that may be captured
    Jump,
}

/// Movement rule of one piece kind. Displacements are (row, col) as seen by
/// the first player; the second player's are mirrored through the centre.
#[derive(Debug)]
pub struct MoveRule {
    pub stride: Stride,
    pub moves: &'static [(Direction, isize, isize)],
}

impl MoveRule {
    pub fn directions(&self) -> impl Iterator<Item = Direction> + '_ {
        self.moves.iter().map(|&(direction, _, _)| direction)
    }

    pub fn displacement(&self, direction: Direction, owner: Player) -> Option<(isize, isize)> {
        self.moves
            .iter()
            .find(|&&(d, _, _)| d == direction)
            .map(|&(_, d_row, d_col)| (d_row * owner.facing(), d_col * owner.facing()))
    }

    pub fn is_jump(&self) -> bool {
        self.stride == Stride::Jump
    }
}

// Indexed by `PieceKind as usize`
static CATALOG: [MoveRule; 3] = [
    MoveRule {
        stride: Stride::Step,
        moves: &[
            (Direction::Left, 0, -1),
            (Direction::Right, 0, 1),
            (Direction::Forward, 1, 0),
            (Direction::Back, -1, 0),
        ],
    },
    MoveRule {
        stride: Stride::Jump,
        moves: &[
            (Direction::Left, 0, -2),
            (Direction::Right, 0, 2),
            (Direction::Forward, 2, 0),
            (Direction::Back, -2, 0),
        ],
    },
    MoveRule {
        stride: Stride::Jump,
        moves: &[
            (Direction::ForwardLeft, 2, -1),
            (Direction::ForwardRight, 2, 1),
            (Direction::BackLeft, -2, -1),
            (Direction::BackRight, -2, 1),
        ],
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    pub name: String,
    pub kind: PieceKind,
    pub position: Position,
    pub owner: Player,
}

impl Piece {
    pub fn new(name: impl Into<String>, kind: PieceKind, position: Position, owner: Player) -> Self {
        Piece {
            name: name.into(),
            kind,
            position,
            owner,
        }
    }
}
