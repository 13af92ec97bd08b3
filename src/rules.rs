//! Move legality and capture resolution.
//!
//! [`resolve`] only reads the board. Executing the returned [`Resolution`] is
//! up to the match, which also owns the rosters that captures shrink.

use thiserror::Error;

use crate::board::{Board, PieceId, Position};
use crate::piece::{Direction, Piece, PieceKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("Unknown piece {0:?}")]
    UnknownPiece(String),
    #[error("{direction} is not a legal direction for a {kind}")]
    IllegalDirection { kind: PieceKind, direction: Direction },
    #[error("Moving {direction} from {from} leaves the board")]
    OutOfBounds { from: Position, direction: Direction },
    #[error("Blocked by own piece at {0}")]
    BlockedByOwnPiece(Position),
    #[error("Destination {0} occupied by own piece")]
    DestinationOccupied(Position),
}

impl MoveError {
    /// Input that could never name a move, as opposed to a move the
    /// current position forbids.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            MoveError::UnknownPiece(_) | MoveError::IllegalDirection { .. }
        )
    }
}

/// Everything a validated move changes on the board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub piece: PieceId,
    pub direction: Direction,
    pub from: Position,
    pub to: Position,
    pub captured_at_destination: Option<PieceId>,
    /// Only set for jumping kinds
    pub midpoint: Option<Position>,
    pub captured_at_midpoint: Option<PieceId>,
}

impl Resolution {
    pub fn captures(&self) -> impl Iterator<Item = PieceId> {
        self.captured_at_destination
            .into_iter()
            .chain(self.captured_at_midpoint)
    }
}

fn occupant(board: &Board, pos: Position) -> Option<PieceId> {
    board.occupant(pos).ok().flatten()
}

/// Validate `direction` for the piece `id` and compute its effects.
pub fn resolve(
    board: &Board,
    id: PieceId,
    piece: &Piece,
    direction: Direction,
) -> Result<Resolution, MoveError> {
    let rule = piece.kind.rule();
    let (d_row, d_col) = rule
        .displacement(direction, piece.owner)
        .ok_or(MoveError::IllegalDirection {
            kind: piece.kind,
            direction,
        })?;

    let from = piece.position;
    let to = from
        .offset(d_row, d_col)
        .ok_or(MoveError::OutOfBounds { from, direction })?;

    let mut midpoint = None;
    let mut captured_at_midpoint = None;
    if rule.is_jump() {
        let mid = Position::midpoint(from, to);
        if let Some(other) = occupant(board, mid) {
            if other.owner == piece.owner {
                return Err(MoveError::BlockedByOwnPiece(mid));
            }
            captured_at_midpoint = Some(other);
        }
        midpoint = Some(mid);
    }

    let captured_at_destination = match occupant(board, to) {
        Some(other) if other.owner == piece.owner => {
            return Err(MoveError::DestinationOccupied(to));
        }
        other => other,
    };

    Ok(Resolution {
        piece: id,
        direction,
        from,
        to,
        captured_at_destination,
        midpoint,
        captured_at_midpoint,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::Player;

    /// Place a piece on the board and hand back what `resolve` needs
    fn put(
        board: &mut Board,
        owner: Player,
        index: usize,
        kind: PieceKind,
        pos: Position,
    ) -> (PieceId, Piece) {
        let id = PieceId::new(owner, index);
        board.place(id, pos);
        (id, Piece::new(format!("{}{}", kind.initial(), index), kind, pos, owner))
    }

    #[test]
    fn test_runner_steps_into_empty_cell() {
        let mut board = Board::new();
        let (id, piece) = put(&mut board, Player::First, 0, PieceKind::Runner, Position::new(0, 0));

        let res = resolve(&board, id, &piece, Direction::Right).unwrap();
        assert_eq!(res.to, Position::new(0, 1));
        assert_eq!(res.midpoint, None);
        assert_eq!(res.captures().count(), 0);
    }

    #[test]
    fn test_illegal_direction_for_kind() {
        let mut board = Board::new();
        let (id, piece) = put(&mut board, Player::First, 0, PieceKind::Runner, Position::new(2, 2));
        assert_eq!(
            resolve(&board, id, &piece, Direction::ForwardLeft),
            Err(MoveError::IllegalDirection {
                kind: PieceKind::Runner,
                direction: Direction::ForwardLeft
            })
        );

        let (id, piece) = put(
            &mut board,
            Player::First,
            1,
            PieceKind::JumperDiagonal,
            Position::new(0, 3),
        );
        assert!(matches!(
            resolve(&board, id, &piece, Direction::Forward),
            Err(MoveError::IllegalDirection { .. })
        ));
    }

    #[test]
    fn test_out_of_bounds() {
        let mut board = Board::new();
        let (id, piece) = put(&mut board, Player::First, 0, PieceKind::Runner, Position::new(0, 0));
        assert!(matches!(
            resolve(&board, id, &piece, Direction::Back),
            Err(MoveError::OutOfBounds { .. })
        ));
        assert!(matches!(
            resolve(&board, id, &piece, Direction::Left),
            Err(MoveError::OutOfBounds { .. })
        ));

        let (id, piece) = put(
            &mut board,
            Player::Second,
            0,
            PieceKind::JumperStraight,
            Position::new(1, 4),
        );
        // Second player's forward is towards row 0
        assert!(matches!(
            resolve(&board, id, &piece, Direction::Forward),
            Err(MoveError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_destination_occupied_by_own_piece() {
        let mut board = Board::new();
        let (id, piece) = put(&mut board, Player::First, 0, PieceKind::Runner, Position::new(0, 0));
        put(&mut board, Player::First, 1, PieceKind::Runner, Position::new(0, 1));

        assert_eq!(
            resolve(&board, id, &piece, Direction::Right),
            Err(MoveError::DestinationOccupied(Position::new(0, 1)))
        );
    }

    #[test]
    fn test_runner_captures_at_destination() {
        let mut board = Board::new();
        let (id, piece) = put(&mut board, Player::First, 0, PieceKind::Runner, Position::new(2, 2));
        let (enemy, _) = put(&mut board, Player::Second, 0, PieceKind::Runner, Position::new(3, 2));

        let res = resolve(&board, id, &piece, Direction::Forward).unwrap();
        assert_eq!(res.captured_at_destination, Some(enemy));
        assert_eq!(res.captured_at_midpoint, None);
    }

    #[test]
    fn test_jump_blocked_by_own_midpoint() {
        let mut board = Board::new();
        let (id, piece) = put(
            &mut board,
            Player::First,
            0,
            PieceKind::JumperStraight,
            Position::new(0, 1),
        );
        put(&mut board, Player::First, 1, PieceKind::Runner, Position::new(1, 1));

        assert_eq!(
            resolve(&board, id, &piece, Direction::Forward),
            Err(MoveError::BlockedByOwnPiece(Position::new(1, 1)))
        );
    }

    #[test]
    fn test_jump_captures_midpoint_and_destination() {
        let mut board = Board::new();
        let (id, piece) = put(
            &mut board,
            Player::First,
            0,
            PieceKind::JumperStraight,
            Position::new(0, 1),
        );
        let (mid, _) = put(&mut board, Player::Second, 0, PieceKind::Runner, Position::new(1, 1));
        let (dest, _) = put(&mut board, Player::Second, 1, PieceKind::Runner, Position::new(2, 1));

        let res = resolve(&board, id, &piece, Direction::Forward).unwrap();
        assert_eq!(res.to, Position::new(2, 1));
        assert_eq!(res.midpoint, Some(Position::new(1, 1)));
        assert_eq!(res.captured_at_midpoint, Some(mid));
        assert_eq!(res.captured_at_destination, Some(dest));
        assert_eq!(res.captures().count(), 2);
    }

    #[test]
    fn test_diagonal_jump_midpoint_rounds_down() {
        let mut board = Board::new();
        let (id, piece) = put(
            &mut board,
            Player::First,
            0,
            PieceKind::JumperDiagonal,
            Position::new(0, 3),
        );
        let (enemy, _) = put(&mut board, Player::Second, 0, PieceKind::Runner, Position::new(1, 3));

        let res = resolve(&board, id, &piece, Direction::ForwardRight).unwrap();
        assert_eq!(res.to, Position::new(2, 4));
        assert_eq!(res.midpoint, Some(Position::new(1, 3)));
        assert_eq!(res.captured_at_midpoint, Some(enemy));

        let res = resolve(&board, id, &piece, Direction::ForwardLeft).unwrap();
        assert_eq!(res.to, Position::new(2, 2));
        assert_eq!(res.midpoint, Some(Position::new(1, 2)));
        assert_eq!(res.captured_at_midpoint, None);
    }

    #[test]
    fn test_malformed_classification() {
        assert!(MoveError::UnknownPiece("Z9".to_string()).is_malformed());
        assert!(!MoveError::BlockedByOwnPiece(Position::new(1, 1)).is_malformed());
        assert!(!MoveError::DestinationOccupied(Position::new(1, 1)).is_malformed());
    }
}
