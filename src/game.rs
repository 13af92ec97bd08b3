use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::board::{BOARD_SIZE, Board, PieceId, Position};
use crate::piece::{Direction, Piece, PieceKind, Player};
use crate::rules::{self, MoveError, Resolution};

/// Kinds along each home row, column 0 first
pub const STANDARD_LINEUP: [PieceKind; BOARD_SIZE] = [
    PieceKind::Runner,
    PieceKind::JumperStraight,
    PieceKind::Runner,
    PieceKind::JumperDiagonal,
    PieceKind::Runner,
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("Invalid move: {0}")]
    InvalidMove(#[from] MoveError),
    #[error("Game already over")]
    GameOver,
    #[error("Not your turn")]
    NotYourTurn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// Names a piece or direction that does not exist
    Malformed,
    /// Well formed, but the position forbids it
    Illegal,
    /// Wrong player, or the match is over
    Protocol,
}

impl GameError {
    pub fn kind(&self) -> RejectionKind {
        match self {
            GameError::InvalidMove(e) if e.is_malformed() => RejectionKind::Malformed,
            GameError::InvalidMove(_) => RejectionKind::Illegal,
            GameError::GameOver | GameError::NotYourTurn => RejectionKind::Protocol,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    #[error("{0} is not on the board")]
    OffBoard(Position),
    #[error("Cell {0} is already taken")]
    CellTaken(Position),
    #[error("{owner} already has a piece named {name:?}")]
    DuplicateName { owner: Player, name: String },
    #[error("{0} has no pieces")]
    NoPieces(Player),
}

/// Board cells and rosters disagree about where a piece is
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    #[error("{at} references captured piece {index} of {owner}")]
    CapturedOnBoard { at: Position, owner: Player, index: usize },
    #[error("{at} holds {name} which thinks it is at {recorded}")]
    Misplaced {
        at: Position,
        name: String,
        recorded: Position,
    },
    #[error("{name} of {owner} is missing from {at}")]
    MissingFromBoard {
        owner: Player,
        name: String,
        at: Position,
    },
}

/// A move as submitted by a participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    #[serde(alias = "character_name")]
    pub piece: String,
    pub direction: Direction,
}

impl MoveRequest {
    pub fn new(piece: impl Into<String>, direction: Direction) -> Self {
        MoveRequest {
            piece: piece.into(),
            direction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    AwaitingMove { player: Player },
    Finished { winner: Player },
}

/// What an accepted move did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub player: Player,
    pub piece: String,
    pub direction: Direction,
    pub from: Position,
    pub to: Position,
    pub captured: Vec<String>,
    pub phase: Phase,
}

/// One player's pieces in setup order. Captured pieces leave a hole so the
/// indices held by the board stay valid.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    pieces: Vec<Option<Piece>>,
}

impl Roster {
    pub fn get(&self, index: usize) -> Option<&Piece> {
        self.pieces.get(index).and_then(Option::as_ref)
    }

    pub fn find(&self, name: &str) -> Option<(usize, &Piece)> {
        self.live().find(|(_, piece)| piece.name == name)
    }

    pub fn live(&self) -> impl Iterator<Item = (usize, &Piece)> {
        self.pieces
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|piece| (index, piece)))
    }

    pub fn live_count(&self) -> usize {
        self.pieces.iter().flatten().count()
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut Piece> {
        self.pieces.get_mut(index).and_then(Option::as_mut)
    }

    fn remove(&mut self, index: usize) -> Option<Piece> {
        self.pieces.get_mut(index).and_then(Option::take)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellView {
    pub kind: PieceKind,
    pub name: String,
    pub owner: Player,
    pub row: usize,
    pub col: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalMove {
    pub piece: String,
    pub direction: Direction,
}

/// Snapshot sent to every participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicState {
    pub board: Vec<Vec<Option<CellView>>>,
    pub current_player: Player,
    pub game_over: bool,
    pub winner: Option<Player>,
    pub move_count: usize,
    pub legal_moves: Vec<LegalMove>,
}

/// Builder for a match with an arbitrary starting position
#[derive(Debug, Clone)]
pub struct MatchSetup {
    pieces: Vec<Piece>,
    first_to_move: Player,
}

impl Default for MatchSetup {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchSetup {
    pub fn new() -> Self {
        MatchSetup {
            pieces: Vec::new(),
            first_to_move: Player::First,
        }
    }

    /// Both home rows filled with [`STANDARD_LINEUP`]
    pub fn standard() -> Self {
        let mut setup = Self::new();
        for owner in Player::ALL {
            let row = match owner {
                Player::First => 0,
                Player::Second => BOARD_SIZE - 1,
            };
            for (col, kind) in STANDARD_LINEUP.into_iter().enumerate() {
                let name = format!("{}{}", kind.initial(), col + 1);
                setup = setup.piece(owner, name, kind, Position::new(row, col));
            }
        }
        setup
    }

    pub fn piece(
        mut self,
        owner: Player,
        name: impl Into<String>,
        kind: PieceKind,
        position: Position,
    ) -> Self {
        self.pieces.push(Piece::new(name, kind, position, owner));
        self
    }

    pub fn first_to_move(mut self, player: Player) -> Self {
        self.first_to_move = player;
        self
    }

    pub fn build(self) -> Result<Match, SetupError> {
        let mut cells = HashSet::new();
        let mut names = HashSet::new();
        for piece in &self.pieces {
            if !piece.position.is_on_board() {
                return Err(SetupError::OffBoard(piece.position));
            }
            if !cells.insert(piece.position) {
                return Err(SetupError::CellTaken(piece.position));
            }
            if !names.insert((piece.owner, piece.name.as_str())) {
                return Err(SetupError::DuplicateName {
                    owner: piece.owner,
                    name: piece.name.clone(),
                });
            }
        }
        for player in Player::ALL {
            if !self.pieces.iter().any(|piece| piece.owner == player) {
                return Err(SetupError::NoPieces(player));
            }
        }

        Ok(self.assemble())
    }

    fn assemble(self) -> Match {
        let mut board = Board::new();
        let mut rosters: [Roster; 2] = Default::default();
        for piece in self.pieces {
            let roster = &mut rosters[piece.owner.index()];
            let id = PieceId::new(piece.owner, roster.pieces.len());
            board.place(id, piece.position);
            roster.pieces.push(Some(piece));
        }

        Match {
            board,
            rosters,
            phase: Phase::AwaitingMove {
                player: self.first_to_move,
            },
            move_count: 0,
        }
    }
}

/// The board, both rosters and whose turn it is
#[derive(Debug, Clone)]
pub struct Match {
    board: Board,
    rosters: [Roster; 2],
    phase: Phase,
    move_count: usize,
}

impl Match {
    /// Create a match in the standard starting position
    pub fn new() -> Self {
        MatchSetup::standard().assemble()
    }

    pub fn builder() -> MatchSetup {
        MatchSetup::new()
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// `None` once the match is finished
    pub fn current_player(&self) -> Option<Player> {
        match self.phase {
            Phase::AwaitingMove { player } => Some(player),
            Phase::Finished { .. } => None,
        }
    }

    pub fn winner(&self) -> Option<Player> {
        match self.phase {
            Phase::Finished { winner } => Some(winner),
            Phase::AwaitingMove { .. } => None,
        }
    }

    pub fn is_game_over(&self) -> bool {
        matches!(self.phase, Phase::Finished { .. })
    }

    pub fn move_count(&self) -> usize {
        self.move_count
    }

    pub fn roster(&self, player: Player) -> &Roster {
        &self.rosters[player.index()]
    }

    pub fn piece(&self, id: PieceId) -> Option<&Piece> {
        self.roster(id.owner).get(id.index)
    }

    pub fn find_piece(&self, player: Player, name: &str) -> Option<&Piece> {
        self.roster(player).find(name).map(|(_, piece)| piece)
    }

    pub fn live_pieces(&self, player: Player) -> impl Iterator<Item = &Piece> {
        self.roster(player).live().map(|(_, piece)| piece)
    }

    pub fn live_count(&self, player: Player) -> usize {
        self.roster(player).live_count()
    }

    /// Every move `player` could make right now; empty once the match is over
    pub fn legal_moves(&self, player: Player) -> Vec<LegalMove> {
        if self.is_game_over() {
            return Vec::new();
        }

        let mut moves = Vec::new();
        for (index, piece) in self.roster(player).live() {
            let id = PieceId::new(player, index);
            for direction in piece.kind.rule().directions() {
                if rules::resolve(&self.board, id, piece, direction).is_ok() {
                    moves.push(LegalMove {
                        piece: piece.name.clone(),
                        direction,
                    });
                }
            }
        }
        moves
    }

    /// Apply one move for `player`. Nothing changes unless this returns `Ok`.
    pub fn apply(
        &mut self,
        player: Player,
        request: &MoveRequest,
    ) -> Result<MoveOutcome, GameError> {
        let current = match self.phase {
            Phase::Finished { .. } => return Err(GameError::GameOver),
            Phase::AwaitingMove { player } => player,
        };
        if player != current {
            return Err(GameError::NotYourTurn);
        }

        let (index, piece) = self
            .roster(player)
            .find(&request.piece)
            .ok_or_else(|| MoveError::UnknownPiece(request.piece.clone()))?;
        let resolution = rules::resolve(
            &self.board,
            PieceId::new(player, index),
            piece,
            request.direction,
        )?;

        let captured = self.execute(&resolution);
        self.move_count += 1;

        // Captures only ever hit the opponent, so an empty roster means the
        // mover just won.
        self.phase = if Player::ALL.iter().any(|p| self.live_count(*p) == 0) {
            Phase::Finished { winner: player }
        } else {
            Phase::AwaitingMove {
                player: player.opponent(),
            }
        };

        Ok(MoveOutcome {
            player,
            piece: request.piece.clone(),
            direction: request.direction,
            from: resolution.from,
            to: resolution.to,
            captured,
            phase: self.phase,
        })
    }

    fn execute(&mut self, resolution: &Resolution) -> Vec<String> {
        let mut captured = Vec::new();

        if let Some(target) = resolution.captured_at_destination {
            captured.extend(self.capture(target));
        }

        let id = resolution.piece;
        self.board.clear(resolution.from);
        self.board.place(id, resolution.to);
        if let Some(piece) = self.rosters[id.owner.index()].get_mut(id.index) {
            piece.position = resolution.to;
        }

        if let Some(target) = resolution.captured_at_midpoint {
            captured.extend(self.capture(target));
        }

        captured
    }

    /// Take a piece out of its roster and off the board together
    fn capture(&mut self, id: PieceId) -> Option<String> {
        let piece = self.rosters[id.owner.index()].remove(id.index)?;
        self.board.clear(piece.position);
        Some(piece.name)
    }

    pub fn snapshot(&self) -> PublicState {
        let mut board = vec![vec![None; BOARD_SIZE]; BOARD_SIZE];
        for (pos, id) in self.board.occupied_cells() {
            if let Some(piece) = self.piece(id) {
                board[pos.row][pos.col] = Some(CellView {
                    kind: piece.kind,
                    name: piece.name.clone(),
                    owner: piece.owner,
                    row: pos.row,
                    col: pos.col,
                });
            }
        }

        let (current_player, winner) = match self.phase {
            Phase::AwaitingMove { player } => (player, None),
            // The turn stays with the player who made the last move
            Phase::Finished { winner } => (winner, Some(winner)),
        };

        PublicState {
            board,
            current_player,
            game_over: self.is_game_over(),
            winner,
            move_count: self.move_count,
            legal_moves: self.legal_moves(current_player),
        }
    }

    /// Check that board cells and roster positions describe the same pieces
    pub fn check_consistency(&self) -> Result<(), ConsistencyError> {
        for (pos, id) in self.board.occupied_cells() {
            match self.piece(id) {
                None => {
                    return Err(ConsistencyError::CapturedOnBoard {
                        at: pos,
                        owner: id.owner,
                        index: id.index,
                    });
                }
                Some(piece) if piece.position != pos => {
                    return Err(ConsistencyError::Misplaced {
                        at: pos,
                        name: piece.name.clone(),
                        recorded: piece.position,
                    });
                }
                Some(_) => {}
            }
        }

        for player in Player::ALL {
            for (index, piece) in self.roster(player).live() {
                let id = PieceId::new(player, index);
                if self.board.occupant(piece.position) != Ok(Some(id)) {
                    return Err(ConsistencyError::MissingFromBoard {
                        owner: player,
                        name: piece.name.clone(),
                        at: piece.position,
                    });
                }
            }
        }

        Ok(())
    }

    /// Get a string representation of the board
    pub fn display_board(&self) -> String {
        let mut result = String::new();
        result.push_str("   ");
        for col in 0..BOARD_SIZE {
            result.push_str(&format!("{:2} ", col));
        }
        result.push('\n');

        for row in 0..BOARD_SIZE {
            result.push_str(&format!("{:2} ", row));
            for col in 0..BOARD_SIZE {
                let piece = self
                    .board
                    .occupant(Position::new(row, col))
                    .ok()
                    .flatten()
                    .and_then(|id| self.piece(id));
                let c = match piece {
                    None => '.',
                    Some(piece) => {
                        let c = match piece.kind {
                            PieceKind::Runner => 'r',
                            PieceKind::JumperStraight => 's',
                            PieceKind::JumperDiagonal => 'd',
                        };
                        if piece.owner == Player::First {
                            c.to_ascii_uppercase()
                        } else {
                            c
                        }
                    }
                };
                result.push_str(&format!(" {} ", c));
            }
            result.push('\n');
        }

        result
    }
}

impl Default for Match {
    fn default() -> Self {
        Self::new()
    }
}
