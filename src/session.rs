//! Seats participants in a match and serializes their moves.
//!
//! A [`Session`] owns one [`Match`] behind a mutex. Every accepted move is
//! applied, snapshotted and broadcast while the lock is held, so all
//! subscribers observe states in apply order.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::game::{GameError, Match, MoveRequest, PublicState};
use crate::piece::Player;

pub const DEFAULT_MATCH: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchId(String);

impl MatchId {
    pub fn new(id: impl Into<String>) -> Self {
        MatchId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MatchId {
    fn default() -> Self {
        MatchId::new(DEFAULT_MATCH)
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Match {0} already has two players")]
    Full(MatchId),
    #[error("Already hosting the maximum of {0} matches")]
    TooManyMatches(usize),
}

/// A participant's place in a session
#[derive(Debug)]
pub struct Seat {
    pub slot: Player,
    /// State at the moment of joining
    pub state: PublicState,
    /// Every state after that
    pub updates: broadcast::Receiver<PublicState>,
}

#[derive(Debug)]
struct Table {
    game: Match,
    seated: usize,
}

#[derive(Debug)]
pub struct Session {
    id: MatchId,
    table: Mutex<Table>,
    updates: broadcast::Sender<PublicState>,
}

impl Session {
    /// `capacity` bounds how many states a slow subscriber may lag behind.
    pub fn new(id: MatchId, game: Match, capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(capacity);
        Session {
            id,
            table: Mutex::new(Table { game, seated: 0 }),
            updates,
        }
    }

    pub fn id(&self) -> &MatchId {
        &self.id
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        // `apply` validates before it mutates, so a poisoned table is still whole
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seat the next participant. Slots go out in connection order and are
    /// never handed out twice.
    pub fn join(&self) -> Result<Seat, SessionError> {
        let mut table = self.lock();
        let slot = Player::from_index(table.seated).ok_or_else(|| {
            tracing::warn!(match_id = %self.id, "match is full, refusing participant");
            SessionError::Full(self.id.clone())
        })?;
        table.seated += 1;

        tracing::info!(match_id = %self.id, slot = slot.index(), "participant joined");
        Ok(Seat {
            slot,
            state: table.game.snapshot(),
            updates: self.updates.subscribe(),
        })
    }

    pub fn seated(&self) -> usize {
        self.lock().seated
    }

    pub fn snapshot(&self) -> PublicState {
        self.lock().game.snapshot()
    }

    /// Finished, or everyone who sat down has since left
    pub fn is_stale(&self) -> bool {
        let table = self.lock();
        table.game.is_game_over() || (table.seated > 0 && self.updates.receiver_count() == 0)
    }

    /// Apply `request` for `slot` and broadcast the resulting state.
    /// Rejected requests change nothing and broadcast nothing.
    pub fn submit(&self, slot: Player, request: &MoveRequest) -> Result<PublicState, GameError> {
        let mut table = self.lock();

        let outcome = match table.game.apply(slot, request) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::debug!(
                    match_id = %self.id,
                    slot = slot.index(),
                    piece = %request.piece,
                    direction = %request.direction,
                    "move rejected: {}",
                    e
                );
                return Err(e);
            }
        };

        tracing::info!(
            match_id = %self.id,
            slot = slot.index(),
            piece = %outcome.piece,
            from = %outcome.from,
            to = %outcome.to,
            captured = ?outcome.captured,
            "move applied"
        );
        tracing::debug!("\n{}", table.game.display_board());
        if let Some(winner) = table.game.winner() {
            tracing::info!(match_id = %self.id, winner = winner.index(), "match finished");
        }

        let state = table.game.snapshot();
        // No receivers just means nobody is connected right now
        let _ = self.updates.send(state.clone());
        Ok(state)
    }
}

/// All sessions hosted by this process, by match id
pub struct Lobby {
    sessions: Mutex<HashMap<MatchId, Arc<Session>>>,
    capacity: usize,
    max_matches: usize,
}

impl Lobby {
    pub fn new(capacity: usize, max_matches: usize) -> Self {
        Lobby {
            sessions: Mutex::new(HashMap::new()),
            capacity,
            max_matches,
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<MatchId, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, id: &MatchId) -> Option<Arc<Session>> {
        self.sessions().get(id).cloned()
    }

    /// Look up a live session, opening a fresh standard match if there is
    /// none or the old one is stale
    pub fn open(&self, id: &MatchId) -> Result<Arc<Session>, SessionError> {
        let mut sessions = self.sessions();
        self.open_locked(&mut sessions, id)
    }

    /// Open (or find) the match and seat a participant in one step, so a
    /// concurrent prune never sees the new session unseated and abandoned
    pub fn join(&self, id: &MatchId) -> Result<(Arc<Session>, Seat), SessionError> {
        let mut sessions = self.sessions();
        let session = self.open_locked(&mut sessions, id)?;
        let seat = session.join()?;
        Ok((session, seat))
    }

    /// Host a prepared session under its own id, replacing a stale one
    pub fn host(&self, session: Session) -> Result<Arc<Session>, SessionError> {
        let mut sessions = self.sessions();
        let id = session.id().clone();
        if sessions.get(&id).is_some_and(|s| !s.is_stale()) {
            return Err(SessionError::Full(id));
        }
        sessions.remove(&id);
        self.make_room(&mut sessions)?;

        let session = Arc::new(session);
        sessions.insert(id, Arc::clone(&session));
        Ok(session)
    }

    /// Drop every stale session. Connections still holding one keep it
    /// until they close.
    pub fn prune(&self) -> usize {
        let mut sessions = self.sessions();
        Self::prune_locked(&mut sessions)
    }

    fn prune_locked(sessions: &mut HashMap<MatchId, Arc<Session>>) -> usize {
        let before = sessions.len();
        sessions.retain(|id, session| {
            let stale = session.is_stale();
            if stale {
                tracing::info!(match_id = %id, "retiring match");
            }
            !stale
        });
        before - sessions.len()
    }

    fn make_room(
        &self,
        sessions: &mut HashMap<MatchId, Arc<Session>>,
    ) -> Result<(), SessionError> {
        if sessions.len() >= self.max_matches {
            Self::prune_locked(sessions);
        }
        if sessions.len() >= self.max_matches {
            tracing::warn!(limit = self.max_matches, "refusing to open another match");
            return Err(SessionError::TooManyMatches(self.max_matches));
        }
        Ok(())
    }

    fn open_locked(
        &self,
        sessions: &mut HashMap<MatchId, Arc<Session>>,
        id: &MatchId,
    ) -> Result<Arc<Session>, SessionError> {
        match sessions.get(id) {
            Some(session) if !session.is_stale() => return Ok(Arc::clone(session)),
            Some(_) => {
                tracing::info!(match_id = %id, "retiring match");
                sessions.remove(id);
            }
            None => {}
        }
        self.make_room(sessions)?;

        tracing::info!(match_id = %id, "opening match");
        let session = Arc::new(Session::new(id.clone(), Match::new(), self.capacity));
        sessions.insert(id.clone(), Arc::clone(&session));
        Ok(session)
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Position;
    use crate::piece::{Direction, PieceKind};
    use tokio::sync::broadcast::error::TryRecvError;

    fn create_session() -> Session {
        Session::new(MatchId::default(), Match::new(), 16)
    }

    #[test]
    fn test_slots_assigned_in_join_order() {
        let session = create_session();

        assert_eq!(session.join().unwrap().slot, Player::First);
        assert_eq!(session.join().unwrap().slot, Player::Second);
        assert_eq!(
            session.join().unwrap_err(),
            SessionError::Full(MatchId::default())
        );
        assert_eq!(session.seated(), 2);
    }

    #[test]
    fn test_slot_not_recycled_after_leaving() {
        let session = create_session();
        let seat = session.join().unwrap();
        drop(seat);

        assert_eq!(session.join().unwrap().slot, Player::Second);
        assert!(session.join().is_err());
    }

    #[test]
    fn test_accepted_move_reaches_every_subscriber() {
        let session = create_session();
        let mut first = session.join().unwrap();
        let mut second = session.join().unwrap();
        assert!(!first.state.game_over);

        let state = session
            .submit(Player::First, &MoveRequest::new("P1", Direction::Forward))
            .unwrap();
        assert_eq!(state.current_player, Player::Second);

        assert_eq!(first.updates.try_recv().unwrap(), state);
        assert_eq!(second.updates.try_recv().unwrap(), state);
        assert_eq!(session.snapshot(), state);
    }

    #[test]
    fn test_rejected_move_is_not_broadcast() {
        let session = create_session();
        let mut seat = session.join().unwrap();
        let before = session.snapshot();

        let err = session
            .submit(Player::Second, &MoveRequest::new("P1", Direction::Forward))
            .unwrap_err();
        assert_eq!(err, GameError::NotYourTurn);

        assert_eq!(seat.updates.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(session.snapshot(), before);
    }

    #[test]
    fn test_submit_without_subscribers() {
        let session = create_session();
        let state = session
            .submit(Player::First, &MoveRequest::new("P5", Direction::Forward))
            .unwrap();
        assert_eq!(state.move_count, 1);
    }

    #[test]
    fn test_racing_submissions_apply_once() {
        let session = create_session();
        let request = MoveRequest::new("P3", Direction::Forward);

        let accepted = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| session.submit(Player::First, &request).is_ok()))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });

        assert_eq!(accepted, 1);
        let state = session.snapshot();
        assert_eq!(state.move_count, 1);
        assert_eq!(state.current_player, Player::Second);
    }

    #[test]
    fn test_lobby_keeps_matches_apart() {
        let lobby = Lobby::new(8, 16);
        assert!(lobby.is_empty());

        let default = lobby.open(&MatchId::default()).unwrap();
        let other = lobby.open(&MatchId::new("side-table")).unwrap();
        assert_eq!(lobby.len(), 2);
        assert_eq!(other.id().as_str(), "side-table");

        default
            .submit(Player::First, &MoveRequest::new("P1", Direction::Forward))
            .unwrap();
        assert_eq!(default.snapshot().move_count, 1);
        assert_eq!(other.snapshot().move_count, 0);

        let again = lobby.get(&MatchId::default()).unwrap();
        assert!(Arc::ptr_eq(&default, &again));
        assert!(lobby.get(&MatchId::new("missing")).is_none());
    }

    #[test]
    fn test_lobby_refuses_matches_past_limit() {
        let lobby = Lobby::new(8, 2);
        let _a = lobby.join(&MatchId::new("a")).unwrap();
        let _b = lobby.join(&MatchId::new("b")).unwrap();

        assert_eq!(
            lobby.open(&MatchId::new("c")).unwrap_err(),
            SessionError::TooManyMatches(2)
        );
        assert!(lobby.join(&MatchId::new("c")).is_err());
        assert_eq!(lobby.len(), 2);

        // Existing matches are still reachable
        let (_, seat) = lobby.join(&MatchId::new("a")).unwrap();
        assert_eq!(seat.slot, Player::Second);
    }

    #[test]
    fn test_abandoned_match_is_retired() {
        let lobby = Lobby::new(8, 1);
        let (session, seat) = lobby.join(&MatchId::new("a")).unwrap();
        assert!(!session.is_stale());
        assert_eq!(lobby.prune(), 0);

        drop(seat);
        assert!(session.is_stale());
        assert_eq!(lobby.prune(), 1);
        assert!(lobby.get(&MatchId::new("a")).is_none());

        // The freed room goes to the next match
        for i in 0..50 {
            let (_, seat) = lobby.join(&MatchId::new(format!("m{}", i))).unwrap();
            drop(seat);
        }
        assert_eq!(lobby.len(), 1);
    }

    #[test]
    fn test_opened_but_unseated_match_is_kept() {
        let lobby = Lobby::new(8, 4);
        let session = lobby.open(&MatchId::default()).unwrap();
        assert!(!session.is_stale());
        assert_eq!(lobby.prune(), 0);
        assert_eq!(lobby.len(), 1);
    }

    #[test]
    fn test_finished_match_is_retired() {
        let game = Match::builder()
            .piece(Player::First, "H4", PieceKind::JumperDiagonal, Position::new(1, 2))
            .piece(Player::Second, "P5", PieceKind::Runner, Position::new(3, 3))
            .build()
            .unwrap();
        let lobby = Lobby::new(8, 4);
        let id = MatchId::new("short");
        let session = lobby.host(Session::new(id.clone(), game, 8)).unwrap();
        let (_, _first) = lobby.join(&id).unwrap();
        let (_, _second) = lobby.join(&id).unwrap();

        session
            .submit(Player::First, &MoveRequest::new("H4", Direction::ForwardRight))
            .unwrap();
        assert!(session.is_stale());

        // The next participant under that id gets a fresh match
        let (fresh, seat) = lobby.join(&id).unwrap();
        assert!(!Arc::ptr_eq(&fresh, &session));
        assert_eq!(seat.slot, Player::First);
        assert!(!seat.state.game_over);
        assert_eq!(lobby.len(), 1);
    }

    #[test]
    fn test_host_refuses_live_id() {
        let lobby = Lobby::new(8, 4);
        let (_, _seat) = lobby.join(&MatchId::default()).unwrap();
        let err = lobby
            .host(Session::new(MatchId::default(), Match::new(), 8))
            .unwrap_err();
        assert_eq!(err, SessionError::Full(MatchId::default()));
    }
}
