//! Server-side session registry
//!
//! Maps the opaque id a client carries in the mailbox to that client's game.
//! Ids come from a monotonic counter and are never handed out twice, not even
//! after the session that held them is removed.

use crate::engine::GameState;
use crate::error::{HangmanError, Result};
use crate::mailbox::{ResponseStatus, SessionId};
use log::info;
use std::collections::HashMap;

/// Per-client state kept by the server
#[derive(Clone, Debug)]
pub struct Session {
    id: SessionId,
    games_played: usize,
    game: Option<GameState>,
    last_status: Option<ResponseStatus>,
}

impl Session {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            games_played: 0,
            game: None,
            last_status: None,
        }
    }

    #[inline]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Games started so far; also the dictionary index of the next one
    #[inline]
    pub fn games_played(&self) -> usize {
        self.games_played
    }

    /// Current (or most recent) game
    pub fn game(&self) -> Option<&GameState> {
        self.game.as_ref()
    }

    pub fn game_mut(&mut self) -> Option<&mut GameState> {
        self.game.as_mut()
    }

    /// Status of the last response sent to this session
    pub fn last_status(&self) -> Option<ResponseStatus> {
        self.last_status
    }

    /// Whether a guess can be applied right now
    pub fn is_playing(&self) -> bool {
        matches!(
            self.last_status,
            Some(ResponseStatus::NewGameStarted | ResponseStatus::RoundContinues)
        ) && self.game.is_some()
    }

    /// Install a freshly started game
    pub fn begin(&mut self, game: GameState) {
        self.game = Some(game);
        self.games_played += 1;
    }

    pub fn set_status(&mut self, status: ResponseStatus) {
        self.last_status = Some(status);
    }

    /// Masked word to report, empty before the first game
    pub fn masked_word(&self) -> String {
        self.game.as_ref().map(GameState::masked_word).unwrap_or_default()
    }

    pub fn error_count(&self) -> u8 {
        self.game.as_ref().map_or(0, GameState::error_count)
    }
}

/// All live sessions of one server
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
    next_id: i32,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a session, registering a new one for `None`
    ///
    /// An id that was never issued (or was already removed) means the client
    /// is corrupt; the caller treats that as fatal.
    pub fn resolve_or_create(&mut self, session: Option<SessionId>) -> Result<&mut Session> {
        match session {
            Some(id) => self
                .sessions
                .get_mut(&id)
                .ok_or(HangmanError::UnknownSession(id.get())),
            None => {
                let id = self.allocate_id()?;
                self.sessions
                    .try_reserve(1)
                    .map_err(|e| HangmanError::Allocation(e.to_string()))?;
                info!("Registered session {}", id);
                Ok(self.sessions.entry(id).or_insert_with(|| Session::new(id)))
            }
        }
    }

    fn allocate_id(&mut self) -> Result<SessionId> {
        let raw = self.next_id;
        let next = raw
            .checked_add(1)
            .ok_or_else(|| HangmanError::Allocation("session ids exhausted".to_string()))?;
        let id = SessionId::new(raw)
            .ok_or_else(|| HangmanError::Allocation("session ids exhausted".to_string()))?;
        self.next_id = next;
        Ok(id)
    }

    /// Drop a session; removing an absent one is not an error
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let removed = self.sessions.remove(&id);
        if removed.is_some() {
            info!("Removed session {}", id);
        }
        removed
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
