//! Client session state machine
//!
//! ```text
//! RequestingNewGame -> AwaitingGuess -> (AwaitingGuess)* -> Won | Lost | NoGamesLeft
//! Won | Lost -> RequestingNewGame | Done
//! NoGamesLeft -> Done
//! ```
//!
//! Guesses are validated locally first: a non-letter or a letter already tried
//! in this game never costs a round-trip.

use crate::channel::ClientChannel;
use crate::error::{HangmanError, Result};
use crate::mailbox::{Reply, Request, RequestKind, Response, ResponseStatus, SessionId};
use crate::server::Server;
use log::{debug, info};
use std::fmt;

/// Anything that can carry one request to the server and bring back its reply
pub trait Transport {
    fn exchange(&mut self, request: &Request) -> Result<Reply>;
}

impl Transport for ClientChannel {
    fn exchange(&mut self, request: &Request) -> Result<Reply> {
        ClientChannel::exchange(self, request)
    }
}

/// In-process transport, bypassing shared memory
impl Transport for Server {
    fn exchange(&mut self, request: &Request) -> Result<Reply> {
        self.handle(*request)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn exchange(&mut self, request: &Request) -> Result<Reply> {
        (**self).exchange(request)
    }
}

/// Where a client is in its session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    RequestingNewGame,
    AwaitingGuess,
    Won,
    Lost,
    NoGamesLeft,
    Done,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ClientState::RequestingNewGame => "requesting a new game",
            ClientState::AwaitingGuess => "awaiting a guess",
            ClientState::Won => "won",
            ClientState::Lost => "lost",
            ClientState::NoGamesLeft => "out of games",
            ClientState::Done => "done",
        };
        f.write_str(text)
    }
}

/// Letters already tried in the current game
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GuessedLetters(u32);

impl GuessedLetters {
    fn bit(letter: u8) -> Option<u32> {
        let letter = letter.to_ascii_uppercase();
        letter
            .is_ascii_uppercase()
            .then(|| 1 << (letter - b'A'))
    }

    /// Record `letter`; returns `false` if it was already there or is not a letter
    pub fn insert(&mut self, letter: u8) -> bool {
        match Self::bit(letter) {
            Some(bit) if self.0 & bit == 0 => {
                self.0 |= bit;
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, letter: u8) -> bool {
        Self::bit(letter).is_some_and(|bit| self.0 & bit != 0)
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Guessed letters in alphabetical order
    pub fn iter(&self) -> impl Iterator<Item = char> + '_ {
        (b'A'..=b'Z')
            .filter(move |&l| self.contains(l))
            .map(char::from)
    }
}

/// One client's view of its session
pub struct GameClient<T: Transport> {
    transport: T,
    session: Option<SessionId>,
    state: ClientState,
    guessed: GuessedLetters,
    masked_word: String,
    error_count: u8,
    wins: u32,
    losses: u32,
}

impl<T: Transport> GameClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            session: None,
            state: ClientState::RequestingNewGame,
            guessed: GuessedLetters::default(),
            masked_word: String::new(),
            error_count: 0,
            wins: 0,
            losses: 0,
        }
    }

    /// Ask the server for the next word
    ///
    /// Allowed at the start and after a won or lost game.
    pub fn start_game(&mut self) -> Result<ResponseStatus> {
        match self.state {
            ClientState::RequestingNewGame | ClientState::Won | ClientState::Lost => {}
            state => {
                return Err(HangmanError::InvalidTransition {
                    action: "start a game",
                    state: state.to_string(),
                })
            }
        }
        self.state = ClientState::RequestingNewGame;

        let response = self.send(RequestKind::NewGame)?;
        if response.status == ResponseStatus::NewGameStarted {
            self.guessed.clear();
        }
        Ok(self.apply(response))
    }

    /// Submit one letter
    pub fn guess(&mut self, input: char) -> Result<ResponseStatus> {
        if self.state != ClientState::AwaitingGuess {
            return Err(HangmanError::InvalidTransition {
                action: "guess",
                state: self.state.to_string(),
            });
        }
        if !input.is_ascii_alphabetic() {
            return Err(HangmanError::InvalidGuess(format!(
                "'{}' is not a letter [a-z]",
                input
            )));
        }
        let letter = input.to_ascii_uppercase() as u8;
        if !self.guessed.insert(letter) {
            return Err(HangmanError::InvalidGuess(format!(
                "'{}' was already guessed",
                char::from(letter)
            )));
        }

        let response = self.send(RequestKind::Guess(letter))?;
        Ok(self.apply(response))
    }

    /// Leave: run the termination exchange if the server knows this client
    ///
    /// Calling it again after success does nothing.
    pub fn finish(&mut self) -> Result<()> {
        if self.state == ClientState::Done {
            return Ok(());
        }
        if let Some(session) = self.session {
            self.transport.exchange(&Request {
                session: Some(session),
                kind: RequestKind::Terminate,
            })?;
            info!("Session {} terminated", session);
        }
        self.state = ClientState::Done;
        Ok(())
    }

    fn send(&mut self, kind: RequestKind) -> Result<Response> {
        let request = Request {
            session: self.session,
            kind,
        };
        let response = match self.transport.exchange(&request)? {
            Reply::Game(response) => response,
            Reply::Terminated => return Err(HangmanError::InvalidStatus(u8::MAX)),
        };
        // A reply for another session means the exchange was not ours
        match self.session {
            Some(own) if response.session != own => {
                Err(HangmanError::UnknownSession(response.session.get()))
            }
            _ => Ok(response),
        }
    }

    fn apply(&mut self, response: Response) -> ResponseStatus {
        debug!("Response {:?}", response);
        if self.session.is_none() {
            info!("Registered as session {}", response.session);
        }
        self.session = Some(response.session);
        self.masked_word = response.masked_word;
        self.error_count = response.error_count;

        self.state = match response.status {
            ResponseStatus::NewGameStarted | ResponseStatus::RoundContinues => {
                ClientState::AwaitingGuess
            }
            ResponseStatus::Won => {
                self.wins += 1;
                ClientState::Won
            }
            ResponseStatus::Lost => {
                self.losses += 1;
                ClientState::Lost
            }
            ResponseStatus::NoGamesLeft => ClientState::NoGamesLeft,
        };
        response.status
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    pub fn masked_word(&self) -> &str {
        &self.masked_word
    }

    pub fn error_count(&self) -> u8 {
        self.error_count
    }

    pub fn guessed(&self) -> &GuessedLetters {
        &self.guessed
    }

    pub fn wins(&self) -> u32 {
        self.wins
    }

    pub fn losses(&self) -> u32 {
        self.losses
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

}
