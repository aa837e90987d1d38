//! Server context: dictionary plus session registry
//!
//! Turns one decoded request into one reply. Knows nothing about shared
//! memory or semaphores; [`crate::channel::ServerChannel`] drives it.

use crate::dictionary::Dictionary;
use crate::engine::{start_game, NoGamesLeft, Outcome};
use crate::error::Result;
use crate::mailbox::{MailboxRecord, Reply, Request, RequestKind, Response, ResponseStatus};
use crate::registry::{Session, SessionRegistry};
use log::{debug, info, warn};

/// All state the server keeps between exchanges
#[derive(Debug)]
pub struct Server {
    dictionary: Dictionary,
    registry: SessionRegistry,
}

impl Server {
    pub fn new(dictionary: Dictionary) -> Self {
        Self {
            dictionary,
            registry: SessionRegistry::new(),
        }
    }

    /// Decode the request in `record`, handle it and write the reply back
    pub fn handle_record(&mut self, record: &mut MailboxRecord) -> Result<()> {
        let request = record.read_request()?;
        let reply = self.handle(request)?;
        record.write_reply(&reply);
        Ok(())
    }

    /// Handle one request
    ///
    /// Fails only on protocol corruption (unknown session) or allocation failure.
    pub fn handle(&mut self, request: Request) -> Result<Reply> {
        debug!("Request {:?}", request);

        let letter = match request.kind {
            RequestKind::Terminate => {
                match request.session {
                    Some(id) => {
                        self.registry.remove(id);
                    }
                    None => warn!("Termination from a client that never registered"),
                }
                return Ok(Reply::Terminated);
            }
            RequestKind::NewGame => None,
            RequestKind::Guess(letter) => Some(letter),
        };

        let session = self.registry.resolve_or_create(request.session)?;

        let status = match letter {
            None => Self::new_game(&self.dictionary, session),
            Some(letter) if session.is_playing() => Self::guess(session, letter),
            Some(_) => match session.last_status() {
                None => {
                    warn!(
                        "Session {} guessed before starting a game, starting one",
                        session.id()
                    );
                    Self::new_game(&self.dictionary, session)
                }
                Some(status) => {
                    warn!("Session {} guessed with no game in progress", session.id());
                    status
                }
            },
        };
        session.set_status(status);

        Ok(Reply::Game(Response {
            session: session.id(),
            status,
            masked_word: session.masked_word(),
            error_count: session.error_count(),
        }))
    }

    fn new_game(dictionary: &Dictionary, session: &mut Session) -> ResponseStatus {
        match start_game(dictionary, session.games_played()) {
            Ok(game) => {
                info!(
                    "Session {} starts game {} ({} letters)",
                    session.id(),
                    session.games_played() + 1,
                    game.secret_word().len()
                );
                session.begin(game);
                ResponseStatus::NewGameStarted
            }
            Err(NoGamesLeft) => {
                info!("Session {} has no games left", session.id());
                ResponseStatus::NoGamesLeft
            }
        }
    }

    fn guess(session: &mut Session, letter: u8) -> ResponseStatus {
        let id = session.id();
        let Some(game) = session.game_mut() else {
            return ResponseStatus::NoGamesLeft;
        };
        match game.apply_guess(letter) {
            Outcome::RoundContinues => ResponseStatus::RoundContinues,
            Outcome::Won => {
                info!("Session {} won '{}'", id, game.secret_word());
                ResponseStatus::Won
            }
            Outcome::Lost => {
                info!("Session {} lost '{}'", id, game.secret_word());
                ResponseStatus::Lost
            }
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HangmanError;
    use crate::mailbox::{SessionId, TerminateFlag};

    fn server(words: &[&str]) -> Server {
        Server::new(Dictionary::from_words(words.iter().copied()).unwrap())
    }

    fn game(reply: Reply) -> Response {
        match reply {
            Reply::Game(response) => response,
            Reply::Terminated => panic!("expected a game response"),
        }
    }

    fn request(session: Option<SessionId>, kind: RequestKind) -> Request {
        Request { session, kind }
    }

    #[test]
    fn test_first_contact_registers_and_starts_game() {
        let mut server = server(&["CAT"]);
        let response = game(server.handle(request(None, RequestKind::NewGame)).unwrap());

        assert_eq!(response.session.get(), 0);
        assert_eq!(response.status, ResponseStatus::NewGameStarted);
        assert_eq!(response.masked_word, "___");
        assert_eq!(response.error_count, 0);
        assert!(server.registry().contains(response.session));
    }

    #[test]
    fn test_full_game_through_the_context() {
        let mut server = server(&["CAT"]);
        let id = game(server.handle(request(None, RequestKind::NewGame)).unwrap()).session;

        let statuses: Vec<_> = [b'C', b'A', b'T']
            .iter()
            .map(|&l| game(server.handle(request(Some(id), RequestKind::Guess(l))).unwrap()))
            .map(|r| (r.masked_word, r.status))
            .collect();

        assert_eq!(
            statuses,
            vec![
                ("C__".to_string(), ResponseStatus::RoundContinues),
                ("CA_".to_string(), ResponseStatus::RoundContinues),
                ("CAT".to_string(), ResponseStatus::Won),
            ]
        );
    }

    #[test]
    fn test_no_games_left_keeps_last_word_and_errors() {
        let mut server = server(&["DOG"]);
        let id = game(server.handle(request(None, RequestKind::NewGame)).unwrap()).session;
        for letter in b"QD" {
            server.handle(request(Some(id), RequestKind::Guess(*letter))).unwrap();
        }

        let response = game(server.handle(request(Some(id), RequestKind::NewGame)).unwrap());
        assert_eq!(response.status, ResponseStatus::NoGamesLeft);
        assert_eq!(response.masked_word, "D__");
        assert_eq!(response.error_count, 1);
        assert_eq!(server.registry().get(id).unwrap().games_played(), 1);
    }

    #[test]
    fn test_sessions_walk_the_dictionary_independently() {
        let mut server = server(&["ONE", "TWO"]);
        let a = game(server.handle(request(None, RequestKind::NewGame)).unwrap()).session;
        let a_second = game(server.handle(request(Some(a), RequestKind::NewGame)).unwrap());
        let b_first = game(server.handle(request(None, RequestKind::NewGame)).unwrap());

        assert_eq!(server.registry().get(a).unwrap().game().unwrap().secret_word(), "TWO");
        assert_eq!(a_second.masked_word, "___");
        let b = b_first.session;
        assert_eq!(server.registry().get(b).unwrap().game().unwrap().secret_word(), "ONE");
    }

    #[test]
    fn test_termination_removes_session() {
        let mut server = server(&["CAT"]);
        let id = game(server.handle(request(None, RequestKind::NewGame)).unwrap()).session;

        let reply = server.handle(request(Some(id), RequestKind::Terminate)).unwrap();
        assert_eq!(reply, Reply::Terminated);
        assert!(!server.registry().contains(id));
        assert!(matches!(
            server.handle(request(Some(id), RequestKind::Guess(b'C'))),
            Err(HangmanError::UnknownSession(0))
        ));

        // Terminating twice is harmless
        assert_eq!(
            server.handle(request(Some(id), RequestKind::Terminate)).unwrap(),
            Reply::Terminated
        );
    }

    #[test]
    fn test_guess_after_game_over_changes_nothing() {
        let mut server = server(&["A"]);
        let id = game(server.handle(request(None, RequestKind::NewGame)).unwrap()).session;
        let won = game(server.handle(request(Some(id), RequestKind::Guess(b'A'))).unwrap());
        assert_eq!(won.status, ResponseStatus::Won);

        let again = game(server.handle(request(Some(id), RequestKind::Guess(b'Z'))).unwrap());
        assert_eq!(again.status, ResponseStatus::Won);
        assert_eq!(again.error_count, 0);
    }

    #[test]
    fn test_handle_record_consumes_terminate_flag() {
        let mut server = server(&["CAT"]);
        let mut record = MailboxRecord::default();
        record.write_request(&request(None, RequestKind::NewGame));
        server.handle_record(&mut record).unwrap();
        let id = record.read_response().unwrap().session;

        record.write_request(&request(Some(id), RequestKind::Terminate));
        server.handle_record(&mut record).unwrap();
        assert_eq!(record.terminate_flag().unwrap(), TerminateFlag::Unset);
        assert!(server.registry().is_empty());
    }
}
