//! End-to-end exchanges over real shared memory and named semaphores.
//!
//! The server runs on its own thread; every client thread opens its own
//! handles exactly like a separate process would.

use hangman_memory::channel::GateValues;
use hangman_memory::{
    ChannelConfig, ClientChannel, ClientState, Dictionary, GameClient, HangmanError, RearmPolicy,
    Request, RequestKind, ResponseStatus, Server, ServerChannel, SessionId,
};
use std::sync::{Arc, Barrier};
use std::thread::{self, JoinHandle};

const WORDS: [&str; 3] = ["CAT", "HELLO WORLD", "DOG"];

fn namespace(tag: &str) -> String {
    format!("hm_it_{}_{}", tag, std::process::id())
}

struct Running {
    shutdown: hangman_memory::ShutdownHandle,
    handle: JoinHandle<(u64, usize, GateValues)>,
}

fn start_server(namespace: &str, rearm: RearmPolicy, words: &[&str]) -> Running {
    let config = ChannelConfig {
        namespace: namespace.to_string(),
        rearm,
    };
    let mut channel = ServerChannel::create(&config).unwrap();
    let shutdown = channel.shutdown_handle();
    let dictionary = Dictionary::from_words(words.iter().copied()).unwrap();

    let handle = thread::spawn(move || {
        let mut server = Server::new(dictionary);
        while channel.serve_one(&mut server).unwrap() {}
        let gates = channel.gate_values().unwrap();
        (channel.exchanges(), server.registry().len(), gates)
    });

    Running { shutdown, handle }
}

impl Running {
    fn stop(self) -> (u64, usize, GateValues) {
        self.shutdown.trigger().unwrap();
        self.handle.join().unwrap()
    }
}

/// Solve every word the server hands out, guessing the alphabet in order
fn play_all_games(namespace: &str) -> (u32, u32, usize, SessionId) {
    let channel = ClientChannel::connect(namespace).unwrap();
    let mut client = GameClient::new(channel);
    let mut games = 0;
    let mut own = None;

    loop {
        let status = client.start_game().unwrap();
        // Every response must come back for the session registered first
        let session = client.session().unwrap();
        assert_eq!(*own.get_or_insert(session), session);

        match status {
            ResponseStatus::NoGamesLeft => break,
            ResponseStatus::NewGameStarted => games += 1,
            other => panic!("unexpected status {:?}", other),
        }
        for letter in 'A'..='Z' {
            if client.state() != ClientState::AwaitingGuess {
                break;
            }
            client.guess(letter).unwrap();
            assert_eq!(client.session(), own);
        }
        assert!(matches!(client.state(), ClientState::Won | ClientState::Lost));
    }

    client.finish().unwrap();
    (client.wins(), client.losses(), games, own.unwrap())
}

#[test]
fn concurrent_clients_each_play_their_own_sessions() {
    let ns = namespace("concurrent");
    let server = start_server(&ns, RearmPolicy::Client, &WORDS);

    let clients = 6;
    let barrier = Arc::new(Barrier::new(clients));
    let handles: Vec<_> = (0..clients)
        .map(|_| {
            let ns = ns.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                play_all_games(&ns)
            })
        })
        .collect();

    let mut sessions = Vec::new();
    for handle in handles {
        let (wins, losses, games, session) = handle.join().unwrap();
        // Every client walks the whole dictionary on its own
        assert_eq!(games, WORDS.len());
        assert_eq!(wins + losses, WORDS.len() as u32);
        sessions.push(session);
    }
    sessions.sort();
    sessions.dedup();
    assert_eq!(sessions.len(), clients);

    let (exchanges, live, gates) = server.stop();
    assert_eq!(live, 0);
    assert!(exchanges > (clients * WORDS.len()) as u64);
    // Shutdown only posted server_gate, which the loop consumed
    assert_eq!(
        gates,
        GateValues {
            client: 1,
            server: 0,
            response: 0
        }
    );
}

#[test]
fn cat_progression_over_shared_memory() {
    let ns = namespace("cat");
    let server = start_server(&ns, RearmPolicy::Server, &["CAT"]);
    let channel = ClientChannel::connect(&ns).unwrap();

    let started = channel
        .request(&Request {
            session: None,
            kind: RequestKind::NewGame,
        })
        .unwrap();
    assert_eq!(started.masked_word, "___");

    let mut seen = Vec::new();
    for letter in [b'C', b'A', b'T'] {
        let response = channel
            .request(&Request {
                session: Some(started.session),
                kind: RequestKind::Guess(letter),
            })
            .unwrap();
        assert_eq!(response.error_count, 0);
        seen.push((response.masked_word, response.status));
    }
    assert_eq!(
        seen,
        vec![
            ("C__".to_string(), ResponseStatus::RoundContinues),
            ("CA_".to_string(), ResponseStatus::RoundContinues),
            ("CAT".to_string(), ResponseStatus::Won),
        ]
    );

    channel.terminate(Some(started.session)).unwrap();
    let (exchanges, live, _) = server.stop();
    assert_eq!(exchanges, 5);
    assert_eq!(live, 0);
}

#[test]
fn unknown_session_is_fatal_for_the_server() {
    let ns = namespace("unknown");
    let config = ChannelConfig {
        namespace: ns.clone(),
        rearm: RearmPolicy::Client,
    };
    let mut channel = ServerChannel::create(&config).unwrap();
    let server_thread = thread::spawn(move || {
        let mut server = Server::new(Dictionary::from_words(["CAT"]).unwrap());
        let result = channel.serve_one(&mut server);
        // Keep the objects alive until the client has given up
        (result, channel)
    });

    let client = ClientChannel::connect(&ns).unwrap();
    let bogus = SessionId::new(99).unwrap();

    // The client never gets an answer; send the request by hand so the test
    // does not block on the response gate
    let names = hangman_memory::channel::ObjectNames::new(&ns).unwrap();
    let client_gate = hangman_memory::semaphore::NamedSemaphore::open(&names.client_gate).unwrap();
    let server_gate = hangman_memory::semaphore::NamedSemaphore::open(&names.server_gate).unwrap();
    let mailbox = hangman_memory::mailbox::Mailbox::open(&names.mailbox).unwrap();

    client_gate.wait().unwrap();
    mailbox.update(|record| {
        record.write_request(&Request {
            session: Some(bogus),
            kind: RequestKind::Guess(b'C'),
        })
    });
    server_gate.post().unwrap();

    let (result, channel) = server_thread.join().unwrap();
    let err = result.unwrap_err();
    assert!(matches!(err, HangmanError::UnknownSession(99)));
    assert_eq!(err.exit_code(), hangman_memory::error::EXIT_PROTOCOL_CORRUPTION);

    // Nothing re-armed the gates: the next client would block forever
    assert_eq!(client.gate_values().unwrap().client, 0);
    assert_eq!(client.gate_values().unwrap().response, 0);
    drop(channel);
}

#[test]
fn clients_learn_the_server_is_gone() {
    let ns = namespace("gone");
    let config = ChannelConfig {
        namespace: ns.clone(),
        rearm: RearmPolicy::Client,
    };
    let mut channel = ServerChannel::create(&config).unwrap();
    let shutdown = channel.shutdown_handle();
    let server_thread = thread::spawn(move || {
        let mut server = Server::new(Dictionary::from_words(["CAT"]).unwrap());
        channel.run(&mut server)
    });

    let first = ClientChannel::connect(&ns).unwrap();
    let second = ClientChannel::connect(&ns).unwrap();
    let response = first
        .request(&Request {
            session: None,
            kind: RequestKind::NewGame,
        })
        .unwrap();

    shutdown.trigger().unwrap();
    server_thread.join().unwrap().unwrap();

    let mut client = GameClient::new(second);
    assert!(matches!(client.start_game(), Err(HangmanError::ServerGone)));
    assert!(matches!(
        first.terminate(Some(response.session)),
        Err(HangmanError::ServerGone)
    ));
    assert!(matches!(
        ClientChannel::connect(&ns),
        Err(HangmanError::ShmOpen { .. })
    ));
}
