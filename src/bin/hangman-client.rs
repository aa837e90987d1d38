//! Hangman Client
//!
//! Connects to a running server and plays interactively on the console.
//! Ctrl+C leaves gracefully: an idle client terminates its session on the
//! server first, a client stuck in an exchange exits right away.

use clap::Parser;
use hangman_memory::channel::DEFAULT_NAMESPACE;
use hangman_memory::error::EXIT_FAILURE;
use hangman_memory::render;
use hangman_memory::{ClientChannel, ClientState, GameClient, Result, Transport};
use log::error;
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

type SharedClient = Arc<Mutex<GameClient<ClientChannel>>>;

#[derive(Parser, Debug)]
#[command(author, version, about = "Hangman client over a shared memory mailbox", long_about = None)]
struct Args {
    /// Namespace of the shared memory object and semaphores
    #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
    namespace: String,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        error!("{}", e);
        eprintln!("hangman-client: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn lock(client: &SharedClient) -> MutexGuard<'_, GameClient<ClientChannel>> {
    client.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run(args: Args) -> Result<()> {
    let channel = match ClientChannel::connect(&args.namespace) {
        Ok(channel) => channel,
        Err(e) => {
            eprintln!("Make sure the server is running first!");
            return Err(e);
        }
    };
    let client: SharedClient = Arc::new(Mutex::new(GameClient::new(channel)));

    {
        let client = Arc::clone(&client);
        if let Err(e) = ctrlc::set_handler(move || std::process::exit(interrupt(&*client))) {
            error!("Could not install signal handler: {}", e);
        }
    }

    let out_of_words = play(&client)?;

    let mut client = lock(&client);
    client.finish()?;
    print!("{}", render::summary(client.wins(), client.losses(), out_of_words));
    Ok(())
}

/// Leave on Ctrl+C; returns the exit code
///
/// An exchange in flight may be blocked on a gate forever, so the session is
/// only terminated when the client is idle.
fn interrupt<T: Transport>(client: &Mutex<GameClient<T>>) -> i32 {
    let mut client = match client.try_lock() {
        Ok(guard) => guard,
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        Err(TryLockError::WouldBlock) => {
            eprintln!("\nhangman-client: interrupted during an exchange, leaving without terminating the session");
            return EXIT_FAILURE;
        }
    };
    match client.finish() {
        Ok(()) => {
            print!("{}", render::summary(client.wins(), client.losses(), false));
            0
        }
        Err(e) => {
            eprintln!("hangman-client: {}", e);
            e.exit_code()
        }
    }
}

fn show(client: &GameClient<ClientChannel>) {
    print!(
        "{}",
        render::board(client.masked_word(), client.error_count(), client.guessed())
    );
}

fn prompt(text: &str, lines: &mut impl Iterator<Item = io::Result<String>>) -> Option<String> {
    print!("{}", text);
    let _ = io::stdout().flush();
    lines.next().and_then(|line| line.ok())
}

/// Game loop; returns whether the dictionary ran out
fn play(client: &SharedClient) -> Result<bool> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        let state = lock(client).state();
        match state {
            ClientState::RequestingNewGame => {
                let mut client = lock(client);
                client.start_game()?;
                show(&client);
            }
            ClientState::AwaitingGuess => {
                let Some(line) = prompt("Please enter your guess [a-z]: ", &mut lines) else {
                    return Ok(false);
                };
                let Some(letter) = line.trim().chars().next() else {
                    continue;
                };

                let mut client = lock(client);
                match client.guess(letter) {
                    Ok(_) => show(&client),
                    Err(e) if !e.is_fatal() => eprintln!("{}", e),
                    Err(e) => return Err(e),
                }
            }
            ClientState::Won | ClientState::Lost => {
                let verdict = if state == ClientState::Won { "won" } else { "lost" };
                let text = format!("You {}, wanna play another? Y/N ", verdict);
                let Some(answer) = prompt(&text, &mut lines) else {
                    return Ok(false);
                };
                if !answer.trim().eq_ignore_ascii_case("y") {
                    return Ok(false);
                }
                let mut client = lock(client);
                client.start_game()?;
                show(&client);
            }
            ClientState::NoGamesLeft => return Ok(true),
            ClientState::Done => return Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hangman_memory::{Dictionary, Server};
    use std::sync::mpsc;
    use std::thread;

    fn shared(words: &[&str]) -> Arc<Mutex<GameClient<Server>>> {
        let server = Server::new(Dictionary::from_words(words.iter().copied()).unwrap());
        Arc::new(Mutex::new(GameClient::new(server)))
    }

    #[test]
    fn test_interrupt_while_idle_terminates_the_session() {
        let client = shared(&["CAT"]);
        lock_and_start(&client);

        assert_eq!(interrupt(&*client), 0);
        let client = client.lock().unwrap();
        assert_eq!(client.state(), ClientState::Done);
        assert!(client.transport().registry().is_empty());
    }

    #[test]
    fn test_interrupt_during_an_exchange_does_not_wait() {
        let client = shared(&["CAT"]);
        lock_and_start(&client);

        // Another thread holds the client the way a blocked round trip does
        let (held_tx, held_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let holder = {
            let client = Arc::clone(&client);
            thread::spawn(move || {
                let _guard = client.lock().unwrap();
                held_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
        };
        held_rx.recv().unwrap();

        assert_eq!(interrupt(&*client), EXIT_FAILURE);

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        // The session was left alone
        let client = client.lock().unwrap();
        assert_eq!(client.state(), ClientState::AwaitingGuess);
        assert_eq!(client.transport().registry().len(), 1);
    }

    fn lock_and_start(client: &Mutex<GameClient<Server>>) {
        client.lock().unwrap().start_game().unwrap();
    }
}
