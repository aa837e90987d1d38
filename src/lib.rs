//! HangmanMemory - multi-process hangman over a shared memory mailbox
//!
//! One long-lived server and any number of short-lived clients exchange a
//! single fixed-size record in POSIX shared memory. Three named semaphores
//! decide who may touch the record.
//!
//! # Architecture
//!
//! - **Server**: owns the mailbox, the gates, the dictionary and every
//!   client's session
//! - **Clients**: open the mailbox, take turns writing one request and
//!   reading its response
//!
//! # Gates
//!
//! - `client_gate` (starts at 1): one client at a time may write a request
//! - `server_gate` (starts at 0): a request is waiting for the server
//! - `response_gate` (starts at 0): the response is waiting for the client
//!
//! Waits have no timeout. A client that dies while holding `client_gate`
//! blocks every other client until the server is restarted.

pub mod error;
pub mod shm;
pub mod semaphore;
pub mod mailbox;
pub mod dictionary;
pub mod engine;
pub mod registry;
pub mod server;
pub mod channel;
pub mod client;
pub mod render;

pub use error::{HangmanError, Result};
pub use channel::{ChannelConfig, ClientChannel, RearmPolicy, ServerChannel, ShutdownHandle};
pub use client::{ClientState, GameClient, Transport};
pub use dictionary::Dictionary;
pub use mailbox::{Request, RequestKind, Response, ResponseStatus, SessionId};
pub use server::Server;
