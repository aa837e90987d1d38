//! High-level Channel API for HangmanMemory
//!
//! Provides the server and client ends of the mailbox protocol. One exchange
//! ("round-trip") runs in these steps:
//!
//! 1. client waits `client_gate`
//! 2. client writes its request into the mailbox
//! 3. client posts `server_gate`
//! 4. client waits `response_gate`
//! 5. server waits `server_gate`
//! 6. server handles the request and writes the response
//! 7. server posts `client_gate` (only with [`RearmPolicy::Server`])
//! 8. server posts `response_gate`
//! 9. client reads the response (and posts `client_gate` with [`RearmPolicy::Client`])
//!
//! Waits never time out. A client that dies between steps 1 and 3 leaves
//! `client_gate` taken and every later client blocked.

use crate::error::{HangmanError, Result};
use crate::mailbox::{
    Mailbox, MailboxRecord, Reply, Request, RequestKind, Response, SessionId, TerminateFlag,
};
use crate::semaphore::NamedSemaphore;
use crate::server::Server;
use crate::shm::{object_name, SharedRegion};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Namespace used when none is given
pub const DEFAULT_NAMESPACE: &str = "hangman";

const MAILBOX_SUFFIX: &str = "_mailbox";
const CLIENT_GATE_SUFFIX: &str = "_client";
const SERVER_GATE_SUFFIX: &str = "_server";
const RESPONSE_GATE_SUFFIX: &str = "_return";

/// Who re-arms `client_gate` after an exchange
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RearmPolicy {
    /// The server posts it right after writing the response (step 7).
    ///
    /// The next client may then overwrite the mailbox before the previous one
    /// has read its response, so this is only safe with one active client.
    Server,
    /// The client posts it after reading its response.
    #[default]
    Client,
}

impl RearmPolicy {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            RearmPolicy::Server => 0,
            RearmPolicy::Client => 1,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(RearmPolicy::Server),
            1 => Ok(RearmPolicy::Client),
            other => Err(HangmanError::InvalidRearmPolicy(other)),
        }
    }
}

/// Channel configuration
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Prefix of every POSIX object name
    pub namespace: String,
    /// Gate re-arm policy, published to clients through the mailbox header
    pub rearm: RearmPolicy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            rearm: RearmPolicy::default(),
        }
    }
}

/// POSIX names of the objects belonging to one namespace
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectNames {
    pub mailbox: String,
    pub client_gate: String,
    pub server_gate: String,
    pub response_gate: String,
}

impl ObjectNames {
    pub fn new(namespace: &str) -> Result<Self> {
        Ok(Self {
            mailbox: object_name(namespace, MAILBOX_SUFFIX)?,
            client_gate: object_name(namespace, CLIENT_GATE_SUFFIX)?,
            server_gate: object_name(namespace, SERVER_GATE_SUFFIX)?,
            response_gate: object_name(namespace, RESPONSE_GATE_SUFFIX)?,
        })
    }
}

/// Remove objects left behind by a server that did not shut down cleanly
///
/// Returns how many objects were removed.
pub fn unlink_stale(namespace: &str) -> Result<usize> {
    let names = ObjectNames::new(namespace)?;
    let mut removed = usize::from(SharedRegion::unlink(&names.mailbox)?);
    for gate in [&names.client_gate, &names.server_gate, &names.response_gate] {
        removed += usize::from(NamedSemaphore::unlink(gate)?);
    }
    if removed > 0 {
        warn!("Removed {} stale object(s) in namespace '{}'", removed, namespace);
    }
    Ok(removed)
}

/// Snapshot of the three gate values
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GateValues {
    pub client: i32,
    pub server: i32,
    pub response: i32,
}

struct Gates {
    client: NamedSemaphore,
    server: Arc<NamedSemaphore>,
    response: NamedSemaphore,
}

impl Gates {
    fn create(names: &ObjectNames) -> Result<Self> {
        Ok(Self {
            client: NamedSemaphore::create(&names.client_gate, 1)?,
            server: Arc::new(NamedSemaphore::create(&names.server_gate, 0)?),
            response: NamedSemaphore::create(&names.response_gate, 0)?,
        })
    }

    fn open(names: &ObjectNames) -> Result<Self> {
        Ok(Self {
            client: NamedSemaphore::open(&names.client_gate)?,
            server: Arc::new(NamedSemaphore::open(&names.server_gate)?),
            response: NamedSemaphore::open(&names.response_gate)?,
        })
    }

    fn values(&self) -> Result<GateValues> {
        Ok(GateValues {
            client: self.client.value()?,
            server: self.server.value()?,
            response: self.response.value()?,
        })
    }
}

/// Wakes a blocked server loop and asks it to stop
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    server_gate: Arc<NamedSemaphore>,
}

impl ShutdownHandle {
    /// Request shutdown; repeated calls are no-ops
    pub fn trigger(&self) -> Result<()> {
        if !self.flag.swap(true, Ordering::SeqCst) {
            self.server_gate.post()?;
        }
        Ok(())
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Server (owner) side of the channel
pub struct ServerChannel {
    mailbox: Mailbox,
    gates: Gates,
    rearm: RearmPolicy,
    shutdown: Arc<AtomicBool>,
    exchanges: u64,
}

impl ServerChannel {
    /// Create the mailbox and the three gates
    ///
    /// Fails if any of them already exists; see [`unlink_stale`].
    pub fn create(config: &ChannelConfig) -> Result<Self> {
        let names = ObjectNames::new(&config.namespace)?;
        // Gates first: clients open the mailbox before the gates
        let gates = Gates::create(&names)?;
        let mailbox = Mailbox::create(&names.mailbox, config.rearm)?;

        info!(
            "Created mailbox '{}' ({} bytes, {:?} re-arm)",
            mailbox.name(),
            Mailbox::SIZE,
            config.rearm
        );

        Ok(Self {
            mailbox,
            gates,
            rearm: config.rearm,
            shutdown: Arc::new(AtomicBool::new(false)),
            exchanges: 0,
        })
    }

    /// Handle for stopping [`ServerChannel::run`] from another thread or a signal handler
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
            server_gate: Arc::clone(&self.gates.server),
        }
    }

    /// Serve a single exchange (steps 5 to 8)
    ///
    /// Returns `false` without touching the mailbox if shutdown was requested.
    pub fn serve_one(&mut self, server: &mut Server) -> Result<bool> {
        self.gates.server.wait()?;
        if self.shutdown.load(Ordering::SeqCst) {
            return Ok(false);
        }

        let mut record = self.mailbox.read();
        server.handle_record(&mut record)?;
        self.mailbox.write(&record);

        if self.rearm == RearmPolicy::Server {
            self.gates.client.post()?;
        }
        self.gates.response.post()?;

        self.exchanges += 1;
        debug!("Exchange {} done, {} session(s) live", self.exchanges, server.registry().len());
        Ok(true)
    }

    /// Serve exchanges until shutdown is requested, then tell clients the server is gone
    ///
    /// A returned error is fatal; the mailbox is left as is for other participants.
    pub fn run(&mut self, server: &mut Server) -> Result<()> {
        info!("Waiting for clients...");
        while self.serve_one(server)? {}

        info!(
            "Shutting down after {} exchange(s), {} session(s) still live",
            self.exchanges,
            server.registry().len()
        );
        self.announce_shutdown()
    }

    /// Mark the mailbox as abandoned and wake whoever is blocked on a client-side gate
    fn announce_shutdown(&self) -> Result<()> {
        self.mailbox
            .update(|record| record.set_terminate_flag(TerminateFlag::ServerGone));
        self.gates.client.post()?;
        self.gates.response.post()
    }

    /// Current gate values
    pub fn gate_values(&self) -> Result<GateValues> {
        self.gates.values()
    }

    /// Number of exchanges served so far
    pub fn exchanges(&self) -> u64 {
        self.exchanges
    }

    pub fn rearm_policy(&self) -> RearmPolicy {
        self.rearm
    }

    /// Get the name of the mailbox
    pub fn mailbox_name(&self) -> &str {
        self.mailbox.name()
    }
}

/// Client side of the channel
pub struct ClientChannel {
    mailbox: Mailbox,
    gates: Gates,
    rearm: RearmPolicy,
}

impl ClientChannel {
    /// Connect to a running server
    pub fn connect(namespace: &str) -> Result<Self> {
        let names = ObjectNames::new(namespace)?;
        let mailbox = Mailbox::open(&names.mailbox)?;
        let rearm = mailbox.rearm_policy()?;
        let gates = Gates::open(&names)?;

        debug!("Connected to '{}' ({:?} re-arm)", mailbox.name(), rearm);
        Ok(Self {
            mailbox,
            gates,
            rearm,
        })
    }

    /// Run one full exchange and return the record as the server left it
    pub fn round_trip(&self, request: &Request) -> Result<MailboxRecord> {
        self.gates.client.wait()?;

        let mut record = self.mailbox.read();
        if record.terminate_flag()? == TerminateFlag::ServerGone {
            // Pass the wake-up on to the next blocked client
            self.gates.client.post()?;
            return Err(HangmanError::ServerGone);
        }
        record.write_request(request);
        self.mailbox.write(&record);

        self.gates.server.post()?;
        self.gates.response.wait()?;

        let reply = self.mailbox.read();
        let server_gone = reply.terminate_flag == TerminateFlag::ServerGone as i8;
        if self.rearm == RearmPolicy::Client || server_gone {
            self.gates.client.post()?;
        }
        if server_gone {
            return Err(HangmanError::ServerGone);
        }
        Ok(reply)
    }

    /// Send a game request and decode the response
    pub fn request(&self, request: &Request) -> Result<Response> {
        self.round_trip(request)?.read_response()
    }

    /// Tell the server this session is leaving
    pub fn terminate(&self, session: Option<SessionId>) -> Result<()> {
        let record = self.round_trip(&Request {
            session,
            kind: RequestKind::Terminate,
        })?;
        if record.terminate_flag()? != TerminateFlag::Unset {
            warn!("Server did not consume the termination flag");
        }
        Ok(())
    }

    /// Send any request and decode what comes back
    pub fn exchange(&self, request: &Request) -> Result<Reply> {
        match request.kind {
            RequestKind::Terminate => self.terminate(request.session).map(|()| Reply::Terminated),
            _ => self.request(request).map(Reply::Game),
        }
    }

    pub fn rearm_policy(&self) -> RearmPolicy {
        self.rearm
    }

    /// Current gate values
    pub fn gate_values(&self) -> Result<GateValues> {
        self.gates.values()
    }
}
