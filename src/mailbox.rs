//! The single-slot mailbox shared by the server and one client at a time
//!
//! The shared memory object holds a small header (magic, layout version and
//! the gate re-arm policy) followed by one [`MailboxRecord`]. Requests and
//! responses are written into the same record; which one it currently holds
//! is known only from the semaphore protocol, never from its contents.

use crate::channel::RearmPolicy;
use crate::error::{HangmanError, Result};
use crate::shm::SharedRegion;
use std::fmt;
use std::ptr::NonNull;

/// Magic number for mailbox validation
const MAILBOX_MAGIC: u32 = 0x48414E47; // "HANG"
const MAILBOX_VERSION: u32 = 1;

/// Capacity of the masked word buffer, NUL terminator included
pub const MAX_DATA: usize = 50;

/// Longest playable word
pub const MAX_WORD_LEN: usize = MAX_DATA - 1;

/// Wrong guesses that lose a game
pub const MAX_ERRORS: u8 = 9;

/// Shown in the masked word for an unrevealed letter
pub const PLACEHOLDER: u8 = b'_';

/// Raw `session_id` of a client the server has not registered yet
pub const NEW_SESSION: i32 = -1;

/// Status byte values on the wire
mod status_byte {
    pub const REQUEST_NEW_GAME: u8 = 0;
    pub const NEW_GAME_STARTED: u8 = 1;
    pub const ROUND_IN_PROGRESS: u8 = 2;
    pub const WON: u8 = 3;
    pub const LOST: u8 = 4;
    pub const NO_GAMES_LEFT: u8 = 5;
}

/// Server-assigned identity of one client
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(i32);

impl SessionId {
    /// Wrap a raw id; negative values are not session ids
    pub fn new(raw: i32) -> Option<Self> {
        (raw >= 0).then_some(Self(raw))
    }

    #[inline]
    pub fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome the server reports back
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseStatus {
    NewGameStarted,
    RoundContinues,
    Won,
    Lost,
    NoGamesLeft,
}

impl ResponseStatus {
    fn to_byte(self) -> u8 {
        match self {
            ResponseStatus::NewGameStarted => status_byte::NEW_GAME_STARTED,
            ResponseStatus::RoundContinues => status_byte::ROUND_IN_PROGRESS,
            ResponseStatus::Won => status_byte::WON,
            ResponseStatus::Lost => status_byte::LOST,
            ResponseStatus::NoGamesLeft => status_byte::NO_GAMES_LEFT,
        }
    }

    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            status_byte::NEW_GAME_STARTED => Ok(ResponseStatus::NewGameStarted),
            status_byte::ROUND_IN_PROGRESS => Ok(ResponseStatus::RoundContinues),
            status_byte::WON => Ok(ResponseStatus::Won),
            status_byte::LOST => Ok(ResponseStatus::Lost),
            status_byte::NO_GAMES_LEFT => Ok(ResponseStatus::NoGamesLeft),
            other => Err(HangmanError::InvalidStatus(other)),
        }
    }
}

/// Tri-state termination marker
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i8)]
pub enum TerminateFlag {
    /// No termination pending (also the value after the server consumes one)
    Unset = -1,
    /// The client writing the record is leaving
    ClientQuit = 1,
    /// The server is tearing the mailbox down
    ServerGone = 2,
}

impl TerminateFlag {
    fn from_raw(raw: i8) -> Result<Self> {
        match raw {
            -1 => Ok(TerminateFlag::Unset),
            1 => Ok(TerminateFlag::ClientQuit),
            2 => Ok(TerminateFlag::ServerGone),
            other => Err(HangmanError::InvalidTerminateFlag(other)),
        }
    }
}

/// What a client asks for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    NewGame,
    /// Uppercase ASCII letter
    Guess(u8),
    Terminate,
}

/// A decoded client request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Request {
    /// `None` until the server has assigned an id
    pub session: Option<SessionId>,
    pub kind: RequestKind,
}

/// A decoded server response to a game request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub session: SessionId,
    pub status: ResponseStatus,
    pub masked_word: String,
    pub error_count: u8,
}

/// What the server writes back
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Game(Response),
    /// The termination request was consumed
    Terminated,
}

/// The record exchanged through shared memory
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MailboxRecord {
    pub session_id: i32,
    pub errors: u8,
    pub masked_word: [u8; MAX_DATA],
    pub guess: u8,
    pub terminate_flag: i8,
    pub status: u8,
}

impl Default for MailboxRecord {
    fn default() -> Self {
        Self {
            session_id: NEW_SESSION,
            errors: 0,
            masked_word: [0; MAX_DATA],
            guess: 0,
            terminate_flag: TerminateFlag::Unset as i8,
            status: status_byte::REQUEST_NEW_GAME,
        }
    }
}

impl MailboxRecord {
    /// Decode the terminate flag
    pub fn terminate_flag(&self) -> Result<TerminateFlag> {
        TerminateFlag::from_raw(self.terminate_flag)
    }

    pub fn set_terminate_flag(&mut self, flag: TerminateFlag) {
        self.terminate_flag = flag as i8;
    }

    /// Masked word up to the NUL terminator
    pub fn masked_word(&self) -> String {
        let len = self
            .masked_word
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_DATA);
        String::from_utf8_lossy(&self.masked_word[..len]).into_owned()
    }

    fn set_masked_word(&mut self, word: &str) {
        let bytes = word.as_bytes();
        let len = bytes.len().min(MAX_WORD_LEN);
        self.masked_word = [0; MAX_DATA];
        self.masked_word[..len].copy_from_slice(&bytes[..len]);
    }

    /// Client side: fill in the request fields
    pub fn write_request(&mut self, request: &Request) {
        self.session_id = request.session.map_or(NEW_SESSION, SessionId::get);
        match request.kind {
            RequestKind::NewGame => {
                self.status = status_byte::REQUEST_NEW_GAME;
                self.guess = 0;
                self.set_terminate_flag(TerminateFlag::Unset);
            }
            RequestKind::Guess(letter) => {
                self.status = status_byte::ROUND_IN_PROGRESS;
                self.guess = letter.to_ascii_uppercase();
                self.set_terminate_flag(TerminateFlag::Unset);
            }
            RequestKind::Terminate => {
                self.guess = 0;
                self.set_terminate_flag(TerminateFlag::ClientQuit);
            }
        }
    }

    /// Server side: decode the request a client left in the record
    pub fn read_request(&self) -> Result<Request> {
        let session = match self.session_id {
            NEW_SESSION => None,
            raw => Some(SessionId::new(raw).ok_or(HangmanError::UnknownSession(raw))?),
        };

        let kind = match self.terminate_flag()? {
            TerminateFlag::ClientQuit => RequestKind::Terminate,
            TerminateFlag::ServerGone => return Err(HangmanError::ServerGone),
            TerminateFlag::Unset => match self.status {
                status_byte::REQUEST_NEW_GAME => RequestKind::NewGame,
                status_byte::ROUND_IN_PROGRESS => {
                    RequestKind::Guess(self.guess.to_ascii_uppercase())
                }
                other => return Err(HangmanError::InvalidStatus(other)),
            },
        };

        Ok(Request { session, kind })
    }

    /// Server side: fill in the response fields
    pub fn write_reply(&mut self, reply: &Reply) {
        match reply {
            Reply::Game(response) => {
                self.session_id = response.session.get();
                self.status = response.status.to_byte();
                self.errors = response.error_count;
                self.set_masked_word(&response.masked_word);
            }
            Reply::Terminated => {
                self.session_id = NEW_SESSION;
                self.set_terminate_flag(TerminateFlag::Unset);
            }
        }
    }

    /// Client side: decode the server's response to a game request
    pub fn read_response(&self) -> Result<Response> {
        if self.terminate_flag()? == TerminateFlag::ServerGone {
            return Err(HangmanError::ServerGone);
        }
        let session =
            SessionId::new(self.session_id).ok_or(HangmanError::UnknownSession(self.session_id))?;
        Ok(Response {
            session,
            status: ResponseStatus::from_byte(self.status)?,
            masked_word: self.masked_word(),
            error_count: self.errors,
        })
    }
}

/// Header stored at the beginning of the shared memory
#[repr(C)]
struct MailboxHeader {
    magic: u32,
    version: u32,
    rearm: u8,
    _pad: [u8; 7],
}

/// Full layout of the shared memory object
#[repr(C)]
pub struct MailboxRegion {
    header: MailboxHeader,
    record: MailboxRecord,
}

/// Mapped view of the mailbox
pub struct Mailbox {
    shm: SharedRegion,
    region: NonNull<MailboxRegion>,
}

// SAFETY: access to the record is serialised by the semaphore protocol
unsafe impl Send for Mailbox {}
unsafe impl Sync for Mailbox {}

impl Mailbox {
    /// Size of the shared memory object
    pub const SIZE: usize = std::mem::size_of::<MailboxRegion>();

    /// Create the mailbox as the server (owner)
    pub fn create(name: &str, rearm: RearmPolicy) -> Result<Self> {
        let shm = SharedRegion::create(name, Self::SIZE)?;
        let region = Self::region_ptr(&shm);

        unsafe {
            let base = region.as_ptr();
            (*base).header.magic = MAILBOX_MAGIC;
            (*base).header.version = MAILBOX_VERSION;
            (*base).header.rearm = rearm.to_byte();
            std::ptr::write_volatile(&mut (*base).record, MailboxRecord::default());
        }

        Ok(Self { shm, region })
    }

    /// Open an existing mailbox as a client
    ///
    /// A mailbox the server has not finished setting up (not sized yet, or
    /// header still zero) reads as missing.
    pub fn open(name: &str) -> Result<Self> {
        let shm = match SharedRegion::open(name, Self::SIZE) {
            Err(HangmanError::SizeMismatch { got: 0, .. }) => return Err(Self::not_ready(name)),
            other => other?,
        };
        let region = Self::region_ptr(&shm);

        let header = unsafe { &(*region.as_ptr()).header };
        if header.magic == 0 {
            return Err(Self::not_ready(name));
        }
        if header.magic != MAILBOX_MAGIC {
            return Err(HangmanError::InvalidMagic {
                expected: MAILBOX_MAGIC,
                got: header.magic,
            });
        }
        if header.version != MAILBOX_VERSION {
            return Err(HangmanError::VersionMismatch {
                expected: MAILBOX_VERSION,
                got: header.version,
            });
        }

        Ok(Self { shm, region })
    }

    fn not_ready(name: &str) -> HangmanError {
        HangmanError::ShmOpen {
            name: name.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "server still starting"),
        }
    }

    fn region_ptr(shm: &SharedRegion) -> NonNull<MailboxRegion> {
        // SAFETY: the mapping is page aligned and at least SIZE bytes
        unsafe { NonNull::new_unchecked(shm.as_ptr().cast::<MailboxRegion>()) }
    }

    /// Gate re-arm policy chosen by the server
    pub fn rearm_policy(&self) -> Result<RearmPolicy> {
        let byte = unsafe { (*self.region.as_ptr()).header.rearm };
        RearmPolicy::from_byte(byte)
    }

    /// Copy the record out of shared memory
    ///
    /// Only the current owner of the exchange may call this.
    #[inline]
    pub fn read(&self) -> MailboxRecord {
        unsafe { std::ptr::read_volatile(&(*self.region.as_ptr()).record) }
    }

    /// Copy a record into shared memory
    ///
    /// Only the current owner of the exchange may call this.
    #[inline]
    pub fn write(&self, record: &MailboxRecord) {
        unsafe { std::ptr::write_volatile(&mut (*self.region.as_ptr()).record, *record) }
    }

    /// Read, modify and write back the record
    #[inline]
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut MailboxRecord),
    {
        let mut record = self.read();
        f(&mut record);
        self.write(&record);
    }

    /// Get the name of the shared memory object
    pub fn name(&self) -> &str {
        self.shm.name()
    }
}
