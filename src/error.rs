//! Error types for HangmanMemory

use std::io;
use thiserror::Error;

/// Result type for HangmanMemory operations
pub type Result<T> = std::result::Result<T, HangmanError>;

/// Exit code for general failures (usage, dictionary, server gone)
pub const EXIT_FAILURE: i32 = 1;
/// Exit code for shared memory and semaphore failures
pub const EXIT_SYNC_FAILURE: i32 = 2;
/// Exit code for an unknown session id or a corrupted mailbox record
pub const EXIT_PROTOCOL_CORRUPTION: i32 = 3;
/// Exit code for allocation failures
pub const EXIT_ALLOCATION_FAILURE: i32 = 4;

/// Errors that can occur in HangmanMemory operations
#[derive(Debug, Error)]
pub enum HangmanError {
    /// Failed to create shared memory
    #[error("Failed to create shared memory '{name}': {source}")]
    ShmCreate {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Failed to open shared memory
    #[error("Failed to open shared memory '{name}': {source}")]
    ShmOpen {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Failed to map memory
    #[error("Failed to map memory: {0}")]
    Mmap(#[source] io::Error),

    /// Failed to truncate shared memory
    #[error("Failed to set shared memory size: {0}")]
    Truncate(#[source] io::Error),

    /// Shared memory object has the wrong size for a mailbox
    #[error("Shared memory '{name}' has size {got}, expected {expected}")]
    SizeMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    /// Failed to create a named semaphore
    #[error("Failed to create semaphore '{name}': {source}")]
    SemCreate {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Failed to open a named semaphore
    #[error("Failed to open semaphore '{name}': {source}")]
    SemOpen {
        name: String,
        #[source]
        source: io::Error,
    },

    /// A wait, post or query on a semaphore failed
    #[error("Semaphore '{name}' {op} failed: {source}")]
    SemOp {
        name: String,
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// Invalid mailbox magic number
    #[error("Invalid mailbox magic number: expected 0x{expected:08X}, got 0x{got:08X}")]
    InvalidMagic { expected: u32, got: u32 },

    /// Mailbox layout version differs between server and client
    #[error("Mailbox version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u32, got: u32 },

    /// Mailbox header carries an unknown gate re-arm policy
    #[error("Invalid re-arm policy byte in mailbox header: {0}")]
    InvalidRearmPolicy(u8),

    /// Namespace too long for a POSIX object name
    #[error("Namespace too long: max {max} chars, got {got}")]
    NamespaceTooLong { max: usize, got: usize },

    /// Namespace contains a character POSIX names cannot hold
    #[error("Invalid namespace '{0}': must be non-empty and contain no '/' or NUL")]
    InvalidNamespace(String),

    /// The server received a session id it never handed out
    #[error("Unknown session id: {0}")]
    UnknownSession(i32),

    /// The mailbox carried a status byte outside the protocol
    #[error("Invalid status byte in mailbox: {0}")]
    InvalidStatus(u8),

    /// The mailbox carried a terminate flag outside the protocol
    #[error("Invalid terminate flag in mailbox: {0}")]
    InvalidTerminateFlag(i8),

    /// Registry could not grow or ran out of session ids
    #[error("Allocation failed: {0}")]
    Allocation(String),

    /// The server marked the mailbox as shut down
    #[error("Server terminated")]
    ServerGone,

    /// A guess rejected locally before any round-trip
    #[error("Invalid guess: {0}")]
    InvalidGuess(String),

    /// A client action not allowed in its current state
    #[error("Cannot {action} while {state}")]
    InvalidTransition { action: &'static str, state: String },

    /// A dictionary word that cannot be played
    #[error("Invalid word on line {line}: {reason}")]
    InvalidWord { line: usize, reason: String },

    /// Failed to read the dictionary
    #[error("Failed to read dictionary: {0}")]
    Dictionary(#[source] io::Error),
}

impl HangmanError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            HangmanError::ShmCreate { .. }
            | HangmanError::ShmOpen { .. }
            | HangmanError::Mmap(_)
            | HangmanError::Truncate(_)
            | HangmanError::SizeMismatch { .. }
            | HangmanError::SemCreate { .. }
            | HangmanError::SemOpen { .. }
            | HangmanError::SemOp { .. }
            | HangmanError::InvalidMagic { .. }
            | HangmanError::VersionMismatch { .. }
            | HangmanError::InvalidRearmPolicy(_) => EXIT_SYNC_FAILURE,
            HangmanError::UnknownSession(_)
            | HangmanError::InvalidStatus(_)
            | HangmanError::InvalidTerminateFlag(_) => EXIT_PROTOCOL_CORRUPTION,
            HangmanError::Allocation(_) => EXIT_ALLOCATION_FAILURE,
            HangmanError::NamespaceTooLong { .. }
            | HangmanError::InvalidNamespace(_)
            | HangmanError::ServerGone
            | HangmanError::InvalidGuess(_)
            | HangmanError::InvalidTransition { .. }
            | HangmanError::InvalidWord { .. }
            | HangmanError::Dictionary(_) => EXIT_FAILURE,
        }
    }

    /// Whether the process must stop after this error
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            HangmanError::InvalidGuess(_) | HangmanError::InvalidTransition { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_per_tier() {
        let sync = HangmanError::SemOp {
            name: "/x".into(),
            op: "wait",
            source: io::Error::from_raw_os_error(libc::EINVAL),
        };
        let session = HangmanError::UnknownSession(7);
        let alloc = HangmanError::Allocation("session ids exhausted".into());

        assert_eq!(sync.exit_code(), EXIT_SYNC_FAILURE);
        assert_eq!(session.exit_code(), EXIT_PROTOCOL_CORRUPTION);
        assert_eq!(alloc.exit_code(), EXIT_ALLOCATION_FAILURE);
        assert_eq!(HangmanError::ServerGone.exit_code(), EXIT_FAILURE);
    }

    #[test]
    fn test_invalid_guess_is_not_fatal() {
        assert!(!HangmanError::InvalidGuess("1".into()).is_fatal());
        assert!(HangmanError::UnknownSession(0).is_fatal());
    }
}
