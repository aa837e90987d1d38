//! POSIX named semaphores
//!
//! Thin owner-aware wrapper over `sem_open`/`sem_wait`/`sem_post`. The creating
//! handle unlinks the name on drop, every handle closes its own descriptor.
//! Waits block with no timeout.

use crate::error::{HangmanError, Result};
use std::ffi::CString;
use std::io;
use std::ptr::NonNull;

/// Permission bits for created semaphores
const SEM_MODE: libc::mode_t = 0o600;

/// Handle to a named counting semaphore
pub struct NamedSemaphore {
    sem: NonNull<libc::sem_t>,
    name: String,
    is_owner: bool,
}

// SAFETY: sem_wait/sem_post are thread-safe on a shared sem_t
unsafe impl Send for NamedSemaphore {}
unsafe impl Sync for NamedSemaphore {}

fn c_name(name: &str) -> Result<CString> {
    CString::new(name).map_err(|_| HangmanError::InvalidNamespace(name.to_string()))
}

impl NamedSemaphore {
    /// Create a new semaphore with `initial` as its value
    ///
    /// Fails if the name already exists.
    pub fn create(name: &str, initial: u32) -> Result<Self> {
        let c_name = c_name(name)?;
        let sem = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                SEM_MODE as libc::c_uint,
                initial as libc::c_uint,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(HangmanError::SemCreate {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }

        Ok(Self {
            sem: Self::non_null(sem, name)?,
            name: name.to_string(),
            is_owner: true,
        })
    }

    /// Open an existing semaphore
    pub fn open(name: &str) -> Result<Self> {
        let c_name = c_name(name)?;
        let sem = unsafe { libc::sem_open(c_name.as_ptr(), 0) };
        if sem == libc::SEM_FAILED {
            return Err(HangmanError::SemOpen {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }

        Ok(Self {
            sem: Self::non_null(sem, name)?,
            name: name.to_string(),
            is_owner: false,
        })
    }

    fn non_null(sem: *mut libc::sem_t, name: &str) -> Result<NonNull<libc::sem_t>> {
        NonNull::new(sem).ok_or_else(|| HangmanError::SemOpen {
            name: name.to_string(),
            source: io::Error::new(io::ErrorKind::Other, "sem_open returned null"),
        })
    }

    /// Remove a leftover semaphore by name, ignoring a missing one
    ///
    /// Returns `true` if something was removed.
    pub fn unlink(name: &str) -> Result<bool> {
        let c_name = c_name(name)?;
        if unsafe { libc::sem_unlink(c_name.as_ptr()) } == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOENT) {
            Ok(false)
        } else {
            Err(HangmanError::SemOp {
                name: name.to_string(),
                op: "unlink",
                source: err,
            })
        }
    }

    /// Decrement, blocking until the value is positive
    ///
    /// Interrupted waits are retried.
    pub fn wait(&self) -> Result<()> {
        loop {
            if unsafe { libc::sem_wait(self.sem.as_ptr()) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(self.op_error("wait", err));
            }
        }
    }

    /// Decrement if the value is positive, without blocking
    ///
    /// Returns `false` if the semaphore was zero.
    pub fn try_wait(&self) -> Result<bool> {
        loop {
            if unsafe { libc::sem_trywait(self.sem.as_ptr()) } == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EAGAIN) => return Ok(false),
                Some(libc::EINTR) => continue,
                _ => return Err(self.op_error("trywait", err)),
            }
        }
    }

    /// Increment, waking one waiter
    pub fn post(&self) -> Result<()> {
        if unsafe { libc::sem_post(self.sem.as_ptr()) } == 0 {
            Ok(())
        } else {
            Err(self.op_error("post", io::Error::last_os_error()))
        }
    }

    /// Current value of the semaphore
    pub fn value(&self) -> Result<i32> {
        let mut value: libc::c_int = 0;
        if unsafe { libc::sem_getvalue(self.sem.as_ptr(), &mut value) } == 0 {
            Ok(value)
        } else {
            Err(self.op_error("getvalue", io::Error::last_os_error()))
        }
    }

    /// Get the name of the semaphore
    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if this handle owns (and will unlink) the semaphore
    #[inline(always)]
    pub fn is_owner(&self) -> bool {
        self.is_owner
    }

    fn op_error(&self, op: &'static str, source: io::Error) -> HangmanError {
        HangmanError::SemOp {
            name: self.name.clone(),
            op,
            source,
        }
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        unsafe {
            let _ = libc::sem_close(self.sem.as_ptr());
        }

        if self.is_owner {
            if let Ok(c_name) = CString::new(self.name.as_str()) {
                unsafe {
                    let _ = libc::sem_unlink(c_name.as_ptr());
                }
            }
        }
    }
}
