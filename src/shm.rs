//! Low-level POSIX shared memory operations

use crate::error::{HangmanError, Result};
use rustix::fd::OwnedFd;
use rustix::fs::ftruncate;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use rustix::shm::{shm_open, shm_unlink, Mode, ShmOFlags};
use std::ffi::CString;
use std::ptr::NonNull;

/// Longest name POSIX accepts for shm and semaphore objects (NAME_MAX minus "sem.")
pub const MAX_OBJECT_NAME_LEN: usize = 251;

/// Build the POSIX object name `/{namespace}{suffix}`
pub fn object_name(namespace: &str, suffix: &str) -> Result<String> {
    if namespace.is_empty() || namespace.contains('/') || namespace.contains('\0') {
        return Err(HangmanError::InvalidNamespace(namespace.to_string()));
    }
    let full_name = format!("/{}{}", namespace, suffix);
    if full_name.len() > MAX_OBJECT_NAME_LEN {
        return Err(HangmanError::NamespaceTooLong {
            max: MAX_OBJECT_NAME_LEN - suffix.len() - 1,
            got: namespace.len(),
        });
    }
    Ok(full_name)
}

fn c_name(name: &str) -> Result<CString> {
    CString::new(name).map_err(|_| HangmanError::InvalidNamespace(name.to_string()))
}

/// Handle to a shared memory region
pub struct SharedRegion {
    #[allow(dead_code)]
    fd: OwnedFd,
    addr: NonNull<u8>,
    size: usize,
    name: String,
    is_owner: bool,
}

// SAFETY: the mapping stays valid for the handle's lifetime; access to the
// contents is serialised by the semaphore protocol, not by this type
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Create a new shared memory region
    ///
    /// # Arguments
    /// * `name` - Full POSIX name, e.g. "/hangman_mailbox"
    /// * `size` - Size in bytes
    ///
    /// Fails if an object with this name already exists; a stale object from a
    /// crashed server has to be removed with [`SharedRegion::unlink`] first.
    pub fn create(name: &str, size: usize) -> Result<Self> {
        let c_name = c_name(name)?;

        let fd = shm_open(
            c_name.as_c_str(),
            ShmOFlags::CREATE | ShmOFlags::EXCL | ShmOFlags::RDWR,
            Mode::RUSR | Mode::WUSR,
        )
        .map_err(|e| HangmanError::ShmCreate {
            name: name.to_string(),
            source: e.into(),
        })?;

        // From here on a failure must not leave the name behind
        let unlink_on_err = |err: HangmanError| {
            let _ = shm_unlink(c_name.as_c_str());
            err
        };

        ftruncate(&fd, size as u64)
            .map_err(|e| unlink_on_err(HangmanError::Truncate(e.into())))?;

        let addr = Self::map(&fd, size).map_err(unlink_on_err)?;

        // Zero initialize
        unsafe {
            std::ptr::write_bytes(addr.as_ptr(), 0, size);
        }

        Ok(Self {
            fd,
            addr,
            size,
            name: name.to_string(),
            is_owner: true,
        })
    }

    /// Open an existing shared memory region, checking it has `expected_size` bytes
    pub fn open(name: &str, expected_size: usize) -> Result<Self> {
        let c_name = c_name(name)?;

        let fd = shm_open(c_name.as_c_str(), ShmOFlags::RDWR, Mode::empty()).map_err(|e| {
            HangmanError::ShmOpen {
                name: name.to_string(),
                source: e.into(),
            }
        })?;

        // Get size from file
        let stat = rustix::fs::fstat(&fd).map_err(|e| HangmanError::ShmOpen {
            name: name.to_string(),
            source: e.into(),
        })?;
        let size = stat.st_size as usize;
        if size != expected_size {
            return Err(HangmanError::SizeMismatch {
                name: name.to_string(),
                expected: expected_size,
                got: size,
            });
        }

        let addr = Self::map(&fd, size)?;

        Ok(Self {
            fd,
            addr,
            size,
            name: name.to_string(),
            is_owner: false,
        })
    }

    fn map(fd: &OwnedFd, size: usize) -> Result<NonNull<u8>> {
        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                fd,
                0,
            )
            .map_err(|e| HangmanError::Mmap(e.into()))?
        };

        NonNull::new(addr.cast::<u8>()).ok_or_else(|| {
            HangmanError::Mmap(std::io::Error::new(
                std::io::ErrorKind::Other,
                "mmap returned null",
            ))
        })
    }

    /// Remove a leftover object by name, ignoring a missing one
    ///
    /// Returns `true` if something was removed.
    pub fn unlink(name: &str) -> Result<bool> {
        let c_name = c_name(name)?;
        match shm_unlink(c_name.as_c_str()) {
            Ok(()) => Ok(true),
            Err(rustix::io::Errno::NOENT) => Ok(false),
            Err(e) => Err(HangmanError::ShmOpen {
                name: name.to_string(),
                source: e.into(),
            }),
        }
    }

    /// Get raw pointer to shared memory
    #[inline(always)]
    pub fn as_ptr(&self) -> *mut u8 {
        self.addr.as_ptr()
    }

    /// Get size of shared memory region
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the name of shared memory
    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if this handle owns the shared memory
    #[inline(always)]
    pub fn is_owner(&self) -> bool {
        self.is_owner
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.addr.as_ptr().cast(), self.size);
        }

        if self.is_owner {
            if let Ok(c_name) = CString::new(self.name.as_str()) {
                let _ = shm_unlink(c_name.as_c_str());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique(tag: &str) -> String {
        format!("/hm_test_{}_{}", tag, std::process::id())
    }

    #[test]
    fn test_create_and_open() {
        let name = unique("shm_create");
        let size = 4096;

        let shm1 = SharedRegion::create(&name, size).unwrap();
        assert!(shm1.is_owner());
        assert_eq!(shm1.size(), size);

        unsafe {
            std::ptr::write(shm1.as_ptr(), 42u8);
        }

        // Open from another "process"
        let shm2 = SharedRegion::open(&name, size).unwrap();
        assert!(!shm2.is_owner());

        let val = unsafe { std::ptr::read(shm2.as_ptr()) };
        assert_eq!(val, 42u8);

        // Drop shm2 first, then shm1 will unlink
        drop(shm2);
        drop(shm1);

        assert!(matches!(
            SharedRegion::open(&name, size),
            Err(HangmanError::ShmOpen { .. })
        ));
    }

    #[test]
    fn test_create_is_exclusive() {
        let name = unique("shm_excl");
        let first = SharedRegion::create(&name, 64).unwrap();
        assert!(matches!(
            SharedRegion::create(&name, 64),
            Err(HangmanError::ShmCreate { .. })
        ));
        drop(first);
        assert!(!SharedRegion::unlink(&name).unwrap());
    }

    #[test]
    fn test_open_rejects_wrong_size() {
        let name = unique("shm_size");
        let _owner = SharedRegion::create(&name, 64).unwrap();
        assert!(matches!(
            SharedRegion::open(&name, 128),
            Err(HangmanError::SizeMismatch { expected: 128, got: 64, .. })
        ));
    }

    #[test]
    fn test_object_name_validation() {
        assert_eq!(object_name("hangman", "_mailbox").unwrap(), "/hangman_mailbox");
        assert!(matches!(object_name("", "_x"), Err(HangmanError::InvalidNamespace(_))));
        assert!(matches!(object_name("a/b", "_x"), Err(HangmanError::InvalidNamespace(_))));
        let long = "n".repeat(300);
        assert!(matches!(
            object_name(&long, "_mailbox"),
            Err(HangmanError::NamespaceTooLong { .. })
        ));
    }
}
