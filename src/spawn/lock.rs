//! Cross-process spawn lock.
//!
//! An advisory exclusive `flock` on a fixed lock file serializes spawns
//! across every instance of the bridge on the host, including after a
//! crash-restart (the kernel releases the lock when the holder's descriptor
//! closes). Acquisition is non-blocking: a held lock is reported as busy,
//! never waited on.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::PathBuf;

/// Non-blocking, filesystem-backed mutual exclusion for spawns.
#[derive(Debug, Clone)]
pub struct SpawnLock {
    path: PathBuf,
}

impl SpawnLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Try to acquire the lock.
    ///
    /// Returns `Ok(Some(guard))` when acquired, `Ok(None)` when another
    /// holder (in this process or any other) currently has it.
    pub fn acquire(&self) -> io::Result<Option<SpawnLockGuard>> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)?;

        if try_flock_exclusive(&file)? {
            Ok(Some(SpawnLockGuard { _file: file }))
        } else {
            Ok(None)
        }
    }
}

/// RAII guard for the spawn lock.
///
/// Dropping the guard closes the descriptor, which releases the `flock` on
/// every exit path. Release is idempotent by construction.
#[derive(Debug)]
pub struct SpawnLockGuard {
    _file: File,
}

/// Try to acquire an exclusive flock on a file (non-blocking).
///
/// Returns `Ok(true)` if the lock was acquired, `Ok(false)` if the file is
/// already locked by another holder.
fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: flock is a standard POSIX call. fd is a valid descriptor
        // owned by `file`. LOCK_EX | LOCK_NB is a non-blocking exclusive lock.
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK)
        {
            return Ok(false);
        }
        Err(err)
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(true)
    }
}
