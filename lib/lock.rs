//! Advisory whole-file locks taken while a handle opens.

use std::fmt::Debug;
use std::fs::File;
use std::os::fd::AsRawFd as _;

/// Which side of the reader/writer protocol a lock takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKind {
    /// Any number of shared locks may coexist. Taken by read-only handles.
    Shared,
    /// Excludes every other lock on the file. Taken by writable handles.
    Exclusive,
}

/// Non-blocking advisory locking on an open descriptor.
///
/// Locks are scoped to the underlying file and must be visible across independently opened
/// descriptors, including descriptors held by other processes.
pub trait Locker: Debug + Send + Sync + 'static {
    /// Try to take a lock of `kind` without waiting.
    ///
    /// Returns `Ok(false)` when a conflicting lock is held elsewhere.
    fn try_lock(&self, file: &File, kind: LockKind) -> std::io::Result<bool>;

    /// Drop a lock taken by [`try_lock`](Self::try_lock). Closing the descriptor also releases it.
    fn unlock(&self, _file: &File) -> std::io::Result<()> {
        Ok(())
    }
}

/// [`Locker`] backed by `flock(2)`.
///
/// `flock` locks belong to the open file description, so two handles in the same process
/// conflict just like two processes would.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlockLocker;

impl Locker for FlockLocker {
    fn try_lock(&self, file: &File, kind: LockKind) -> std::io::Result<bool> {
        let op = match kind {
            LockKind::Shared => libc::LOCK_SH,
            LockKind::Exclusive => libc::LOCK_EX,
        };
        // SAFETY: the descriptor is owned by `file` and stays open for the duration of the call.
        let ret = unsafe { libc::flock(file.as_raw_fd(), op | libc::LOCK_NB) };
        if ret == 0 {
            return Ok(true);
        }
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::WouldBlock {
            Ok(false)
        } else {
            Err(err)
        }
    }

    fn unlock(&self, file: &File) -> std::io::Result<()> {
        // SAFETY: as above.
        let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
        if ret == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }
}
