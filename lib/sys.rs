//! Thin shims over the native calls the handle engine consumes as capabilities.

use std::fs::File;
use std::os::fd::IntoRawFd as _;

/// Mark `file` as sparse.
///
/// Unix regular files hold holes natively, so there is nothing to do beyond confirming the
/// descriptor refers to a regular file.
pub fn mark_sparse(file: &File) -> std::io::Result<()> {
    if file.metadata()?.is_file() {
        Ok(())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "only regular files can be sparse",
        ))
    }
}

/// Deallocate `len` bytes at `offset` without changing the file length.
///
/// The range reads back as zeros afterwards. Fails with [`std::io::ErrorKind::Unsupported`] on
/// platforms without hole punching.
#[cfg(target_os = "linux")]
pub fn punch_hole(file: &File, offset: u64, len: u64) -> std::io::Result<()> {
    use std::os::fd::AsRawFd as _;

    let offset = libc::off_t::try_from(offset).map_err(std::io::Error::other)?;
    let len = libc::off_t::try_from(len).map_err(std::io::Error::other)?;
    // SAFETY: the descriptor is owned by `file` and stays open for the duration of the call.
    let ret = unsafe {
        libc::fallocate(
            file.as_raw_fd(),
            libc::FALLOC_FL_PUNCH_HOLE | libc::FALLOC_FL_KEEP_SIZE,
            offset,
            len,
        )
    };
    if ret == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// Deallocate `len` bytes at `offset` without changing the file length.
#[cfg(not(target_os = "linux"))]
pub fn punch_hole(_file: &File, _offset: u64, _len: u64) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "hole punching is not available on this platform",
    ))
}

/// Returns `true` if `err` means the filesystem cannot punch holes at all.
#[must_use]
pub fn is_unsupported(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::Unsupported
        || matches!(err.raw_os_error(), Some(libc::EOPNOTSUPP | libc::ENOSYS))
}

/// Close a descriptor and report the result of `close(2)`, which dropping a [`File`] discards.
pub fn close(file: File) -> std::io::Result<()> {
    let fd = file.into_raw_fd();
    // SAFETY: `into_raw_fd` transferred ownership of `fd` to us and nothing else closes it.
    let ret = unsafe { libc::close(fd) };
    if ret == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}
