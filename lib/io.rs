//! Random IO utilities.
//!
//! Positional read/write loops that survive short syscalls, and the directory plumbing a handle
//! needs around open and destroy.

use std::path::Path;

use thiserror::Error;
use tracing::trace;

/// Positional I/O on something that behaves like a file descriptor.
///
/// Implemented for [`std::fs::File`]; tests substitute sources that return short counts.
pub trait PositionalIo: Send + Sync + 'static {
    /// Read into `buf` starting at `offset`, returning how many bytes were read. Zero means EOF.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize>;

    /// Write from `buf` starting at `offset`, returning how many bytes were written.
    fn write_at(&self, buf: &[u8], offset: u64) -> std::io::Result<usize>;
}

impl PositionalIo for std::fs::File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> std::io::Result<usize> {
        std::os::unix::fs::FileExt::write_at(self, buf, offset)
    }
}

/// The request could not be fully satisfied before end-of-file.
#[derive(Debug, Error)]
pub enum ReadAtError {
    /// EOF was hit. Carries the request as issued, not the remainder.
    #[error("could not satisfy length: {size} bytes at offset {offset}")]
    Unsatisfiable {
        /// Offset of the original request.
        offset: u64,
        /// Size of the original request.
        size: usize,
    },

    /// The underlying read failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Write all of `buf` at `offset`, retrying short writes.
///
/// A write that makes no progress is reported as [`std::io::ErrorKind::WriteZero`] instead of
/// being retried forever.
pub fn write_all_at<I: PositionalIo + ?Sized>(
    io: &I,
    mut buf: &[u8],
    mut offset: u64,
) -> std::io::Result<()> {
    while !buf.is_empty() {
        match io.write_at(buf, offset) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "positional write made no progress",
                ));
            }
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Fill `buf` from `offset` until it is full or EOF is reached. Returns the bytes read.
pub fn fill_at<I: PositionalIo + ?Sized>(
    io: &I,
    buf: &mut [u8],
    offset: u64,
) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match io.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read exactly `buf.len()` bytes at `offset`, retrying short reads.
pub fn read_exact_at<I: PositionalIo + ?Sized>(
    io: &I,
    buf: &mut [u8],
    offset: u64,
) -> Result<(), ReadAtError> {
    let filled = fill_at(io, buf, offset)?;
    if filled < buf.len() {
        return Err(ReadAtError::Unsatisfiable {
            offset,
            size: buf.len(),
        });
    }
    Ok(())
}

/// Create the parent directory of `path`, and any missing ancestors.
pub async fn create_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent).await,
        _ => Ok(()),
    }
}

/// Remove empty directories from the parent of `path` upwards, stopping below `root`.
///
/// Stops quietly at the first directory that cannot be removed (typically because it is not
/// empty). `root` itself is never removed. Returns how many directories were removed.
pub async fn remove_empty_ancestors(path: &Path, root: &Path) -> usize {
    let mut removed = 0;
    let mut dir = path.parent();
    while let Some(current) = dir {
        if current == root || !current.starts_with(root) {
            break;
        }
        if let Err(e) = tokio::fs::remove_dir(current).await {
            trace!(dir = %current.display(), error = %e, "stopped removing ancestors");
            break;
        }
        removed += 1;
        dir = current.parent();
    }
    removed
}
