//! Byte-range deletion.
//!
//! A deletion that reaches the end of the file truncates it to the range's start, exactly like
//! `truncate(offset)`, so a start past the end grows the file. Anything strictly inside the file
//! is zeroed in place, by punching a hole where the filesystem supports it and by writing zeros
//! where it does not, so the logical length never changes and the range always reads back as
//! zeros.

use std::fs::File;

use tracing::debug;

use crate::io::write_all_at;
use crate::sys;

/// Legacy `size` meaning "everything from `offset` on". Equivalent to truncating to `offset`.
pub const DELETE_TO_END: u64 = u64::MAX;

/// Zeros written per syscall when hole punching is unavailable.
const ZERO_CHUNK: usize = 64 * 1024;

/// What a deletion does to the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    /// Nothing to delete.
    Noop,
    /// Set the file's length to this, shrinking or growing it.
    Truncate(u64),
    /// Zero `len` bytes at `offset`, keeping the length.
    Zero {
        /// Start of the range.
        offset: u64,
        /// Length of the range.
        len: u64,
    },
}

/// Decide what deleting `size` bytes at `offset` means for a file of length `file_len`.
#[must_use]
pub fn plan(offset: u64, size: u64, file_len: u64) -> Deletion {
    if size == 0 {
        return Deletion::Noop;
    }
    if size == DELETE_TO_END || offset.saturating_add(size) >= file_len {
        return Deletion::Truncate(offset);
    }
    Deletion::Zero { offset, len: size }
}

/// Delete `size` bytes at `offset`. Blocking.
pub fn delete(file: &File, offset: u64, size: u64) -> std::io::Result<Deletion> {
    let deletion = plan(offset, size, file.metadata()?.len());
    match deletion {
        Deletion::Noop => {}
        Deletion::Truncate(len) => file.set_len(len)?,
        Deletion::Zero { offset, len } => zero_range(file, offset, len)?,
    }
    Ok(deletion)
}

fn zero_range(file: &File, offset: u64, len: u64) -> std::io::Result<()> {
    match sys::punch_hole(file, offset, len) {
        Ok(()) => Ok(()),
        Err(e) if sys::is_unsupported(&e) => {
            debug!(offset, len, "hole punching unsupported, writing zeros");
            write_zeros(file, offset, len)
        }
        Err(e) => Err(e),
    }
}

fn write_zeros(file: &File, mut offset: u64, len: u64) -> std::io::Result<()> {
    let zeros = vec![0u8; ZERO_CHUNK];
    let end = offset + len;
    while offset < end {
        let chunk = usize::try_from(end - offset).map_or(ZERO_CHUNK, |n| n.min(ZERO_CHUNK));
        write_all_at(file, &zeros[..chunk], offset)?;
        offset += chunk as u64;
    }
    Ok(())
}
