//! The capability an operation queue composes over.
//!
//! Anything that can be opened, read, written, trimmed, measured and removed at byte granularity
//! implements [`RandomAccess`]. [`RandomAccessFile`] is the file-backed implementation; callers
//! that need to substitute storage (in tests, or over another backend) implement the trait
//! instead of wrapping the concrete type.

use std::future::Future;

use bytes::Bytes;

use crate::file::{
    CloseError, DeleteError, FileStat, OpenError, RandomAccessFile, ReadError, StatError,
    TruncateError, UnlinkError, WriteError,
};

/// Byte-addressed storage with an explicit open / close lifecycle.
pub trait RandomAccess: Send + Sync + 'static {
    /// Acquire whatever the storage needs before serving requests.
    fn open(&self) -> impl Future<Output = Result<(), OpenError>> + Send;

    /// Read exactly `size` bytes at `offset`.
    fn read(&self, offset: u64, size: usize) -> impl Future<Output = Result<Bytes, ReadError>> + Send;

    /// Write `data` at `offset`.
    fn write(&self, offset: u64, data: Bytes)
    -> impl Future<Output = Result<(), WriteError>> + Send;

    /// Delete `size` bytes at `offset`.
    fn del(&self, offset: u64, size: u64) -> impl Future<Output = Result<(), DeleteError>> + Send;

    /// Set the length to exactly `len`.
    fn truncate(&self, len: u64) -> impl Future<Output = Result<(), TruncateError>> + Send;

    /// Current metadata.
    fn stat(&self) -> impl Future<Output = Result<FileStat, StatError>> + Send;

    /// Release resources. The storage must stay usable.
    fn close(&self) -> impl Future<Output = Result<(), CloseError>> + Send;

    /// Release resources and remove the storage.
    fn destroy(&self) -> impl Future<Output = Result<(), UnlinkError>> + Send;
}

impl RandomAccess for RandomAccessFile {
    fn open(&self) -> impl Future<Output = Result<(), OpenError>> + Send {
        Self::open(self)
    }

    fn read(&self, offset: u64, size: usize) -> impl Future<Output = Result<Bytes, ReadError>> + Send {
        Self::read(self, offset, size)
    }

    fn write(&self, offset: u64, data: Bytes)
    -> impl Future<Output = Result<(), WriteError>> + Send {
        Self::write(self, offset, data)
    }

    fn del(&self, offset: u64, size: u64) -> impl Future<Output = Result<(), DeleteError>> + Send {
        Self::del(self, offset, size)
    }

    fn truncate(&self, len: u64) -> impl Future<Output = Result<(), TruncateError>> + Send {
        Self::truncate(self, len)
    }

    fn stat(&self) -> impl Future<Output = Result<FileStat, StatError>> + Send {
        Self::stat(self)
    }

    fn close(&self) -> impl Future<Output = Result<(), CloseError>> + Send {
        Self::close(self)
    }

    fn destroy(&self) -> impl Future<Output = Result<(), UnlinkError>> + Send {
        Self::destroy(self)
    }
}
