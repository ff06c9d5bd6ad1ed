//! Errors returned by [`RandomAccessFile`](super::RandomAccessFile) operations.
//!
//! Every error converts into the errno a caller at the syscall boundary would report.

use std::path::PathBuf;

use thiserror::Error;

fn io_errno(err: &std::io::Error) -> i32 {
    err.raw_os_error().unwrap_or(libc::EIO)
}

/// Opening the descriptor failed. The handle is left closed.
#[derive(Debug, Error)]
pub enum OpenError {
    /// The parent directory could not be created.
    #[error("failed to create parent directory of {}: {source}", path.display())]
    CreateDir {
        /// Resolved path of the file.
        path: PathBuf,
        /// The underlying OS error.
        source: std::io::Error,
    },

    /// A descriptor left over from a previous open could not be closed.
    #[error("failed to close stale descriptor of {}: {source}", path.display())]
    CloseStale {
        /// Resolved path of the file.
        path: PathBuf,
        /// The underlying OS error.
        source: std::io::Error,
    },

    /// The OS refused to open the file.
    #[error("failed to open {}: {source}", path.display())]
    Io {
        /// Resolved path of the file.
        path: PathBuf,
        /// The underlying OS error.
        source: std::io::Error,
    },

    /// Another descriptor holds a conflicting lock.
    #[error("ELOCKED: File is locked: {}", path.display())]
    Locked {
        /// Resolved path of the file.
        path: PathBuf,
    },

    /// The file could not be marked sparse.
    #[error("ENOTSPARSE: File could not be marked as sparse: {}", path.display())]
    NotSparse {
        /// Resolved path of the file.
        path: PathBuf,
        /// The underlying OS error.
        source: std::io::Error,
    },

    /// Truncating to the declared size failed.
    #[error("failed to truncate {} on open: {source}", path.display())]
    Truncate {
        /// Resolved path of the file.
        path: PathBuf,
        /// The underlying OS error.
        source: std::io::Error,
    },
}

impl OpenError {
    /// The string code for errors that have one.
    #[must_use]
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Locked { .. } => Some("ELOCKED"),
            Self::NotSparse { .. } => Some("ENOTSPARSE"),
            _ => None,
        }
    }

    /// The resolved path the error refers to.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::CreateDir { path, .. }
            | Self::CloseStale { path, .. }
            | Self::Io { path, .. }
            | Self::Locked { path }
            | Self::NotSparse { path, .. }
            | Self::Truncate { path, .. } => path,
        }
    }
}

impl From<&OpenError> for i32 {
    fn from(e: &OpenError) -> Self {
        match e {
            OpenError::Locked { .. } => libc::EWOULDBLOCK,
            OpenError::NotSparse { .. } => libc::EOPNOTSUPP,
            OpenError::CreateDir { source, .. }
            | OpenError::CloseStale { source, .. }
            | OpenError::Io { source, .. }
            | OpenError::Truncate { source, .. } => io_errno(source),
        }
    }
}

impl From<OpenError> for i32 {
    fn from(e: OpenError) -> Self {
        Self::from(&e)
    }
}

/// A read failed.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The handle could not be opened.
    #[error(transparent)]
    Open(#[from] OpenError),

    /// The handle was configured without read access.
    #[error("handle is not readable")]
    NotReadable,

    /// The file ends before the requested range. Carries the request as issued.
    #[error("EPARTIALREAD: Could not satisfy length: {size} bytes at offset {offset} of {}", path.display())]
    PartialRead {
        /// Resolved path of the file.
        path: PathBuf,
        /// Offset of the original request.
        offset: u64,
        /// Size of the original request.
        size: usize,
    },

    /// The underlying syscall failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReadError {
    /// The string code for errors that have one.
    #[must_use]
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Open(e) => e.code(),
            Self::PartialRead { .. } => Some("EPARTIALREAD"),
            _ => None,
        }
    }
}

impl From<ReadError> for i32 {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::Open(ref e) => Self::from(e),
            ReadError::NotReadable => libc::EBADF,
            ReadError::PartialRead { .. } => libc::ERANGE,
            ReadError::Io(ref io_err) => io_errno(io_err),
        }
    }
}

/// A write failed.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The handle could not be opened.
    #[error(transparent)]
    Open(#[from] OpenError),

    /// The handle was configured without write access.
    #[error("handle is not writable")]
    NotWritable,

    /// The underlying syscall failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<WriteError> for i32 {
    fn from(e: WriteError) -> Self {
        match e {
            WriteError::Open(ref e) => Self::from(e),
            WriteError::NotWritable => libc::EBADF,
            WriteError::Io(ref io_err) => io_errno(io_err),
        }
    }
}

/// A byte-range deletion failed.
#[derive(Debug, Error)]
pub enum DeleteError {
    /// The handle could not be opened.
    #[error(transparent)]
    Open(#[from] OpenError),

    /// The handle was configured without write access.
    #[error("handle is not writable")]
    NotWritable,

    /// The underlying syscall failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DeleteError> for i32 {
    fn from(e: DeleteError) -> Self {
        match e {
            DeleteError::Open(ref e) => Self::from(e),
            DeleteError::NotWritable => libc::EBADF,
            DeleteError::Io(ref io_err) => io_errno(io_err),
        }
    }
}

/// A truncation failed.
#[derive(Debug, Error)]
pub enum TruncateError {
    /// The handle could not be opened.
    #[error(transparent)]
    Open(#[from] OpenError),

    /// The handle was configured without write access.
    #[error("handle is not writable")]
    NotWritable,

    /// The underlying syscall failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TruncateError> for i32 {
    fn from(e: TruncateError) -> Self {
        match e {
            TruncateError::Open(ref e) => Self::from(e),
            TruncateError::NotWritable => libc::EBADF,
            TruncateError::Io(ref io_err) => io_errno(io_err),
        }
    }
}

/// Reading file metadata failed.
#[derive(Debug, Error)]
pub enum StatError {
    /// The handle could not be opened.
    #[error(transparent)]
    Open(#[from] OpenError),

    /// The underlying syscall failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StatError> for i32 {
    fn from(e: StatError) -> Self {
        match e {
            StatError::Open(ref e) => Self::from(e),
            StatError::Io(ref io_err) => io_errno(io_err),
        }
    }
}

/// Closing the descriptor failed.
#[derive(Debug, Error)]
pub enum CloseError {
    /// The underlying syscall failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CloseError> for i32 {
    fn from(e: CloseError) -> Self {
        match e {
            CloseError::Io(ref io_err) => io_errno(io_err),
        }
    }
}

/// Removing the file failed.
#[derive(Debug, Error)]
pub enum UnlinkError {
    /// Closing the descriptor before unlinking failed.
    #[error(transparent)]
    Close(#[from] CloseError),

    /// The underlying syscall failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<UnlinkError> for i32 {
    fn from(e: UnlinkError) -> Self {
        match e {
            UnlinkError::Close(e) => Self::from(e),
            UnlinkError::Io(ref io_err) => io_errno(io_err),
        }
    }
}
