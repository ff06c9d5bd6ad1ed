//! Construction options for [`RandomAccessFile`](super::RandomAccessFile).

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::cache::alloc::{Allocator, HeapAllocator};
use crate::lock::{FlockLocker, Locker};
use crate::pool::Pool;

/// Everything a handle can be configured with.
///
/// Deserializes from kebab-case keys; the capability fields (`alloc`, `pool`, `locker`) can only
/// be set in code.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FileOptions {
    /// Confinement root. The filename is resolved under it and can never escape it.
    pub directory: Option<PathBuf>,

    /// Open with read access.
    pub readable: bool,

    /// Open with write access.
    pub writable: bool,

    /// Declared length. A non-zero size truncates (or extends) the file to it on first open.
    pub size: Option<u64>,

    /// Truncate on first open even when no size is declared.
    pub truncate: bool,

    /// On destroy, also remove parent directories left empty, up to `directory`.
    pub rmdir: bool,

    /// Take an advisory lock on open: shared for read-only handles, exclusive otherwise.
    pub lock: bool,

    /// Mark the file sparse on open. Only applies to writable handles.
    pub sparse: bool,

    /// Serve reads through the page cache. When off, every read goes straight to the file.
    pub page_cache: bool,

    /// Buffer allocation strategy for pages and read results.
    #[serde(skip)]
    pub alloc: Arc<dyn Allocator>,

    /// Shared bound on simultaneously open descriptors.
    #[serde(skip)]
    pub pool: Option<Pool>,

    /// Advisory lock implementation.
    #[serde(skip)]
    pub locker: Arc<dyn Locker>,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            directory: None,
            readable: true,
            writable: true,
            size: None,
            truncate: false,
            rmdir: false,
            lock: false,
            sparse: false,
            page_cache: true,
            alloc: Arc::new(HeapAllocator),
            pool: None,
            locker: Arc::new(FlockLocker),
        }
    }
}

impl FileOptions {
    /// Default options: readable, writable, no truncation, no lock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only options.
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            writable: false,
            ..Self::default()
        }
    }

    /// Confine the filename under `directory`.
    #[must_use]
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Set read access.
    #[must_use]
    pub fn with_readable(mut self, readable: bool) -> Self {
        self.readable = readable;
        self
    }

    /// Set write access.
    #[must_use]
    pub fn with_writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    /// Declare the file length.
    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Truncate on first open.
    #[must_use]
    pub fn with_truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    /// Remove empty parent directories on destroy.
    #[must_use]
    pub fn with_rmdir(mut self, rmdir: bool) -> Self {
        self.rmdir = rmdir;
        self
    }

    /// Take an advisory lock on open.
    #[must_use]
    pub fn with_lock(mut self, lock: bool) -> Self {
        self.lock = lock;
        self
    }

    /// Mark the file sparse on open.
    #[must_use]
    pub fn with_sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    /// Enable or disable the page cache.
    #[must_use]
    pub fn with_page_cache(mut self, page_cache: bool) -> Self {
        self.page_cache = page_cache;
        self
    }

    /// Use `alloc` for buffers.
    #[must_use]
    pub fn with_alloc(mut self, alloc: Arc<dyn Allocator>) -> Self {
        self.alloc = alloc;
        self
    }

    /// Share `pool`'s descriptor bound.
    #[must_use]
    pub fn with_pool(mut self, pool: Pool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Use `locker` for advisory locks.
    #[must_use]
    pub fn with_locker(mut self, locker: Arc<dyn Locker>) -> Self {
        self.locker = locker;
        self
    }

    /// The length to truncate to on first open, if any.
    #[must_use]
    pub fn truncate_to(&self) -> Option<u64> {
        let size = self.size.unwrap_or(0);
        (self.truncate || size > 0).then_some(size)
    }
}
