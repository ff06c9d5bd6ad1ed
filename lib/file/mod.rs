//! Random-access file handles.
//!
//! A [`RandomAccessFile`] resolves its path at construction and opens lazily: the first operation
//! opens the descriptor (creating the file and its parent directory if the operation writes), and
//! a handle that was closed or suspended by its [`Pool`] reopens the same way on its next
//! operation.
//!
//! Every operation on one handle runs inside that handle's queue, a FIFO async mutex around its
//! mutable state, so operations on one handle never overlap and complete in submission order.
//! Operations on different handles run concurrently.

pub mod error;
pub mod options;

use std::fs::File;
use std::os::unix::fs::MetadataExt as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use tracing::{debug, instrument, trace, warn};

pub use error::{
    CloseError, DeleteError, OpenError, ReadError, StatError, TruncateError, UnlinkError,
    WriteError,
};
pub use options::FileOptions;

use crate::cache::alloc::Allocator;
use crate::cache::page::{PageCache, PageLoadError, PageReadError};
use crate::io::{ReadAtError, read_exact_at, write_all_at};
use crate::lock::{LockKind, Locker};
use crate::pool::{Pool, PoolSlot};
use crate::{delete, io, path, sys};

/// Where a handle is in its open / close / suspend cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleState {
    /// No descriptor. Either never opened, or closed explicitly.
    Closed,
    /// Holds an open descriptor.
    Open,
    /// Closed by the pool to make room for another handle. Reopens on the next operation.
    Suspended,
}

/// File metadata as reported by [`RandomAccessFile::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Logical length in bytes.
    pub size: u64,
    /// 512-byte blocks physically allocated.
    pub blocks: u64,
    /// Preferred I/O block size.
    pub block_size: u64,
    /// Last modification time, when the platform reports one.
    pub modified: Option<SystemTime>,
}

impl From<&std::fs::Metadata> for FileStat {
    fn from(meta: &std::fs::Metadata) -> Self {
        Self {
            size: meta.len(),
            blocks: meta.blocks(),
            block_size: meta.blksize(),
            modified: meta.modified().ok(),
        }
    }
}

struct State {
    status: HandleState,
    file: Option<Arc<File>>,
    pages: PageCache,
    /// Length to truncate to on the next writable open. Disarmed once it has run.
    truncate_to: Option<u64>,
}

/// The shared core of a [`RandomAccessFile`]. Pools hold it weakly.
pub(crate) struct Handle {
    filename: PathBuf,
    directory: Option<PathBuf>,
    readable: bool,
    writable: bool,
    rmdir: bool,
    lock: bool,
    sparse: bool,
    page_cache: bool,
    alloc: Arc<dyn Allocator>,
    locker: Arc<dyn Locker>,
    pool: Option<Pool>,
    slot: Arc<PoolSlot>,
    state: tokio::sync::Mutex<State>,
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("filename", &self.filename)
            .field("readable", &self.readable)
            .field("writable", &self.writable)
            .field("pool_slot", &self.slot.get())
            .finish_non_exhaustive()
    }
}

fn join_error(e: tokio::task::JoinError) -> std::io::Error {
    std::io::Error::other(e)
}

/// Page loads share one error between every waiter, so the errno is copied out rather than moved.
fn page_read_error(path: &Path, e: PageReadError) -> ReadError {
    match e {
        PageReadError::Unsatisfiable { offset, size } => ReadError::PartialRead {
            path: path.to_path_buf(),
            offset,
            size,
        },
        PageReadError::Load(PageLoadError::Io(e)) => ReadError::Io(match e.raw_os_error() {
            Some(code) => std::io::Error::from_raw_os_error(code),
            None => std::io::Error::new(e.kind(), e),
        }),
        PageReadError::Load(PageLoadError::Panicked) => {
            ReadError::Io(std::io::Error::other("page load panicked"))
        }
    }
}

impl Handle {
    fn new(filename: &Path, options: FileOptions) -> Self {
        let directory = options.directory.as_deref();
        let resolved = path::resolve(filename, directory);
        // Normalized the same way the filename was, so ancestor walks can compare prefixes.
        let directory = directory.map(|root| path::resolve(Path::new(""), Some(root)));
        let truncate_to = options.truncate_to();

        Self {
            filename: resolved,
            directory,
            readable: options.readable,
            writable: options.writable,
            rmdir: options.rmdir,
            lock: options.lock,
            sparse: options.sparse,
            page_cache: options.page_cache,
            state: tokio::sync::Mutex::new(State {
                status: HandleState::Closed,
                file: None,
                pages: PageCache::new(Arc::clone(&options.alloc)),
                truncate_to,
            }),
            alloc: options.alloc,
            locker: options.locker,
            pool: options.pool,
            slot: Arc::default(),
        }
    }

    pub(crate) fn filename(&self) -> &Path {
        &self.filename
    }

    pub(crate) fn pool_slot(&self) -> &Arc<PoolSlot> {
        &self.slot
    }

    fn lock_kind(&self) -> LockKind {
        if self.writable {
            LockKind::Exclusive
        } else {
            LockKind::Shared
        }
    }

    /// The open descriptor, opening one first if there is none.
    async fn ensure_open(
        self: &Arc<Self>,
        state: &mut State,
        create: bool,
    ) -> Result<Arc<File>, OpenError> {
        match &state.file {
            Some(file) => Ok(Arc::clone(file)),
            None => self.open_locked(state, create).await,
        }
    }

    /// Open a fresh descriptor, replacing any existing one.
    async fn open_locked(
        self: &Arc<Self>,
        state: &mut State,
        create: bool,
    ) -> Result<Arc<File>, OpenError> {
        let create = create && self.writable;
        if create {
            io::create_parent_dir(&self.filename)
                .await
                .map_err(|source| OpenError::CreateDir {
                    path: self.filename.clone(),
                    source,
                })?;
        }

        if let Some(stale) = state.file.take() {
            state.pages.clear();
            state.status = HandleState::Closed;
            self.release_pool_slot();
            self.close_descriptor(stale)
                .map_err(|source| OpenError::CloseStale {
                    path: self.filename.clone(),
                    source,
                })?;
        }

        let truncate_to = state.truncate_to.filter(|_| self.writable);
        let file = Arc::new(self.open_descriptor(create, truncate_to).await?);
        if truncate_to.is_some() {
            state.truncate_to = None;
        }

        state.file = Some(Arc::clone(&file));
        state.status = HandleState::Open;
        if let Some(pool) = &self.pool {
            pool.on_active(self);
        }
        debug!(path = %self.filename.display(), create, "opened");
        Ok(file)
    }

    /// Open, lock, mark sparse and truncate on a blocking thread.
    ///
    /// Returning early from any step drops the new descriptor, which closes it; a failed open never
    /// leaves a descriptor behind.
    async fn open_descriptor(
        &self,
        create: bool,
        truncate_to: Option<u64>,
    ) -> Result<File, OpenError> {
        let path = self.filename.clone();
        let readable = self.readable || !self.writable;
        let writable = self.writable;
        let lock = self
            .lock
            .then(|| (Arc::clone(&self.locker), self.lock_kind()));
        let sparse = self.sparse && writable;

        tokio::task::spawn_blocking(move || -> Result<File, OpenError> {
            let file = std::fs::OpenOptions::new()
                .read(readable)
                .write(writable)
                .create(create)
                .open(&path)
                .map_err(|source| OpenError::Io {
                    path: path.clone(),
                    source,
                })?;

            if let Some((locker, kind)) = lock {
                match locker.try_lock(&file, kind) {
                    Ok(true) => {}
                    Ok(false) => return Err(OpenError::Locked { path }),
                    Err(source) => return Err(OpenError::Io { path, source }),
                }
            }

            if sparse {
                sys::mark_sparse(&file).map_err(|source| OpenError::NotSparse {
                    path: path.clone(),
                    source,
                })?;
            }

            if let Some(len) = truncate_to {
                file.set_len(len).map_err(|source| OpenError::Truncate {
                    path: path.clone(),
                    source,
                })?;
            }

            Ok(file)
        })
        .await
        .map_err(|e| OpenError::Io {
            path: self.filename.clone(),
            source: join_error(e),
        })?
    }

    /// Close `file` now unless a blocking task still holds it, in which case it closes when that
    /// task lets go.
    fn close_descriptor(&self, file: Arc<File>) -> std::io::Result<()> {
        // Unlock through the shared descriptor so an abandoned blocking read cannot keep the lock
        // alive past close.
        if self.lock
            && let Err(e) = self.locker.unlock(&file)
        {
            debug!(path = %self.filename.display(), error = %e, "unlock failed, closing anyway");
        }
        let Ok(file) = Arc::try_unwrap(file) else {
            trace!(path = %self.filename.display(), "descriptor still borrowed, closing on release");
            return Ok(());
        };
        sys::close(file)
    }

    fn release_pool_slot(&self) {
        if let Some(pool) = &self.pool {
            pool.on_inactive(&self.slot);
        }
    }

    fn close_locked(&self, state: &mut State) -> Result<(), CloseError> {
        state.pages.clear();
        state.status = HandleState::Closed;
        self.release_pool_slot();
        if let Some(file) = state.file.take() {
            self.close_descriptor(file)?;
            debug!(path = %self.filename.display(), "closed");
        }
        Ok(())
    }

    fn suspend_locked(&self, state: &mut State) {
        let Some(file) = state.file.take() else {
            return;
        };
        state.pages.clear();
        state.status = HandleState::Suspended;
        if let Err(e) = self.close_descriptor(file) {
            warn!(path = %self.filename.display(), error = %e, "failed to close suspended descriptor");
        }
        debug!(path = %self.filename.display(), "suspended");
    }

    /// Close the descriptor on behalf of the pool, which has already dropped this handle's slot.
    ///
    /// An idle handle is suspended on the spot. A busy one is suspended once its queue reaches the
    /// request. Either way a handle that has rejoined the pool in the meantime is left open.
    pub(crate) fn suspend_for_pool(self: Arc<Self>) {
        if let Ok(mut state) = self.state.try_lock() {
            if self.slot.get().is_none() {
                self.suspend_locked(&mut state);
            }
            return;
        }

        tokio::spawn(async move {
            let mut state = self.state.lock().await;
            if self.slot.get().is_none() {
                self.suspend_locked(&mut state);
            }
        });
    }

    async fn open(self: &Arc<Self>) -> Result<(), OpenError> {
        let mut state = self.state.lock().await;
        self.open_locked(&mut state, true).await.map(drop)
    }

    async fn read(self: &Arc<Self>, offset: u64, size: usize) -> Result<Bytes, ReadError> {
        if !self.readable {
            return Err(ReadError::NotReadable);
        }

        let mut state = self.state.lock().await;
        let create = state.truncate_to.is_some();
        let file = self.ensure_open(&mut state, create).await?;
        if size == 0 {
            return Ok(Bytes::new());
        }

        if self.page_cache {
            return state
                .pages
                .read(&file, offset, size)
                .await
                .map_err(|e| page_read_error(&self.filename, e));
        }

        let alloc = Arc::clone(&self.alloc);
        let read = tokio::task::spawn_blocking(move || -> Result<Bytes, ReadAtError> {
            let len = file.metadata()?.len();
            if offset.checked_add(size as u64).is_none_or(|end| end > len) {
                return Err(ReadAtError::Unsatisfiable { offset, size });
            }
            let mut buf = alloc.alloc(size);
            read_exact_at(&*file, &mut buf, offset).map(|()| buf.freeze())
        })
        .await
        .map_err(join_error)?;

        read.map_err(|e| match e {
            ReadAtError::Unsatisfiable { offset, size } => ReadError::PartialRead {
                path: self.filename.clone(),
                offset,
                size,
            },
            ReadAtError::Io(e) => ReadError::Io(e),
        })
    }

    async fn write(self: &Arc<Self>, offset: u64, data: Bytes) -> Result<(), WriteError> {
        if !self.writable {
            return Err(WriteError::NotWritable);
        }

        let mut state = self.state.lock().await;
        let file = self.ensure_open(&mut state, true).await?;
        state.pages.clear();
        if data.is_empty() {
            return Ok(());
        }

        tokio::task::spawn_blocking(move || write_all_at(&*file, &data, offset))
            .await
            .map_err(join_error)??;
        Ok(())
    }

    async fn del(self: &Arc<Self>, offset: u64, size: u64) -> Result<(), DeleteError> {
        if !self.writable {
            return Err(DeleteError::NotWritable);
        }

        let mut state = self.state.lock().await;
        let file = self.ensure_open(&mut state, true).await?;
        state.pages.clear();

        let deletion = tokio::task::spawn_blocking(move || delete::delete(&file, offset, size))
            .await
            .map_err(join_error)??;
        trace!(path = %self.filename.display(), ?deletion, "deleted range");
        Ok(())
    }

    async fn truncate(self: &Arc<Self>, len: u64) -> Result<(), TruncateError> {
        if !self.writable {
            return Err(TruncateError::NotWritable);
        }

        let mut state = self.state.lock().await;
        let file = self.ensure_open(&mut state, true).await?;
        state.pages.clear();

        tokio::task::spawn_blocking(move || file.set_len(len))
            .await
            .map_err(join_error)??;
        Ok(())
    }

    async fn stat(self: &Arc<Self>) -> Result<FileStat, StatError> {
        let mut state = self.state.lock().await;
        let create = state.truncate_to.is_some();
        let file = self.ensure_open(&mut state, create).await?;

        let meta = tokio::task::spawn_blocking(move || file.metadata())
            .await
            .map_err(join_error)??;
        Ok(FileStat::from(&meta))
    }

    async fn close(&self) -> Result<(), CloseError> {
        let mut state = self.state.lock().await;
        self.close_locked(&mut state)
    }

    async fn destroy(&self) -> Result<(), UnlinkError> {
        let mut state = self.state.lock().await;
        self.close_locked(&mut state)?;

        match tokio::fs::remove_file(&self.filename).await {
            Ok(()) => debug!(path = %self.filename.display(), "unlinked"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!(path = %self.filename.display(), "unlink of missing file");
            }
            Err(e) => return Err(e.into()),
        }

        if self.rmdir
            && let Some(root) = &self.directory
        {
            let removed = io::remove_empty_ancestors(&self.filename, root).await;
            trace!(path = %self.filename.display(), removed, "removed empty ancestors");
        }
        Ok(())
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        // The descriptor closes with `state`; only the pool needs telling.
        self.release_pool_slot();
    }
}

/// A handle on one file, read and written at arbitrary offsets.
///
/// Cloning is cheap and every clone shares the same queue, descriptor and page cache. The
/// descriptor is released when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct RandomAccessFile {
    handle: Arc<Handle>,
}

impl RandomAccessFile {
    /// Create a handle for `filename`. No syscall is made until the first operation.
    pub fn new(filename: impl AsRef<Path>, options: FileOptions) -> Self {
        Self {
            handle: Arc::new(Handle::new(filename.as_ref(), options)),
        }
    }

    /// The resolved path this handle opens.
    #[must_use]
    pub fn filename(&self) -> &Path {
        &self.handle.filename
    }

    /// The confinement root, if one was configured.
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        self.handle.directory.as_deref()
    }

    /// Whether the handle was configured for reading.
    #[must_use]
    pub fn readable(&self) -> bool {
        self.handle.readable
    }

    /// Whether the handle was configured for writing.
    #[must_use]
    pub fn writable(&self) -> bool {
        self.handle.writable
    }

    /// The handle's current state. Waits for queued operations to finish first.
    pub async fn state(&self) -> HandleState {
        self.handle.state.lock().await.status
    }

    /// Open the descriptor now, closing any existing one first. Creates the file on a writable
    /// handle.
    ///
    /// Calling this is optional; every other operation opens on demand.
    #[instrument(name = "RandomAccessFile::open", skip(self), fields(path = %self.filename().display()))]
    pub async fn open(&self) -> Result<(), OpenError> {
        self.handle.open().await
    }

    /// Read exactly `size` bytes at `offset`.
    ///
    /// Fails with [`ReadError::PartialRead`] if the file ends before the range does.
    #[instrument(name = "RandomAccessFile::read", skip(self), fields(path = %self.filename().display()))]
    pub async fn read(&self, offset: u64, size: usize) -> Result<Bytes, ReadError> {
        self.handle.read(offset, size).await
    }

    /// Write `data` at `offset`, extending the file if needed. Gaps read back as zeros.
    #[instrument(name = "RandomAccessFile::write", skip(self, data), fields(path = %self.filename().display()))]
    pub async fn write(&self, offset: u64, data: impl Into<Bytes>) -> Result<(), WriteError> {
        self.handle.write(offset, data.into()).await
    }

    /// Delete `size` bytes at `offset`.
    ///
    /// A range reaching the end of the file shrinks it to `offset`; an interior range is zeroed
    /// in place. [`DELETE_TO_END`](crate::delete::DELETE_TO_END) as `size` always truncates to
    /// `offset`.
    #[instrument(name = "RandomAccessFile::del", skip(self), fields(path = %self.filename().display()))]
    pub async fn del(&self, offset: u64, size: u64) -> Result<(), DeleteError> {
        self.handle.del(offset, size).await
    }

    /// Set the file length to exactly `len`, growing with zeros or shrinking.
    #[instrument(name = "RandomAccessFile::truncate", skip(self), fields(path = %self.filename().display()))]
    pub async fn truncate(&self, len: u64) -> Result<(), TruncateError> {
        self.handle.truncate(len).await
    }

    /// File metadata.
    #[instrument(name = "RandomAccessFile::stat", skip(self), fields(path = %self.filename().display()))]
    pub async fn stat(&self) -> Result<FileStat, StatError> {
        self.handle.stat().await
    }

    /// Close the descriptor. The handle stays usable and reopens on its next operation.
    #[instrument(name = "RandomAccessFile::close", skip(self), fields(path = %self.filename().display()))]
    pub async fn close(&self) -> Result<(), CloseError> {
        self.handle.close().await
    }

    /// Close, then remove the file. A file that does not exist is not an error.
    ///
    /// With `rmdir`, parent directories left empty are removed as well, up to the confinement
    /// root.
    #[instrument(name = "RandomAccessFile::destroy", skip(self), fields(path = %self.filename().display()))]
    pub async fn destroy(&self) -> Result<(), UnlinkError> {
        self.handle.destroy().await
    }

    /// Alias for [`destroy`](Self::destroy).
    pub async fn unlink(&self) -> Result<(), UnlinkError> {
        self.destroy().await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::lock::FlockLocker;

    #[test]
    fn shared_page_load_error_keeps_errno() {
        let failed = PageReadError::Load(PageLoadError::Io(Arc::new(
            std::io::Error::from_raw_os_error(libc::EBADF),
        )));
        let err = page_read_error(Path::new("/data/f.bin"), failed);
        assert!(matches!(&err, ReadError::Io(e) if e.raw_os_error() == Some(libc::EBADF)));
        assert_eq!(i32::from(err), libc::EBADF);
    }

    #[test]
    fn errno_less_page_load_error_keeps_kind() {
        let failed = PageReadError::Load(PageLoadError::Io(Arc::new(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "short",
        ))));
        let err = page_read_error(Path::new("/data/f.bin"), failed);
        assert!(matches!(&err, ReadError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn close_releases_lock_while_descriptor_is_borrowed() {
        let dir = tempfile::tempdir().unwrap();
        let handle = Arc::new(Handle::new(
            Path::new("locked.bin"),
            FileOptions::new().with_directory(dir.path()).with_lock(true),
        ));

        let mut state = handle.state.lock().await;
        // Stands in for a blocking read that outlived its caller.
        let in_flight = handle.ensure_open(&mut state, true).await.unwrap();
        handle.close_locked(&mut state).unwrap();
        drop(state);

        let other = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&handle.filename)
            .unwrap();
        assert!(FlockLocker.try_lock(&other, LockKind::Exclusive).unwrap());
        drop(in_flight);
    }
}
