//! Page cache for one file handle.
//!
//! Byte-range reads are served from fixed-size, offset-aligned pages. A page is loaded at most
//! once at a time: callers that miss on a page already being loaded join the in-flight load via a
//! [`Shared`] future instead of issuing their own reads. Once the load resolves, every joined
//! caller receives the same page and the in-flight entry is promoted to a ready one.
//!
//! The cache never evicts on its own. It is cleared wholesale whenever the file is written,
//! truncated, or its descriptor is closed.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::{future::Future, pin::Pin};

use bytes::{Bytes, BytesMut};
use futures::FutureExt as _;
use futures::future::Shared;
use thiserror::Error;
use tracing::trace;

use crate::cache::alloc::Allocator;
use crate::io::{PositionalIo, fill_at};

/// Default page size. Block aligned on every platform we run on.
pub const PAGE_SIZE: usize = 4096;

/// A loaded page.
#[derive(Debug, Clone)]
pub struct Page {
    index: u64,
    loaded: usize,
    data: Bytes,
}

impl Page {
    /// Page number, i.e. `offset / page_size`.
    #[must_use]
    pub fn index(&self) -> u64 {
        self.index
    }

    /// How many bytes were present in the file. Less than the page size only for the last page.
    #[must_use]
    pub fn loaded(&self) -> usize {
        self.loaded
    }

    /// The full page block. Bytes past [`loaded`](Self::loaded) are zero.
    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

/// Why a page could not be loaded. Cloned to every caller that joined the load.
#[derive(Debug, Clone, Error)]
pub enum PageLoadError {
    /// The read syscall failed.
    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),

    /// The loading task panicked.
    #[error("page load panicked")]
    Panicked,
}

/// Why a byte-range read failed.
#[derive(Debug, Error)]
pub enum PageReadError {
    /// The file ends before the requested range does. Carries the request as issued.
    #[error("could not satisfy length: {size} bytes at offset {offset}")]
    Unsatisfiable {
        /// Offset of the original request.
        offset: u64,
        /// Size of the original request.
        size: usize,
    },

    /// A page in the range could not be loaded.
    #[error(transparent)]
    Load(#[from] PageLoadError),
}

type SharedLoad = Shared<Pin<Box<dyn Future<Output = Result<Page, PageLoadError>> + Send>>>;

/// Two-state slot: `Loading` while the first read of a page runs, `Ready` once it has completed.
///
/// A failed load removes its slot, so the next miss starts a fresh one.
enum Slot {
    Loading(SharedLoad),
    Ready(Page),
}

/// Mapping from page index to page content for one handle.
pub struct PageCache {
    map: scc::HashMap<u64, Slot>,
    page_size: usize,
    alloc: Arc<dyn Allocator>,
}

impl std::fmt::Debug for PageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageCache")
            .field("pages", &self.map.len())
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl PageCache {
    /// Create an empty cache with [`PAGE_SIZE`] pages.
    #[must_use]
    pub fn new(alloc: Arc<dyn Allocator>) -> Self {
        Self::with_page_size(alloc, PAGE_SIZE)
    }

    /// Create an empty cache with a custom page size.
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is not a power of two.
    #[must_use]
    pub fn with_page_size(alloc: Arc<dyn Allocator>, page_size: usize) -> Self {
        assert!(
            page_size.is_power_of_two(),
            "page size must be a power of two, got {page_size}"
        );
        Self {
            map: scc::HashMap::default(),
            page_size,
            alloc,
        }
    }

    /// Size of every page in bytes.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of page entries, loaded or loading.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if no page is cached or loading.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drop every page.
    ///
    /// Loads that are still in flight complete for the callers already waiting on them, but their
    /// result is not cached.
    pub fn clear(&self) {
        if !self.map.is_empty() {
            trace!(pages = self.map.len(), "invalidating page cache");
            self.map.clear_sync();
        }
    }

    /// Read `size` bytes at `offset`, loading whichever pages the range covers.
    ///
    /// Fails with [`PageReadError::Unsatisfiable`] if the file ends before `offset + size`; a
    /// partial result is never returned.
    pub async fn read<I: PositionalIo>(
        &self,
        io: &Arc<I>,
        offset: u64,
        size: usize,
    ) -> Result<Bytes, PageReadError> {
        if size == 0 {
            return Ok(Bytes::new());
        }

        let unsatisfiable = PageReadError::Unsatisfiable { offset, size };
        let page_size = self.page_size as u64;
        let Some(end) = offset.checked_add(size as u64) else {
            return Err(unsatisfiable);
        };

        // Coverage is checked page by page before the output buffer exists, so a range past the
        // end of the file fails without ever allocating `size` bytes.
        let mut spans = Vec::new();
        for index in (offset / page_size)..=((end - 1) / page_size) {
            let page = self.load(io, index).await?;

            let page_start = index * page_size;
            // Both bounds are relative to the page and therefore below `page_size`.
            #[expect(clippy::cast_possible_truncation)]
            let from = (offset.max(page_start) - page_start) as usize;
            #[expect(clippy::cast_possible_truncation)]
            let to = (end.min(page_start + page_size) - page_start) as usize;
            if to > page.loaded {
                return Err(unsatisfiable);
            }
            spans.push((page, from, to));
        }

        let mut out = self.alloc.alloc(size);
        let mut written = 0;
        for (page, from, to) in spans {
            out[written..written + (to - from)].copy_from_slice(&page.data[from..to]);
            written += to - from;
        }

        debug_assert_eq!(written, size, "pages did not cover the requested range");
        Ok(out.freeze())
    }

    /// Get page `index`, loading it if it is not cached.
    ///
    /// Concurrent callers for the same index share one physical load.
    pub async fn load<I: PositionalIo>(
        &self,
        io: &Arc<I>,
        index: u64,
    ) -> Result<Page, PageLoadError> {
        // Fast path: already loaded or loading.
        let existing = self
            .map
            .read_async(&index, |_, slot| match slot {
                Slot::Ready(page) => Ok(page.clone()),
                Slot::Loading(shared) => Err(shared.clone()),
            })
            .await;

        let shared = match existing {
            Some(Ok(page)) => return Ok(page),
            Some(Err(shared)) => shared,
            None => match self.map.entry_async(index).await {
                scc::hash_map::Entry::Occupied(occ) => match occ.get() {
                    Slot::Ready(page) => return Ok(page.clone()),
                    Slot::Loading(shared) => shared.clone(),
                },
                scc::hash_map::Entry::Vacant(vac) => {
                    let shared = self.start_load(io, index);
                    vac.insert_entry(Slot::Loading(shared.clone()));
                    shared
                }
            },
        };

        self.await_load(index, shared).await
    }

    /// Await a load and settle its slot: promote it on success, drop it on failure.
    ///
    /// Only the slot holding this exact load is touched, so a load that was invalidated by
    /// [`clear`](Self::clear) never overwrites a newer one.
    async fn await_load(&self, index: u64, shared: SharedLoad) -> Result<Page, PageLoadError> {
        let result = shared.clone().await;

        match &result {
            Ok(page) => {
                self.map
                    .update_async(&index, |_, slot| {
                        if matches!(slot, Slot::Loading(s) if s.ptr_eq(&shared)) {
                            *slot = Slot::Ready(page.clone());
                        }
                    })
                    .await;
            }
            Err(_) => {
                drop(self.map.remove_if_sync(
                    &index,
                    |slot| matches!(slot, Slot::Loading(s) if s.ptr_eq(&shared)),
                ));
            }
        }

        result
    }

    /// Build the shared future that reads one page block from `io`.
    fn start_load<I: PositionalIo>(&self, io: &Arc<I>, index: u64) -> SharedLoad {
        let io = Arc::clone(io);
        let page_size = self.page_size;
        let block = self.alloc.alloc(page_size);

        let fut = AssertUnwindSafe(async move {
            trace!(index, "loading page");
            let offset = index * page_size as u64;
            let (block, loaded) = tokio::task::spawn_blocking(move || {
                let mut block: BytesMut = block;
                let loaded = fill_at(&*io, &mut block, offset)?;
                // The allocator may hand out reused memory; keep the tail past EOF zeroed.
                block[loaded..].fill(0);
                Ok::<_, std::io::Error>((block, loaded))
            })
            .await
            .map_err(|e| PageLoadError::Io(Arc::new(std::io::Error::other(e))))?
            .map_err(|e| PageLoadError::Io(Arc::new(e)))?;

            Ok::<_, PageLoadError>(Page {
                index,
                loaded,
                data: block.freeze(),
            })
        })
        .catch_unwind();

        let boxed: Pin<Box<dyn Future<Output = Result<Page, PageLoadError>> + Send>> =
            Box::pin(async move { fut.await.unwrap_or(Err(PageLoadError::Panicked)) });
        boxed.shared()
    }
}
