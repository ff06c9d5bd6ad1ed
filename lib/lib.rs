//! Paginated random-access file handles.
//!
//! [`RandomAccessFile`] reads and writes a file at arbitrary byte offsets through a per-handle
//! page cache, opening its descriptor lazily. A shared [`Pool`] bounds how many handles hold a
//! descriptor at once by suspending handles at random; suspended handles reopen on demand.

pub mod access;
/// Page cache and buffer allocation.
pub mod cache;
pub mod delete;
pub mod file;
pub mod io;
pub mod lock;
pub mod path;
pub mod pool;
pub mod sys;

pub use access::RandomAccess;
pub use cache::alloc::{Allocator, HeapAllocator, SlabAllocator};
pub use cache::page::PAGE_SIZE;
pub use delete::DELETE_TO_END;
pub use file::{FileOptions, FileStat, HandleState, RandomAccessFile};
pub use lock::{FlockLocker, LockKind, Locker};
pub use pool::Pool;
