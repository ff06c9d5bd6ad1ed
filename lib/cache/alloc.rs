//! Buffer allocation strategies for page blocks and read results.

use std::fmt::Debug;

use bytes::BytesMut;
use parking_lot::Mutex;

/// Hands out zero-filled buffers.
pub trait Allocator: Debug + Send + Sync + 'static {
    /// Returns a buffer of exactly `len` zero bytes.
    fn alloc(&self, len: usize) -> BytesMut;
}

/// Allocates every buffer separately on the heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl Allocator for HeapAllocator {
    fn alloc(&self, len: usize) -> BytesMut {
        BytesMut::zeroed(len)
    }
}

/// Carves small buffers out of larger shared slabs.
///
/// Each slab is `capacity` bytes. Buffers are split off the front of the current slab and share
/// its allocation, which is freed once every buffer cut from it has been dropped. Requests larger
/// than `capacity` bypass the slab.
#[derive(Debug)]
pub struct SlabAllocator {
    capacity: usize,
    slab: Mutex<BytesMut>,
}

impl SlabAllocator {
    /// Create an allocator whose slabs are `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            slab: Mutex::new(BytesMut::new()),
        }
    }

    /// Size of each slab.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Allocator for SlabAllocator {
    fn alloc(&self, len: usize) -> BytesMut {
        if len > self.capacity {
            return BytesMut::zeroed(len);
        }

        let mut slab = self.slab.lock();
        if slab.len() < len {
            *slab = BytesMut::zeroed(self.capacity);
        }
        slab.split_to(len)
    }
}
