//! Bound on how many handles hold an open descriptor at once.
//!
//! The pool owns a dense list of the handles that currently hold a descriptor. Each handle keeps
//! only its index into that list (its slot); the pool is the sole writer of slots and keeps them
//! correct on swap-removal.
//!
//! When a handle opens and the pool is full, a uniformly random member is suspended: its
//! descriptor is closed and its pages dropped, and it reopens transparently on its next
//! operation. Random choice needs no recency bookkeeping and does not thrash when many handles
//! are equally hot.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rand::Rng as _;
use tracing::debug;

use crate::file::Handle;

/// A handle's position in a pool's active list. `None` while the handle is not a member.
#[derive(Debug, Default)]
pub(crate) struct PoolSlot(Mutex<Option<usize>>);

impl PoolSlot {
    pub(crate) fn get(&self) -> Option<usize> {
        *self.0.lock()
    }

    fn set(&self, slot: Option<usize>) {
        *self.0.lock() = slot;
    }
}

#[derive(Debug)]
struct Member {
    handle: Weak<Handle>,
    slot: Arc<PoolSlot>,
}

#[derive(Debug)]
struct PoolState {
    max_active: usize,
    active: Vec<Member>,
}

impl PoolState {
    /// Remove the member at `index` by swapping the last member into its place.
    fn swap_remove(&mut self, index: usize) -> Member {
        let removed = self.active.swap_remove(index);
        removed.slot.set(None);
        if let Some(moved) = self.active.get(index) {
            moved.slot.set(Some(index));
        }
        removed
    }
}

/// A shared bound on simultaneously open descriptors. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Pool {
    state: Arc<Mutex<PoolState>>,
}

impl Pool {
    /// Create a pool allowing at most `max_active` open descriptors. A capacity of zero is
    /// treated as one.
    #[must_use]
    pub fn new(max_active: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(PoolState {
                max_active: max_active.max(1),
                active: Vec::new(),
            })),
        }
    }

    /// The capacity.
    #[must_use]
    pub fn max_active(&self) -> usize {
        self.state.lock().max_active
    }

    /// How many handles currently hold a descriptor through this pool.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Register a handle that has just opened, suspending a random member first if full.
    pub(crate) fn on_active(&self, handle: &Arc<Handle>) {
        let slot = handle.pool_slot();
        let evicted = {
            let mut state = self.state.lock();
            if slot.get().is_some() {
                return;
            }

            let evicted = (state.active.len() >= state.max_active).then(|| {
                let victim = rand::rng().random_range(0..state.active.len());
                state.swap_remove(victim)
            });

            slot.set(Some(state.active.len()));
            state.active.push(Member {
                handle: Arc::downgrade(handle),
                slot: Arc::clone(slot),
            });
            evicted
        };

        // Suspended outside the pool lock: the victim may be dropped here, and dropping a handle
        // takes the pool lock. A dead member already released its descriptor.
        if let Some(evicted) = evicted.and_then(|member| member.handle.upgrade()) {
            debug!(path = %evicted.filename().display(), "pool full, suspending handle");
            evicted.suspend_for_pool();
        }
    }

    /// Unregister a handle whose descriptor has been closed. No-op for non-members.
    pub(crate) fn on_inactive(&self, slot: &PoolSlot) {
        let mut state = self.state.lock();
        if let Some(index) = slot.get() {
            state.swap_remove(index);
        }
    }
}
