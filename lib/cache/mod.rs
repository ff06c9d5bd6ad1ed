/// Injectable buffer allocation.
pub mod alloc;
/// Per-handle page cache with coalesced loads.
pub mod page;
