//! The tracked heap block and the marker pairing phase.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::domain::{Address, ThreadId};

/// Progress of pairing one select marker with one allocator call.
///
/// ```text
/// NoSelection --select--> PreAlloc --allocator entry--> PostAlloc
///      ^                                                    |
///      +---------------- allocator return ------------------+
/// ```
///
/// The captured size and the entering thread travel inside the phase, so
/// a start address returned to one thread can never be paired with a size
/// requested by another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerPhase {
    NoSelection,
    PreAlloc,
    PostAlloc { size: u64, owner: ThreadId },
}

/// Bounds of the single heap block under observation.
///
/// Written only under the marker lock; read lock-free by the access
/// filter. Readers order on `being_traced`: its Acquire load pairs with
/// the Release store in [`TrackedBlock::activate`], and a torn view of a
/// half-published block cannot pass the bound check in
/// [`TrackedBlock::offset_within`].
pub struct TrackedBlock {
    start: AtomicU64,
    size: AtomicU64,
    being_traced: AtomicBool,
}

impl TrackedBlock {
    pub const fn new() -> Self {
        TrackedBlock {
            start: AtomicU64::new(0),
            size: AtomicU64::new(0),
            being_traced: AtomicBool::new(false),
        }
    }

    /// Record freshly observed allocation bounds. Tracing stays off until
    /// the start marker runs.
    pub fn publish(&self, start: Address, size: u64) {
        self.start.store(start.0, Ordering::Relaxed);
        self.size.store(size, Ordering::Relaxed);
    }

    /// Begin filtering accesses against the published bounds.
    pub fn activate(&self) {
        self.being_traced.store(true, Ordering::Release);
    }

    /// Stop tracing and forget the block.
    pub fn clear(&self) {
        self.being_traced.store(false, Ordering::Release);
        self.start.store(0, Ordering::Relaxed);
        self.size.store(0, Ordering::Relaxed);
    }

    pub fn is_active(&self) -> bool {
        self.being_traced.load(Ordering::Acquire)
    }

    pub fn start(&self) -> Address {
        Address(self.start.load(Ordering::Relaxed))
    }

    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    /// Offset of `addr` inside the block, when tracing is active and the
    /// address falls within bounds. Lock-free and allocation-free; this
    /// is the whole hot-path filter.
    pub fn offset_within(&self, addr: Address) -> Option<u64> {
        if !self.being_traced.load(Ordering::Acquire) {
            return None;
        }
        let size = self.size.load(Ordering::Relaxed);
        let offset = addr.offset_from(self.start());
        (size != 0 && offset < size).then_some(offset)
    }
}

impl Default for TrackedBlock {
    fn default() -> Self {
        TrackedBlock::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_block_filters_everything() {
        let block = TrackedBlock::new();
        block.publish(Address(0x1000), 64);
        assert_eq!(block.offset_within(Address(0x1000)), None);
    }

    #[test]
    fn active_block_bounds() {
        let block = TrackedBlock::new();
        block.publish(Address(0x1000), 64);
        block.activate();
        assert_eq!(block.offset_within(Address(0x1000)), Some(0));
        assert_eq!(block.offset_within(Address(0x103f)), Some(63));
        // one past the end
        assert_eq!(block.offset_within(Address(0x1040)), None);
        // below the start wraps to a huge offset and is rejected
        assert_eq!(block.offset_within(Address(0xfff)), None);
    }

    #[test]
    fn clear_forgets_the_block() {
        let block = TrackedBlock::new();
        block.publish(Address(0x1000), 64);
        block.activate();
        assert!(block.is_active());
        block.clear();
        assert!(!block.is_active());
        assert_eq!(block.size(), 0);
        assert!(block.start().is_null());
    }
}
