use std::fmt::Debug;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};

/// Memory port every heap buffer owned by a space reports through.
///
/// `allocate` is called when a buffer is acquired and `release` when it is
/// given back, with the same byte count. Storage kept inline in its owner is
/// not reported. A host can use this to audit or budget the memory of each
/// space; the memory itself comes from the global allocator.
pub trait Allocator: Send + Sync + Debug {
    fn allocate(&self, bytes: usize);
    fn release(&self, bytes: usize);
}

/// Default port: the global heap, no bookkeeping.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    #[inline(always)]
    fn allocate(&self, _bytes: usize) {}

    #[inline(always)]
    fn release(&self, _bytes: usize) {}
}

/// Tracks live allocations, live bytes and the high-water mark.
#[derive(Debug, Default)]
pub struct CountingAllocator {
    count: AtomicIsize,
    current: AtomicUsize,
    max: AtomicUsize,
}

impl CountingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> isize {
        self.count.load(Ordering::Relaxed)
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::Relaxed)
    }
}

impl Allocator for CountingAllocator {
    fn allocate(&self, bytes: usize) {
        self.count.fetch_add(1, Ordering::Relaxed);
        let current = self.current.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.max.fetch_max(current, Ordering::Relaxed);
    }

    fn release(&self, bytes: usize) {
        self.count.fetch_sub(1, Ordering::Relaxed);
        let previous = self.current.fetch_sub(bytes, Ordering::Relaxed);
        debug_assert!(previous >= bytes, "allocator released more than it handed out");
    }
}
