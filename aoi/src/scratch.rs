use crate::allocator::Allocator;
use smallvec::SmallVec;
use std::mem::size_of;
use std::sync::Arc;

pub(crate) const PRE_ALLOC: usize = 16;

/// Heap bytes held by a small vector; zero while its items are inline.
#[inline(always)]
pub(crate) fn spilled_bytes<A: smallvec::Array>(vec: &SmallVec<A>) -> usize {
    if vec.spilled() {
        vec.capacity() * size_of::<A::Item>()
    } else {
        0
    }
}

/// Report a capacity change of a small vector, `before` being its heap bytes
/// prior to the change.
#[inline(always)]
pub(crate) fn account_growth<A: smallvec::Array>(
    allocator: &dyn Allocator,
    before: usize,
    vec: &SmallVec<A>,
) {
    let after = spilled_bytes(vec);
    if after != before {
        if before > 0 {
            allocator.release(before);
        }
        if after > 0 {
            allocator.allocate(after);
        }
    }
}

/// Growable, order-preserving array reused across calls.
///
/// No duplicate suppression: callers only add elements they know are not
/// already present. Contents are only meaningful until the next `reset`.
/// Only storage that spilled past the inline buffer is reported.
#[derive(Debug)]
pub struct ScratchSet<T: Copy + PartialEq> {
    slot: SmallVec<[T; PRE_ALLOC]>,
    allocator: Arc<dyn Allocator>,
}

impl<T: Copy + PartialEq> ScratchSet<T> {
    pub fn new(allocator: Arc<dyn Allocator>) -> Self {
        Self {
            slot: SmallVec::new(),
            allocator,
        }
    }

    #[inline(always)]
    pub fn reset(&mut self) {
        self.slot.clear();
    }

    #[inline(always)]
    pub fn add(&mut self, elem: T) {
        if self.slot.len() < self.slot.capacity() {
            self.slot.push(elem);
            return;
        }
        let before = spilled_bytes(&self.slot);
        self.slot.push(elem);
        account_growth(self.allocator.as_ref(), before, &self.slot);
    }

    /// Remove `elem` by value, shifting the tail down to keep order.
    pub fn remove(&mut self, elem: T) -> bool {
        match self.slot.iter().position(|&e| e == elem) {
            Some(idx) => {
                self.slot.remove(idx);
                true
            }
            None => false,
        }
    }

    /// `out` := elements of `a` that are not in `b`.
    pub fn difference(a: &Self, b: &Self, out: &mut Self) {
        out.reset();
        for &elem in a.slot.iter() {
            if !b.slot.contains(&elem) {
                out.add(elem);
            }
        }
    }

    #[inline(always)]
    pub fn contains(&self, elem: &T) -> bool {
        self.slot.contains(elem)
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.slot.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.slot.is_empty()
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.slot.capacity()
    }

    #[inline(always)]
    pub fn as_slice(&self) -> &[T] {
        &self.slot
    }

    #[inline(always)]
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.slot.iter()
    }
}

impl<T: Copy + PartialEq> Drop for ScratchSet<T> {
    fn drop(&mut self) {
        let bytes = spilled_bytes(&self.slot);
        if bytes > 0 {
            self.allocator.release(bytes);
        }
    }
}
