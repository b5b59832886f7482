use crate::allocator::Allocator;
use crate::entity::INVALID_ID;
use crate::scratch::PRE_ALLOC;
use std::mem::size_of;
use std::sync::Arc;

const NO_NEXT: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq)]
struct MapSlot<V> {
    id: u32,
    value: Option<V>,
    next: i32,
}

impl<V> MapSlot<V> {
    const fn vacant() -> Self {
        Self {
            id: INVALID_ID,
            value: None,
            next: NO_NEXT,
        }
    }
}

/// Open-addressing map from entity id to a value, chained through the slot
/// array (Brent's variation).
///
/// An entry either sits in its main position (`id & (size - 1)`) or is
/// reachable by following `next` from it. A colliding entry that squats in
/// somebody else's main position is relocated on insert, so chains stay
/// short. When no free slot is left the table doubles and every live entry is
/// reinserted in slot order, which makes the layout a pure function of the
/// insertion sequence.
#[derive(Debug)]
pub struct IdMap<V: Copy> {
    slot: Vec<MapSlot<V>>,
    lastfree: isize,
    len: usize,
    allocator: Arc<dyn Allocator>,
}

impl<V: Copy> IdMap<V> {
    pub fn new(allocator: Arc<dyn Allocator>) -> Self {
        allocator.allocate(PRE_ALLOC * size_of::<MapSlot<V>>());
        Self {
            slot: vec![MapSlot::vacant(); PRE_ALLOC],
            lastfree: PRE_ALLOC as isize - 1,
            len: 0,
            allocator,
        }
    }

    #[inline(always)]
    fn main_position(&self, id: u32) -> usize {
        (id as usize) & (self.slot.len() - 1)
    }

    /// Insert a new id. The id must not be live already.
    pub fn insert(&mut self, id: u32, value: V) {
        debug_assert!(id != INVALID_ID, "the invalid id cannot be mapped");
        debug_assert!(self.get(id).is_none(), "id {} is already mapped", id);
        self.place(id, value);
        self.len += 1;
    }

    fn place(&mut self, id: u32, value: V) {
        let (mut id, mut value) = (id, value);
        loop {
            let mp = self.main_position(id);
            let occupant = self.slot[mp];
            if occupant.id == INVALID_ID {
                self.slot[mp].id = id;
                self.slot[mp].value = Some(value);
                return;
            }

            let occupant_mp = self.main_position(occupant.id);
            if occupant_mp != mp {
                // The occupant only collided into this slot: unhook it from
                // its own chain, take the slot and reinsert the occupant.
                let mut last = occupant_mp;
                while self.slot[last].next != mp as i32 {
                    let next = self.slot[last].next;
                    assert!(
                        next >= 0,
                        "identifier map invariant violated: slot {} not on its chain",
                        mp
                    );
                    last = next as usize;
                }
                self.slot[last].next = occupant.next;
                self.slot[mp] = MapSlot {
                    id,
                    value: Some(value),
                    next: NO_NEXT,
                };
                match occupant.value {
                    Some(moved) => {
                        id = occupant.id;
                        value = moved;
                        continue;
                    }
                    None => return,
                }
            }

            if occupant.value.is_none() {
                // Removed entry in its own main position: reuse it, keep the chain.
                self.slot[mp].id = id;
                self.slot[mp].value = Some(value);
                return;
            }

            match self.take_free() {
                Some(free) => {
                    self.slot[free] = MapSlot {
                        id,
                        value: Some(value),
                        next: occupant.next,
                    };
                    self.slot[mp].next = free as i32;
                    return;
                }
                None => self.rehash(),
            }
        }
    }

    fn take_free(&mut self) -> Option<usize> {
        while self.lastfree >= 0 {
            let idx = self.lastfree as usize;
            self.lastfree -= 1;
            if self.slot[idx].id == INVALID_ID {
                return Some(idx);
            }
        }
        None
    }

    fn rehash(&mut self) {
        let old_size = self.slot.len();
        let new_size = old_size * 2;
        tracing::debug!(old_size, new_size, live = self.len, "identifier map rehash");
        self.allocator.allocate(new_size * size_of::<MapSlot<V>>());
        let old_slot = std::mem::replace(&mut self.slot, vec![MapSlot::vacant(); new_size]);
        self.lastfree = new_size as isize - 1;
        for s in old_slot.iter() {
            if let Some(value) = s.value {
                self.place(s.id, value);
            }
        }
        self.allocator.release(old_size * size_of::<MapSlot<V>>());
    }

    pub fn get(&self, id: u32) -> Option<V> {
        let mut idx = self.main_position(id);
        loop {
            let s = &self.slot[idx];
            if s.id == id {
                if let Some(value) = s.value {
                    return Some(value);
                }
            }
            if s.next < 0 {
                return None;
            }
            idx = s.next as usize;
        }
    }

    pub fn remove(&mut self, id: u32) -> Option<V> {
        let mut idx = self.main_position(id);
        loop {
            let s = &mut self.slot[idx];
            if s.id == id && s.value.is_some() {
                self.len -= 1;
                return s.value.take();
            }
            if s.next < 0 {
                return None;
            }
            idx = s.next as usize;
        }
    }

    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(u32, V),
    {
        for s in self.slot.iter() {
            if let Some(value) = s.value {
                f(s.id, value);
            }
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots in the table.
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.slot.len()
    }

    #[cfg(test)]
    pub(crate) fn heap_bytes(&self) -> usize {
        self.slot.len() * size_of::<MapSlot<V>>()
    }

    #[cfg(test)]
    fn layout(&self) -> Vec<(u32, Option<V>, i32)> {
        self.slot.iter().map(|s| (s.id, s.value, s.next)).collect()
    }
}

impl<V: Copy> Drop for IdMap<V> {
    fn drop(&mut self) {
        self.allocator
            .release(self.slot.len() * size_of::<MapSlot<V>>());
    }
}
