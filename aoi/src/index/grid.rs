use super::{apply_mode, SpatialIndex};
use crate::allocator::Allocator;
use crate::entity::{in_view, Entity, Position};
use crate::error::{AoiError, AoiResult};
use crate::event::{notify_pair, Event, EventKind, EventSink};
use crate::id_map::IdMap;
use crate::mode::Mode;
use crate::scratch::{account_growth, spilled_bytes, ScratchSet};
use smallvec::SmallVec;
use std::fmt;
use std::mem::size_of;
use std::sync::Arc;

const TOWER_INLINE: usize = 4;

#[derive(Debug, Default)]
struct Tower {
    members: SmallVec<[u32; TOWER_INLINE]>,
}

#[derive(Clone, Copy)]
struct GridEntity {
    entity: Entity,
    tower: u32,
    next_free: u32,
}

impl GridEntity {
    fn new(entity: Entity, tower: u32) -> Self {
        Self {
            entity,
            tower,
            next_free: 0,
        }
    }
}

/// Uniform grid of towers.
///
/// Each live entity belongs to the tower containing its position. An entity
/// sees every member of its own tower and of the up to 26 towers around it;
/// the grid does not wrap at the map edges.
pub struct GridIndex {
    tower_size: Position,
    limit: [usize; 3],
    active: [bool; 3],
    towers: Vec<Tower>,
    // Index 0 is unused so that 0 can terminate the free chain.
    entities: Vec<GridEntity>,
    free_entity: u32,
    objects: IdMap<u32>,
    set1: ScratchSet<u32>,
    set2: ScratchSet<u32>,
    delta: ScratchSet<u32>,
    allocator: Arc<dyn Allocator>,
}

impl fmt::Debug for GridIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridIndex")
            .field("tower_size", &self.tower_size)
            .field("limit", &self.limit)
            .field("live", &self.objects.len())
            .finish_non_exhaustive()
    }
}

impl GridIndex {
    /// Lay out `ceil(map_size / tower_size)` towers per axis. An axis with a
    /// zero map or tower size collapses to a single layer.
    pub fn new(
        allocator: Arc<dyn Allocator>,
        map_size: Position,
        tower_size: Position,
    ) -> AoiResult<Self> {
        let mut limit = [1usize; 3];
        let mut active = [false; 3];
        let mut count: u64 = 1;
        for axis in 0..3 {
            if map_size[axis] > 0.0 && tower_size[axis] > 0.0 {
                active[axis] = true;
                let cells = (map_size[axis] / tower_size[axis]).ceil().max(1.0) as u64;
                limit[axis] = cells.min(u32::MAX as u64) as usize;
                count = count.saturating_mul(cells);
            }
        }
        if count > u32::MAX as u64 {
            return Err(AoiError::TooManyTowers { count });
        }

        allocator.allocate(count as usize * size_of::<Tower>());
        let towers = (0..count).map(|_| Tower::default()).collect();
        allocator.allocate(size_of::<GridEntity>());
        let entities = vec![GridEntity::new(Entity::sentinel(), 0)];

        Ok(Self {
            tower_size,
            limit,
            active,
            towers,
            entities,
            free_entity: 0,
            objects: IdMap::new(allocator.clone()),
            set1: ScratchSet::new(allocator.clone()),
            set2: ScratchSet::new(allocator.clone()),
            delta: ScratchSet::new(allocator.clone()),
            allocator,
        })
    }

    pub fn tower_size(&self) -> Position {
        self.tower_size
    }

    /// Towers per axis.
    pub fn limit(&self) -> [usize; 3] {
        self.limit
    }

    /// Cell coordinate of `pos`, or `None` when it lies outside the grid.
    pub fn cell(&self, pos: &Position) -> Option<[usize; 3]> {
        let mut cell = [0usize; 3];
        for axis in 0..3 {
            if !self.active[axis] {
                continue;
            }
            let c = (pos[axis] / self.tower_size[axis]).floor();
            if !(c >= 0.0 && c < self.limit[axis] as f32) {
                return None;
            }
            cell[axis] = c as usize;
        }
        Some(cell)
    }

    #[inline(always)]
    fn tower_index(&self, cell: [usize; 3]) -> u32 {
        (cell[0] + cell[1] * self.limit[0] + cell[2] * self.limit[0] * self.limit[1]) as u32
    }

    fn tower_of(&self, pos: &Position) -> Option<u32> {
        self.cell(pos).map(|cell| self.tower_index(cell))
    }

    /// Visit the tower and its neighbors, clipped to the grid.
    fn neighborhood<F>(limit: [usize; 3], tower: u32, mut f: F)
    where
        F: FnMut(u32),
    {
        let tower = tower as usize;
        let center = [
            tower % limit[0],
            (tower / limit[0]) % limit[1],
            tower / (limit[0] * limit[1]),
        ];
        let lo = center.map(|c| c.saturating_sub(1));
        let hi = [
            (center[0] + 1).min(limit[0] - 1),
            (center[1] + 1).min(limit[1] - 1),
            (center[2] + 1).min(limit[2] - 1),
        ];
        for z in lo[2]..=hi[2] {
            for y in lo[1]..=hi[1] {
                for x in lo[0]..=hi[0] {
                    f((x + y * limit[0] + z * limit[0] * limit[1]) as u32);
                }
            }
        }
    }

    fn around(limit: [usize; 3], tower: u32, out: &mut ScratchSet<u32>) {
        out.reset();
        Self::neighborhood(limit, tower, |t| out.add(t));
    }

    /// Inclusive tower span covering `[lo, hi]` on one axis, `None` when it
    /// misses the grid.
    fn span(&self, axis: usize, lo: f32, hi: f32) -> Option<(usize, usize)> {
        if !self.active[axis] {
            return Some((0, 0));
        }
        let size = self.tower_size[axis];
        let lo = (lo / size).floor().max(0.0);
        let hi = (hi / size).floor().min((self.limit[axis] - 1) as f32);
        if lo > hi {
            None
        } else {
            Some((lo as usize, hi as usize))
        }
    }

    fn collect_range(&self, pos: &Position, range: &Position, out: &mut ScratchSet<u32>) {
        let mut spans = [(0usize, 0usize); 3];
        for axis in 0..3 {
            match self.span(axis, pos[axis] - range[axis], pos[axis] + range[axis]) {
                Some(span) => spans[axis] = span,
                None => return,
            }
        }
        for z in spans[2].0..=spans[2].1 {
            for y in spans[1].0..=spans[1].1 {
                for x in spans[0].0..=spans[0].1 {
                    let tower = self.tower_index([x, y, z]);
                    for &member in self.towers[tower as usize].members.iter() {
                        let entity = &self.entities[member as usize].entity;
                        if in_view(&entity.pos, pos, range) {
                            out.add(entity.id);
                        }
                    }
                }
            }
        }
    }

    fn collect_around(&self, tower: u32, out: &mut ScratchSet<u32>) {
        Self::neighborhood(self.limit, tower, |t| {
            for &member in self.towers[t as usize].members.iter() {
                out.add(self.entities[member as usize].entity.id);
            }
        });
    }

    fn notify_towers(
        &self,
        towers: &ScratchSet<u32>,
        entity: &Entity,
        kind: EventKind,
        sink: &mut dyn EventSink,
    ) {
        for &tower in towers.iter() {
            for &member in self.towers[tower as usize].members.iter() {
                notify_pair(sink, kind, entity, &self.entities[member as usize].entity);
            }
        }
    }

    fn alloc_entity(&mut self, entity: Entity, tower: u32) -> u32 {
        self.allocator.allocate(size_of::<GridEntity>());
        if self.free_entity != 0 {
            let idx = self.free_entity;
            self.free_entity = self.entities[idx as usize].next_free;
            self.entities[idx as usize] = GridEntity::new(entity, tower);
            idx
        } else {
            self.entities.push(GridEntity::new(entity, tower));
            (self.entities.len() - 1) as u32
        }
    }

    fn free_entity(&mut self, idx: u32) {
        let slot = &mut self.entities[idx as usize];
        slot.entity = Entity::sentinel();
        slot.next_free = self.free_entity;
        self.free_entity = idx;
        self.allocator.release(size_of::<GridEntity>());
    }

    fn attach(&mut self, tower: u32, handle: u32) {
        let members = &mut self.towers[tower as usize].members;
        let before = spilled_bytes(members);
        members.push(handle);
        account_growth(self.allocator.as_ref(), before, members);
    }

    fn detach(&mut self, tower: u32, handle: u32) {
        let members = &mut self.towers[tower as usize].members;
        let idx = members.iter().position(|&m| m == handle);
        let idx = idx.unwrap_or_else(|| {
            panic!(
                "grid invariant violated: entity {} missing from tower {}",
                handle, tower
            )
        });
        members.remove(idx);
    }

    /// Tower array, spilled member lists, one record per entity plus the
    /// sentinel, and the map slots.
    #[cfg(test)]
    fn expected_bytes(&self) -> usize {
        self.towers.len() * size_of::<Tower>()
            + self.towers.iter().map(|t| spilled_bytes(&t.members)).sum::<usize>()
            + (self.objects.len() + 1) * size_of::<GridEntity>()
            + self.objects.heap_bytes()
    }
}

impl SpatialIndex for GridIndex {
    fn enter(&mut self, id: u32, pos: Position, mode: Mode, sink: &mut dyn EventSink) {
        if self.objects.get(id).is_some() {
            self.leave(id, sink);
        }
        let Some(tower) = self.tower_of(&pos) else {
            tracing::debug!(id, ?pos, "enter outside the grid ignored");
            return;
        };
        let entity = Entity { id, mode, pos };
        let handle = self.alloc_entity(entity, tower);
        self.attach(tower, handle);
        self.objects.insert(id, handle);

        Self::around(self.limit, tower, &mut self.delta);
        self.notify_towers(&self.delta, &entity, EventKind::Enter, sink);
    }

    fn leave(&mut self, id: u32, sink: &mut dyn EventSink) {
        let Some(handle) = self.objects.get(id) else {
            return;
        };
        let GridEntity { entity, tower, .. } = self.entities[handle as usize];
        self.detach(tower, handle);

        Self::around(self.limit, tower, &mut self.delta);
        self.notify_towers(&self.delta, &entity, EventKind::Leave, sink);

        self.objects.remove(id);
        self.free_entity(handle);
    }

    fn move_to(&mut self, id: u32, pos: Position, sink: &mut dyn EventSink) {
        let Some(handle) = self.objects.get(id) else {
            return;
        };
        let Some(new_tower) = self.tower_of(&pos) else {
            tracing::debug!(id, ?pos, "move outside the grid ignored");
            return;
        };
        let old_tower = self.entities[handle as usize].tower;
        self.entities[handle as usize].entity.pos = pos;
        if new_tower == old_tower {
            return;
        }

        self.detach(old_tower, handle);
        self.attach(new_tower, handle);
        self.entities[handle as usize].tower = new_tower;

        let entity = self.entities[handle as usize].entity;
        Self::around(self.limit, old_tower, &mut self.set1);
        Self::around(self.limit, new_tower, &mut self.set2);

        ScratchSet::difference(&self.set2, &self.set1, &mut self.delta);
        self.notify_towers(&self.delta, &entity, EventKind::Enter, sink);
        ScratchSet::difference(&self.set1, &self.set2, &mut self.delta);
        self.notify_towers(&self.delta, &entity, EventKind::Leave, sink);
    }

    fn change_mode(&mut self, id: u32, mode: Mode, sink: &mut dyn EventSink) {
        let Some(handle) = self.objects.get(id) else {
            return;
        };
        if !apply_mode(&mut self.entities[handle as usize].entity, mode) {
            return;
        }
        let tower = self.entities[handle as usize].tower;
        Self::neighborhood(self.limit, tower, |t| {
            for &member in self.towers[t as usize].members.iter() {
                let marker = self.entities[member as usize].entity.id;
                if marker != id {
                    sink.emit(Event::enter(id, marker));
                }
            }
        });
    }

    fn query_by_pos(&self, pos: Position, range: Option<Position>, out: &mut ScratchSet<u32>) {
        out.reset();
        match range {
            Some(range) => self.collect_range(&pos, &range, out),
            None => {
                if let Some(tower) = self.tower_of(&pos) {
                    self.collect_around(tower, out);
                }
            }
        }
    }

    fn query_by_id(&self, id: u32, range: Option<Position>, out: &mut ScratchSet<u32>) {
        out.reset();
        let Some(handle) = self.objects.get(id) else {
            return;
        };
        let GridEntity { entity, tower, .. } = self.entities[handle as usize];
        match range {
            Some(range) => self.collect_range(&entity.pos, &range, out),
            None => self.collect_around(tower, out),
        }
        out.remove(id);
    }

    fn entity(&self, id: u32) -> Option<Entity> {
        self.objects
            .get(id)
            .map(|handle| self.entities[handle as usize].entity)
    }

    fn len(&self) -> usize {
        self.objects.len()
    }
}

impl Drop for GridIndex {
    fn drop(&mut self) {
        for _ in 0..=self.objects.len() {
            self.allocator.release(size_of::<GridEntity>());
        }
        for tower in self.towers.iter() {
            let bytes = spilled_bytes(&tower.members);
            if bytes > 0 {
                self.allocator.release(bytes);
            }
        }
        self.allocator
            .release(self.towers.len() * size_of::<Tower>());
    }
}
