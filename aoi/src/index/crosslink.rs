use super::{apply_mode, SpatialIndex};
use crate::allocator::Allocator;
use crate::entity::{in_view, Entity, Position};
use crate::event::{notify_pair, Event, EventKind, EventSink};
use crate::id_map::IdMap;
use crate::mode::Mode;
use crate::scratch::ScratchSet;
use std::fmt;
use std::mem::size_of;
use std::sync::Arc;

// Node 0 is the origin: head of all three lists and, as a `next` link, the
// end-of-list marker (nothing ever links forward to the origin).
const ORIGIN: u32 = 0;
const AXES: usize = 3;

#[derive(Clone, Copy)]
struct Node {
    entity: Entity,
    prev: [u32; AXES],
    next: [u32; AXES],
    next_free: u32,
}

impl Node {
    fn new(entity: Entity) -> Self {
        Self {
            entity,
            prev: [ORIGIN; AXES],
            next: [ORIGIN; AXES],
            next_free: 0,
        }
    }
}

/// Sorted cross-linked list index.
///
/// Every live entity is linked into one list per axis, ordered by its
/// coordinate on that axis. A view walks the x list outward from the entity
/// and stops as soon as the x distance alone exceeds the range.
pub struct CrossLinkIndex {
    view_size: Position,
    nodes: Vec<Node>,
    free_node: u32,
    objects: IdMap<u32>,
    set1: ScratchSet<u32>,
    set2: ScratchSet<u32>,
    delta: ScratchSet<u32>,
    allocator: Arc<dyn Allocator>,
}

impl fmt::Debug for CrossLinkIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrossLinkIndex")
            .field("view_size", &self.view_size)
            .field("live", &self.objects.len())
            .field("nodes", &self.nodes.len())
            .finish_non_exhaustive()
    }
}

impl CrossLinkIndex {
    pub fn new(allocator: Arc<dyn Allocator>, view_size: Position) -> Self {
        allocator.allocate(size_of::<Node>());
        let nodes = vec![Node::new(Entity::sentinel())];
        Self {
            view_size,
            nodes,
            free_node: 0,
            objects: IdMap::new(allocator.clone()),
            set1: ScratchSet::new(allocator.clone()),
            set2: ScratchSet::new(allocator.clone()),
            delta: ScratchSet::new(allocator.clone()),
            allocator,
        }
    }

    pub fn view_size(&self) -> Position {
        self.view_size
    }

    fn alloc_node(&mut self, entity: Entity) -> u32 {
        self.allocator.allocate(size_of::<Node>());
        if self.free_node != 0 {
            let idx = self.free_node;
            self.free_node = self.nodes[idx as usize].next_free;
            self.nodes[idx as usize] = Node::new(entity);
            idx
        } else {
            self.nodes.push(Node::new(entity));
            (self.nodes.len() - 1) as u32
        }
    }

    fn free_node(&mut self, idx: u32) {
        let node = &mut self.nodes[idx as usize];
        node.entity = Entity::sentinel();
        node.next_free = self.free_node;
        self.free_node = idx;
        self.allocator.release(size_of::<Node>());
    }

    #[inline(always)]
    fn link_insert(&mut self, axis: usize, after: u32, node: u32) {
        let next = self.nodes[after as usize].next[axis];
        self.nodes[node as usize].next[axis] = next;
        self.nodes[node as usize].prev[axis] = after;
        if next != ORIGIN {
            self.nodes[next as usize].prev[axis] = node;
        }
        self.nodes[after as usize].next[axis] = node;
    }

    #[inline(always)]
    fn link_remove(&mut self, axis: usize, node: u32) {
        assert!(node != ORIGIN, "cross-link invariant violated: unlinking the origin");
        let prev = self.nodes[node as usize].prev[axis];
        let next = self.nodes[node as usize].next[axis];
        if next != ORIGIN {
            self.nodes[next as usize].prev[axis] = prev;
        }
        self.nodes[prev as usize].next[axis] = next;
    }

    fn link_insert_by_pos(&mut self, node: u32) {
        let pos = self.nodes[node as usize].entity.pos;
        for axis in 0..AXES {
            let mut at = ORIGIN;
            loop {
                let next = self.nodes[at as usize].next[axis];
                if next == ORIGIN || self.nodes[next as usize].entity.pos[axis] >= pos[axis] {
                    break;
                }
                at = next;
            }
            self.link_insert(axis, at, node);
        }
    }

    /// Move `node` along one axis list to where `value` belongs, walking from
    /// its current link in the direction of travel.
    fn relink(&mut self, node: u32, axis: usize, value: f32) {
        let old = self.nodes[node as usize].entity.pos[axis];
        if value < old {
            let first = self.nodes[node as usize].prev[axis];
            let mut prev = first;
            while prev != ORIGIN && self.nodes[prev as usize].entity.pos[axis] >= value {
                prev = self.nodes[prev as usize].prev[axis];
            }
            if prev != first {
                self.link_remove(axis, node);
                self.link_insert(axis, prev, node);
            }
        } else if value > old {
            let mut at = node;
            loop {
                let next = self.nodes[at as usize].next[axis];
                if next == ORIGIN || self.nodes[next as usize].entity.pos[axis] >= value {
                    break;
                }
                at = next;
            }
            if at != node {
                self.link_remove(axis, node);
                self.link_insert(axis, at, node);
            }
        }
    }

    /// Visit every other node within `range` of `node`.
    fn walk_view<F>(nodes: &[Node], node: u32, range: &Position, mut f: F)
    where
        F: FnMut(u32),
    {
        let center = nodes[node as usize].entity.pos;
        let mut at = nodes[node as usize].prev[0];
        while at != ORIGIN {
            let other = &nodes[at as usize];
            if (other.entity.pos[0] - center[0]).abs() > range[0] {
                break;
            }
            if in_view(&other.entity.pos, &center, range) {
                f(at);
            }
            at = other.prev[0];
        }
        let mut at = nodes[node as usize].next[0];
        while at != ORIGIN {
            let other = &nodes[at as usize];
            if (other.entity.pos[0] - center[0]).abs() > range[0] {
                break;
            }
            if in_view(&other.entity.pos, &center, range) {
                f(at);
            }
            at = other.next[0];
        }
    }

    fn collect_view(nodes: &[Node], node: u32, range: &Position, set: &mut ScratchSet<u32>) {
        set.reset();
        Self::walk_view(nodes, node, range, |other| set.add(other));
    }

    fn notify_delta(&self, node: u32, kind: EventKind, sink: &mut dyn EventSink) {
        let entity = &self.nodes[node as usize].entity;
        for &other in self.delta.iter() {
            notify_pair(sink, kind, entity, &self.nodes[other as usize].entity);
        }
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        for axis in 0..AXES {
            let mut count = 0;
            let mut prev = ORIGIN;
            let mut at = self.nodes[ORIGIN as usize].next[axis];
            while at != ORIGIN {
                let node = &self.nodes[at as usize];
                assert_eq!(node.prev[axis], prev, "prev link broken on axis {}", axis);
                if prev != ORIGIN {
                    assert!(
                        self.nodes[prev as usize].entity.pos[axis] <= node.entity.pos[axis],
                        "axis {} out of order",
                        axis
                    );
                }
                assert_eq!(self.objects.get(node.entity.id), Some(at));
                count += 1;
                prev = at;
                at = node.next[axis];
            }
            assert_eq!(count, self.objects.len(), "axis {} misses nodes", axis);
        }
    }
}

impl SpatialIndex for CrossLinkIndex {
    fn enter(&mut self, id: u32, pos: Position, mode: Mode, sink: &mut dyn EventSink) {
        if self.objects.get(id).is_some() {
            self.leave(id, sink);
        }
        let node = self.alloc_node(Entity { id, mode, pos });
        self.objects.insert(id, node);
        self.link_insert_by_pos(node);
        Self::collect_view(&self.nodes, node, &self.view_size, &mut self.delta);
        self.notify_delta(node, EventKind::Enter, sink);
    }

    fn leave(&mut self, id: u32, sink: &mut dyn EventSink) {
        let Some(node) = self.objects.get(id) else {
            return;
        };
        Self::collect_view(&self.nodes, node, &self.view_size, &mut self.delta);
        self.notify_delta(node, EventKind::Leave, sink);
        for axis in 0..AXES {
            self.link_remove(axis, node);
        }
        self.objects.remove(id);
        self.free_node(node);
    }

    fn move_to(&mut self, id: u32, pos: Position, sink: &mut dyn EventSink) {
        let Some(node) = self.objects.get(id) else {
            return;
        };
        if self.nodes[node as usize].entity.pos == pos {
            return;
        }
        Self::collect_view(&self.nodes, node, &self.view_size, &mut self.set1);
        for axis in 0..AXES {
            self.relink(node, axis, pos[axis]);
        }
        self.nodes[node as usize].entity.pos = pos;
        Self::collect_view(&self.nodes, node, &self.view_size, &mut self.set2);

        ScratchSet::difference(&self.set2, &self.set1, &mut self.delta);
        self.notify_delta(node, EventKind::Enter, sink);
        ScratchSet::difference(&self.set1, &self.set2, &mut self.delta);
        self.notify_delta(node, EventKind::Leave, sink);
    }

    fn change_mode(&mut self, id: u32, mode: Mode, sink: &mut dyn EventSink) {
        let Some(node) = self.objects.get(id) else {
            return;
        };
        if !apply_mode(&mut self.nodes[node as usize].entity, mode) {
            return;
        }
        Self::collect_view(&self.nodes, node, &self.view_size, &mut self.delta);
        for &other in self.delta.iter() {
            let marker = self.nodes[other as usize].entity.id;
            if marker != id {
                sink.emit(Event::enter(id, marker));
            }
        }
    }

    fn query_by_pos(&self, pos: Position, range: Option<Position>, out: &mut ScratchSet<u32>) {
        out.reset();
        let range = range.unwrap_or(self.view_size);
        let mut at = self.nodes[ORIGIN as usize].next[0];
        while at != ORIGIN {
            let node = &self.nodes[at as usize];
            let dx = node.entity.pos[0] - pos[0];
            if dx.abs() <= range[0] {
                if in_view(&node.entity.pos, &pos, &range) {
                    out.add(node.entity.id);
                }
            } else if dx > 0.0 {
                break;
            }
            at = node.next[0];
        }
    }

    fn query_by_id(&self, id: u32, range: Option<Position>, out: &mut ScratchSet<u32>) {
        out.reset();
        let Some(node) = self.objects.get(id) else {
            return;
        };
        let range = range.unwrap_or(self.view_size);
        Self::walk_view(&self.nodes, node, &range, |other| {
            out.add(self.nodes[other as usize].entity.id)
        });
    }

    fn entity(&self, id: u32) -> Option<Entity> {
        self.objects
            .get(id)
            .map(|node| self.nodes[node as usize].entity)
    }

    fn len(&self) -> usize {
        self.objects.len()
    }
}

impl Drop for CrossLinkIndex {
    fn drop(&mut self) {
        // Origin plus every live node.
        for _ in 0..=self.objects.len() {
            self.allocator.release(size_of::<Node>());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{CountingAllocator, SystemAllocator};

    fn index() -> CrossLinkIndex {
        CrossLinkIndex::new(Arc::new(SystemAllocator), [4.5, 4.5, 4.5])
    }

    #[test]
    fn default_range_is_the_view_size() {
        let mut idx = index();
        assert_eq!(idx.view_size(), [4.5, 4.5, 4.5]);
        let mut events = Vec::new();
        idx.enter(1, [10.0, 10.0, 10.0], Mode::MARKER, &mut events);
        idx.enter(2, [14.5, 10.0, 10.0], Mode::MARKER, &mut events);
        let mut out = ScratchSet::new(Arc::new(SystemAllocator));
        idx.query_by_pos([10.0, 10.0, 10.0], None, &mut out);
        let mut explicit = ScratchSet::new(Arc::new(SystemAllocator));
        idx.query_by_pos([10.0, 10.0, 10.0], Some(idx.view_size()), &mut explicit);
        assert_eq!(ids(&out), vec![1, 2]);
        assert_eq!(ids(&out), ids(&explicit));
    }

    fn ids(set: &ScratchSet<u32>) -> Vec<u32> {
        let mut ids = set.as_slice().to_vec();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn lists_stay_sorted_under_movement() {
        let mut idx = index();
        let mut events = Vec::new();
        let coords = [
            [10.0, 50.0, 3.0],
            [2.0, 7.0, 90.0],
            [10.0, 1.0, 3.0],
            [77.0, 7.0, 0.0],
            [5.0, 5.0, 5.0],
        ];
        for (id, pos) in coords.iter().enumerate() {
            idx.enter(id as u32, *pos, Mode::parse("wm"), &mut events);
            idx.check_invariants();
        }
        idx.move_to(3, [0.0, 99.0, 50.0], &mut events);
        idx.check_invariants();
        idx.move_to(1, [100.0, 0.0, 0.0], &mut events);
        idx.check_invariants();
        idx.move_to(0, [10.0, 1.0, 3.0], &mut events);
        idx.check_invariants();
        idx.leave(2, &mut events);
        idx.check_invariants();
        idx.enter(2, [3.0, 3.0, 3.0], Mode::MARKER, &mut events);
        idx.check_invariants();
    }

    #[test]
    fn enter_reports_both_watchers() {
        let mut idx = index();
        let mut events = Vec::new();
        idx.enter(1, [10.0, 10.0, 10.0], Mode::parse("wm"), &mut events);
        assert!(events.is_empty());
        idx.enter(2, [12.0, 13.0, 10.0], Mode::parse("wm"), &mut events);
        assert_eq!(events, vec![Event::enter(2, 1), Event::enter(1, 2)]);

        events.clear();
        idx.enter(3, [14.6, 10.0, 10.0], Mode::parse("m"), &mut events);
        // 4.6 away from 1 on x: only 2 sees it.
        assert_eq!(events, vec![Event::enter(2, 3)]);
    }

    #[test]
    fn move_emits_only_the_delta() {
        let mut idx = index();
        let mut events = Vec::new();
        idx.enter(1, [10.0, 10.0, 10.0], Mode::WATCHER, &mut events);
        idx.enter(2, [13.0, 10.0, 10.0], Mode::MARKER, &mut events);
        idx.enter(3, [30.0, 10.0, 10.0], Mode::MARKER, &mut events);
        events.clear();

        idx.move_to(1, [12.0, 10.0, 10.0], &mut events);
        assert!(events.is_empty());

        idx.move_to(1, [27.0, 10.0, 10.0], &mut events);
        assert_eq!(events, vec![Event::enter(1, 3), Event::leave(1, 2)]);

        events.clear();
        idx.move_to(1, [27.0, 10.0, 10.0], &mut events);
        assert!(events.is_empty());
    }

    #[test]
    fn queries_exclude_self_by_id_only() {
        let mut idx = index();
        let mut events = Vec::new();
        idx.enter(1, [10.0, 10.0, 10.0], Mode::WATCHER, &mut events);
        idx.enter(2, [11.0, 10.0, 10.0], Mode::MARKER, &mut events);
        idx.enter(3, [20.0, 10.0, 10.0], Mode::MARKER, &mut events);

        let mut out = ScratchSet::new(Arc::new(SystemAllocator));
        idx.query_by_pos([10.0, 10.0, 10.0], None, &mut out);
        assert_eq!(ids(&out), vec![1, 2]);

        idx.query_by_id(1, None, &mut out);
        assert_eq!(ids(&out), vec![2]);

        idx.query_by_id(1, Some([10.0, 0.0, 0.0]), &mut out);
        assert_eq!(ids(&out), vec![2, 3]);

        idx.query_by_id(99, None, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn becoming_a_watcher_catches_up() {
        let mut idx = index();
        let mut events = Vec::new();
        idx.enter(1, [10.0, 10.0, 10.0], Mode::MARKER, &mut events);
        idx.enter(2, [11.0, 10.0, 10.0], Mode::MARKER, &mut events);
        assert!(events.is_empty());

        idx.change_mode(1, Mode::parse("wm"), &mut events);
        assert_eq!(events, vec![Event::enter(1, 2)]);

        events.clear();
        idx.change_mode(1, Mode::WATCHER, &mut events);
        idx.change_mode(2, Mode::empty(), &mut events);
        assert!(events.is_empty());
        assert_eq!(idx.entity(2).map(|e| e.mode), Some(Mode::empty()));
    }

    #[test]
    fn node_memory_returns_to_the_port() {
        let allocator = Arc::new(CountingAllocator::new());
        let mut idx = CrossLinkIndex::new(allocator.clone(), [4.5, 4.5, 4.5]);
        let mut events = Vec::new();
        for id in 0..40u32 {
            idx.enter(id, [id as f32, 0.0, 0.0], Mode::WATCHER, &mut events);
        }
        for id in 0..20u32 {
            idx.leave(id, &mut events);
        }
        assert!(allocator.current() > 0);
        drop(idx);
        assert_eq!(allocator.current(), 0);
        assert_eq!(allocator.count(), 0);
    }
}
