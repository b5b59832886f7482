//! The two interchangeable spatial indexes behind a [`Space`](crate::Space).
//!
//! - [`CrossLinkIndex`]: three doubly linked lists, one per axis, kept sorted
//!   by coordinate. Views are exact axis-aligned boxes around the entity.
//! - [`GridIndex`]: the map cut into fixed-size towers. An entity sees every
//!   entity in its own and the 26 surrounding towers.
//!
//! Both emit the same kind of notifications through an [`EventSink`] and
//! answer queries into a caller-owned [`ScratchSet`].

use crate::entity::{Entity, Position};
use crate::event::EventSink;
use crate::mode::Mode;
use crate::scratch::ScratchSet;
use std::fmt::Debug;

mod crosslink;
mod grid;

pub use crosslink::CrossLinkIndex;
pub use grid::GridIndex;

pub trait SpatialIndex: Debug {
    /// Add an entity, replacing any live entity with the same id.
    fn enter(&mut self, id: u32, pos: Position, mode: Mode, sink: &mut dyn EventSink);

    fn leave(&mut self, id: u32, sink: &mut dyn EventSink);

    fn move_to(&mut self, id: u32, pos: Position, sink: &mut dyn EventSink);

    /// Replace the mode flags. An entity that just became a watcher is sent
    /// an enter event for everything already around it.
    fn change_mode(&mut self, id: u32, mode: Mode, sink: &mut dyn EventSink);

    /// Ids around `pos`; `range` defaults to the index's own view.
    fn query_by_pos(&self, pos: Position, range: Option<Position>, out: &mut ScratchSet<u32>);

    /// Ids around entity `id`, the entity itself excluded.
    fn query_by_id(&self, id: u32, range: Option<Position>, out: &mut ScratchSet<u32>);

    fn entity(&self, id: u32) -> Option<Entity>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Store `mode`, returning whether the entity just turned into a watcher.
#[inline(always)]
pub(crate) fn apply_mode(entity: &mut Entity, mode: Mode) -> bool {
    let was_watcher = entity.mode.is_watcher();
    entity.mode = mode;
    !was_watcher && mode.is_watcher()
}
