use crate::allocator::{Allocator, SystemAllocator};
use crate::config::{Backend, Config, Dispatch};
use crate::entity::{Entity, Position, INVALID_ID};
use crate::error::AoiResult;
use crate::event::{AoiHandler, Event, EventKind, EventSink};
use crate::index::{CrossLinkIndex, GridIndex, SpatialIndex};
use crate::mode::Mode;
use crate::scratch::ScratchSet;
use std::mem::size_of;
use std::sync::Arc;

/// Bytes of a boxed record, reported for as long as the record lives.
#[derive(Debug)]
struct Footprint {
    allocator: Arc<dyn Allocator>,
    bytes: usize,
}

impl Footprint {
    fn new(allocator: Arc<dyn Allocator>, bytes: usize) -> Self {
        allocator.allocate(bytes);
        Self { allocator, bytes }
    }
}

impl Drop for Footprint {
    fn drop(&mut self) {
        self.allocator.release(self.bytes);
    }
}

/// Routes index events to the handler, either right away or through the
/// pending queue.
struct Dispatcher<'a, H: AoiHandler> {
    handler: &'a mut H,
    pending: &'a mut ScratchSet<Event>,
    dispatch: Dispatch,
}

impl<'a, H: AoiHandler> EventSink for Dispatcher<'a, H> {
    #[inline(always)]
    fn emit(&mut self, event: Event) {
        match self.dispatch {
            Dispatch::Inline => deliver(self.handler, event),
            Dispatch::Deferred => self.pending.add(event),
        }
    }
}

#[inline(always)]
fn deliver<H: AoiHandler>(handler: &mut H, event: Event) {
    match event.kind {
        EventKind::Enter => handler.on_enter(event.watcher, event.marker),
        EventKind::Leave => handler.on_leave(event.watcher, event.marker),
    }
}

/// An area-of-interest space: a set of entities, one spatial index and the
/// handler told about every enter/leave.
///
/// The handler is owned by the space and cannot reach back into it, so every
/// notification is delivered while the space is mutably borrowed.
#[derive(Debug)]
pub struct Space<H: AoiHandler> {
    index: Box<dyn SpatialIndex>,
    handler: H,
    result: ScratchSet<u32>,
    pending: ScratchSet<Event>,
    config: Config,
    _index_box: Footprint,
    _footprint: Footprint,
}

impl<H: AoiHandler> Space<H> {
    /// Build a space whose memory is reported through `allocator`.
    pub fn create(allocator: Arc<dyn Allocator>, config: Config, handler: H) -> AoiResult<Self> {
        config.validate()?;
        let footprint = Footprint::new(allocator.clone(), size_of::<Self>());
        let index: Box<dyn SpatialIndex> = match config.backend {
            Backend::CrossLink => Box::new(CrossLinkIndex::new(allocator.clone(), config.param_size)),
            Backend::Grid => Box::new(GridIndex::new(
                allocator.clone(),
                config.map_size,
                config.param_size,
            )?),
        };
        let index_bytes = match config.backend {
            Backend::CrossLink => size_of::<CrossLinkIndex>(),
            Backend::Grid => size_of::<GridIndex>(),
        };
        let index_box = Footprint::new(allocator.clone(), index_bytes);
        tracing::debug!(
            backend = ?config.backend,
            dispatch = ?config.dispatch,
            map_size = ?config.map_size,
            param_size = ?config.param_size,
            "aoi space created"
        );
        Ok(Self {
            index,
            handler,
            result: ScratchSet::new(allocator.clone()),
            pending: ScratchSet::new(allocator),
            config,
            _index_box: index_box,
            _footprint: footprint,
        })
    }

    pub fn new(config: Config, handler: H) -> AoiResult<Self> {
        Self::create(Arc::new(SystemAllocator), config, handler)
    }

    /// Add an entity, or replace the live one with the same id.
    pub fn enter(&mut self, id: u32, pos: Position, mode: Mode) {
        if id == INVALID_ID {
            tracing::warn!(id, "enter with the reserved id ignored");
            return;
        }
        tracing::trace!(id, ?pos, ?mode, "enter");
        self.with_sink(|index, sink| index.enter(id, pos, mode, sink));
    }

    pub fn enter_str(&mut self, id: u32, pos: Position, modestring: &str) {
        self.enter(id, pos, Mode::parse(modestring));
    }

    pub fn leave(&mut self, id: u32) {
        tracing::trace!(id, "leave");
        self.with_sink(|index, sink| index.leave(id, sink));
    }

    pub fn move_to(&mut self, id: u32, pos: Position) {
        tracing::trace!(id, ?pos, "move");
        self.with_sink(|index, sink| index.move_to(id, pos, sink));
    }

    pub fn change_mode(&mut self, id: u32, mode: Mode) {
        tracing::trace!(id, ?mode, "change mode");
        self.with_sink(|index, sink| index.change_mode(id, mode, sink));
    }

    pub fn change_mode_str(&mut self, id: u32, modestring: &str) {
        self.change_mode(id, Mode::parse(modestring));
    }

    /// Ids around `pos`. Without a range the configured view (cross-link)
    /// or the surrounding towers (grid) are used. Valid until the next query.
    pub fn query_by_pos(&mut self, pos: Position, range: Option<Position>) -> &[u32] {
        self.index.query_by_pos(pos, range, &mut self.result);
        self.result.as_slice()
    }

    /// Ids around entity `id`, itself excluded; empty when `id` is unknown.
    pub fn query_by_id(&mut self, id: u32, range: Option<Position>) -> &[u32] {
        self.index.query_by_id(id, range, &mut self.result);
        self.result.as_slice()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.index.entity(id).is_some()
    }

    pub fn entity(&self, id: u32) -> Option<Entity> {
        self.index.entity(id)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Tear the space down, giving every buffer back to the allocator, and
    /// return the handler.
    pub fn release(self) -> H {
        tracing::debug!(live = self.index.len(), "aoi space released");
        let Space { handler, .. } = self;
        handler
    }

    fn with_sink<F>(&mut self, op: F)
    where
        F: FnOnce(&mut dyn SpatialIndex, &mut dyn EventSink),
    {
        let mut sink = Dispatcher {
            handler: &mut self.handler,
            pending: &mut self.pending,
            dispatch: self.config.dispatch,
        };
        op(self.index.as_mut(), &mut sink);

        if !self.pending.is_empty() {
            for &event in self.pending.iter() {
                deliver(&mut self.handler, event);
            }
            self.pending.reset();
        }
    }
}
