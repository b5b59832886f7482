use crate::entity::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Enter,
    Leave,
}

/// `watcher` is the recipient, `marker` the entity it gained or lost sight of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Event {
    pub kind: EventKind,
    pub watcher: u32,
    pub marker: u32,
}

impl Event {
    pub fn enter(watcher: u32, marker: u32) -> Self {
        Self {
            kind: EventKind::Enter,
            watcher,
            marker,
        }
    }

    pub fn leave(watcher: u32, marker: u32) -> Self {
        Self {
            kind: EventKind::Leave,
            watcher,
            marker,
        }
    }
}

/// Receiver of area-of-interest notifications.
///
/// The handler is owned by its space and carries whatever host state the
/// notifications need to reach.
pub trait AoiHandler {
    fn on_enter(&mut self, watcher: u32, marker: u32);
    fn on_leave(&mut self, watcher: u32, marker: u32);
}

/// Discards every notification.
impl AoiHandler for () {
    fn on_enter(&mut self, _watcher: u32, _marker: u32) {}
    fn on_leave(&mut self, _watcher: u32, _marker: u32) {}
}

/// Records notifications in arrival order.
impl AoiHandler for Vec<Event> {
    fn on_enter(&mut self, watcher: u32, marker: u32) {
        self.push(Event::enter(watcher, marker));
    }

    fn on_leave(&mut self, watcher: u32, marker: u32) {
        self.push(Event::leave(watcher, marker));
    }
}

/// Handler built from a pair of closures.
pub struct FnHandler<E, L> {
    on_enter: E,
    on_leave: L,
}

impl<E, L> FnHandler<E, L>
where
    E: FnMut(u32, u32),
    L: FnMut(u32, u32),
{
    pub fn new(on_enter: E, on_leave: L) -> Self {
        Self { on_enter, on_leave }
    }
}

impl<E, L> AoiHandler for FnHandler<E, L>
where
    E: FnMut(u32, u32),
    L: FnMut(u32, u32),
{
    fn on_enter(&mut self, watcher: u32, marker: u32) {
        (self.on_enter)(watcher, marker);
    }

    fn on_leave(&mut self, watcher: u32, marker: u32) {
        (self.on_leave)(watcher, marker);
    }
}

impl<E, L> std::fmt::Debug for FnHandler<E, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

/// Where the spatial indexes push the events they compute.
pub trait EventSink {
    fn emit(&mut self, event: Event);
}

impl EventSink for Vec<Event> {
    fn emit(&mut self, event: Event) {
        self.push(event);
    }
}

/// Notify each side of the pair that is a watcher about the other one.
/// An entity is never told about itself.
#[inline(always)]
pub(crate) fn notify_pair(sink: &mut dyn EventSink, kind: EventKind, a: &Entity, b: &Entity) {
    if a.id == b.id {
        return;
    }
    if a.mode.is_watcher() {
        sink.emit(Event {
            kind,
            watcher: a.id,
            marker: b.id,
        });
    }
    if b.mode.is_watcher() {
        sink.emit(Event {
            kind,
            watcher: b.id,
            marker: a.id,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Mode;

    fn entity(id: u32, mode: &str) -> Entity {
        Entity {
            id,
            mode: Mode::parse(mode),
            pos: [0.0; 3],
        }
    }

    #[test]
    fn pair_of_watchers_yields_two_events() {
        let mut events = Vec::new();
        notify_pair(&mut events, EventKind::Enter, &entity(1, "wm"), &entity(2, "w"));
        assert_eq!(events, vec![Event::enter(1, 2), Event::enter(2, 1)]);
    }

    #[test]
    fn only_watchers_are_notified() {
        let mut events = Vec::new();
        notify_pair(&mut events, EventKind::Leave, &entity(1, "m"), &entity(2, "wm"));
        notify_pair(&mut events, EventKind::Leave, &entity(3, "m"), &entity(4, "m"));
        assert_eq!(events, vec![Event::leave(2, 1)]);
    }

    #[test]
    fn never_notifies_self() {
        let mut events = Vec::new();
        notify_pair(&mut events, EventKind::Enter, &entity(5, "wm"), &entity(5, "wm"));
        assert!(events.is_empty());
    }
}
