pub mod allocator;
pub mod config;
pub mod entity;
pub mod error;
pub mod event;
pub mod id_map;
pub mod index;
pub mod mode;
pub mod scratch;
pub mod space;

pub use allocator::{Allocator, CountingAllocator, SystemAllocator};
pub use config::{Backend, Config, Dispatch};
pub use entity::{in_view, Entity, Position, INVALID_ID};
pub use error::{AoiError, AoiResult};
pub use event::{AoiHandler, Event, EventKind, EventSink, FnHandler};
pub use index::{CrossLinkIndex, GridIndex, SpatialIndex};
pub use mode::Mode;
pub use scratch::ScratchSet;
pub use space::Space;
