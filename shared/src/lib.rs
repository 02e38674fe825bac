pub mod area;
pub mod colors;
pub mod events;
pub mod stats;

pub use area::{AreaId, AreaIdSet, AreaKind, Bounds, ChunkSummary};
pub use events::*;
pub use stats::*;
