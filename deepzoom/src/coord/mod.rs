//! Quadtree coordinates and viewport geometry
//!
//! Provides the immutable tile address used as the cache key everywhere in the
//! crate, plus the viewport snapshot and rectangle math shared by the
//! scheduler and the visibility validator.

mod types;
mod viewport;

pub use types::{CoordError, TileAddress, TileOffset, MAX_LEVEL};
pub use viewport::{Rect, ViewportSnapshot, DEFAULT_TILE_SIZE};
