//! Per-source tile cache.
//!
//! # Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │ RequestTable  (address → TileEntry + recency)   │  one lock per source
//! ├─────────────────────────────────────────────────┤
//! │ Evictor       (byte budget, in-use protection)  │  runs inside the lock
//! ├─────────────────────────────────────────────────┤
//! │ CacheStorage  (injected, name + expiry keyed)   │  shared, optional
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! The request table is the only structure that needs mutual exclusion
//! inside one source. Its lock is held for map and list operations only,
//! never across I/O.

mod entry;
mod evictor;
pub mod providers;
mod storage;
mod table;

pub use entry::TileEntry;
pub use evictor::{
    EvictionBudget, EvictionReport, MinTilePolicy, DEFAULT_MAX_EVICTIONS_PER_PASS,
    DEFAULT_MIN_TILE_FLOOR, DEFAULT_MIN_TILE_LEVEL_BONUS,
};
pub use providers::MemoryCacheStorage;
pub use storage::{BoxFuture, CacheStorage, StorageError};
pub use table::RequestTable;
