//! Cache storage implementations.
//!
//! # Available Storages
//!
//! - [`MemoryCacheStorage`]: In-memory store using moka, honouring per-entry
//!   expiry dates
//!
//! Disk-backed storage is left to embedders; anything implementing
//! [`CacheStorage`](super::CacheStorage) can be handed to a tile source.

mod memory;

pub use memory::MemoryCacheStorage;
