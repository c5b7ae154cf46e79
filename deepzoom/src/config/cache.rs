//! Tile cache configuration.

use crate::cache::{MinTilePolicy, DEFAULT_MAX_EVICTIONS_PER_PASS};

/// Default byte budget of one source's request table (10 MiB).
pub const DEFAULT_MAX_CACHE_BYTES: u64 = 10 * 1024 * 1024;

/// Default capacity of the in-memory cache storage (64 MiB).
pub const DEFAULT_STORAGE_SIZE: u64 = 64 * 1024 * 1024;

/// Budget and protection settings for one source's tile cache.
///
/// # Example
///
/// ```
/// use deepzoom::cache::MinTilePolicy;
/// use deepzoom::config::TileCacheConfig;
///
/// let config = TileCacheConfig::new()
///     .with_max_cache_bytes(4 * 1024 * 1024)
///     .with_min_tile_policy(MinTilePolicy::Fixed(32));
/// assert_eq!(config.min_tile_policy(), MinTilePolicy::Fixed(32));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCacheConfig {
    max_cache_bytes: u64,
    min_tile_policy: MinTilePolicy,
    max_evictions_per_pass: usize,
    storage_enabled: bool,
}

impl TileCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_cache_bytes(mut self, bytes: u64) -> Self {
        self.max_cache_bytes = bytes;
        self
    }

    pub fn with_min_tile_policy(mut self, policy: MinTilePolicy) -> Self {
        self.min_tile_policy = policy;
        self
    }

    /// Cap on real evictions per pass. Zero removes the cap.
    pub fn with_max_evictions_per_pass(mut self, max: usize) -> Self {
        self.max_evictions_per_pass = max;
        self
    }

    /// Whether tiles are read from and written to cache storage.
    pub fn with_storage_enabled(mut self, enabled: bool) -> Self {
        self.storage_enabled = enabled;
        self
    }

    pub fn max_cache_bytes(&self) -> u64 {
        self.max_cache_bytes
    }

    pub fn min_tile_policy(&self) -> MinTilePolicy {
        self.min_tile_policy
    }

    /// `None` when uncapped.
    pub fn max_evictions_per_pass(&self) -> Option<usize> {
        (self.max_evictions_per_pass > 0).then_some(self.max_evictions_per_pass)
    }

    pub fn storage_enabled(&self) -> bool {
        self.storage_enabled
    }
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self {
            max_cache_bytes: DEFAULT_MAX_CACHE_BYTES,
            min_tile_policy: MinTilePolicy::default(),
            max_evictions_per_pass: DEFAULT_MAX_EVICTIONS_PER_PASS,
            storage_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TileCacheConfig::default();
        assert_eq!(config.max_cache_bytes(), DEFAULT_MAX_CACHE_BYTES);
        assert_eq!(config.min_tile_policy(), MinTilePolicy::default());
        assert_eq!(
            config.max_evictions_per_pass(),
            Some(DEFAULT_MAX_EVICTIONS_PER_PASS)
        );
        assert!(config.storage_enabled());
    }

    #[test]
    fn test_zero_eviction_cap_means_uncapped() {
        let config = TileCacheConfig::new().with_max_evictions_per_pass(0);
        assert_eq!(config.max_evictions_per_pass(), None);
    }
}
