//! Point-in-time telemetry snapshot.

use std::fmt;
use std::time::Duration;

/// Immutable copy of a source's fetch counters.
#[derive(Clone, Debug, Default)]
pub struct FetchSnapshot {
    pub uptime: Duration,
    /// Full scheduling passes run
    pub passes: u64,
    /// Addresses newly inserted into the request table
    pub tiles_requested: u64,
    pub storage_hits: u64,
    pub storage_misses: u64,
    pub storage_writes: u64,
    /// HTTP attempts, including retries
    pub downloads_started: u64,
    pub downloads_completed: u64,
    pub bytes_downloaded: u64,
    pub retries: u64,
    /// 404 responses
    pub not_found: u64,
    /// 401 responses
    pub auth_challenges: u64,
    /// Tiles given up on
    pub failed: u64,
    /// Downloads withdrawn before finishing
    pub cancelled: u64,
    /// Tiles dropped because they left the viewport
    pub out_of_view: u64,
    /// Addresses the provider had nothing for
    pub empty_tiles: u64,
    pub evictions: u64,
    pub bytes_evicted: u64,
    pub bytes_per_second: f64,
}

impl FetchSnapshot {
    /// Storage hit rate (0.0 - 1.0).
    pub fn storage_hit_rate(&self) -> f64 {
        let total = self.storage_hits + self.storage_misses;
        if total == 0 {
            0.0
        } else {
            self.storage_hits as f64 / total as f64
        }
    }
}

impl fmt::Display for FetchSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Uptime:          {:.1}s", self.uptime.as_secs_f64())?;
        writeln!(f, "Passes:          {}", self.passes)?;
        writeln!(f, "Tiles requested: {}", self.tiles_requested)?;
        writeln!(
            f,
            "Storage:         {} hits, {} misses ({:.0}%), {} writes",
            self.storage_hits,
            self.storage_misses,
            self.storage_hit_rate() * 100.0,
            self.storage_writes
        )?;
        writeln!(
            f,
            "Downloads:       {} completed / {} attempts, {} bytes ({:.1} KB/s)",
            self.downloads_completed,
            self.downloads_started,
            self.bytes_downloaded,
            self.bytes_per_second / 1024.0
        )?;
        writeln!(
            f,
            "Failures:        {} retries, {} not found, {} auth challenges, {} failed",
            self.retries, self.not_found, self.auth_challenges, self.failed
        )?;
        writeln!(
            f,
            "Dropped:         {} out of view, {} cancelled, {} empty",
            self.out_of_view, self.cancelled, self.empty_tiles
        )?;
        write!(
            f,
            "Evicted:         {} tiles, {} bytes",
            self.evictions, self.bytes_evicted
        )
    }
}
