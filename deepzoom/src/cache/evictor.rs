//! Byte-budget eviction over the request table.
//!
//! The evictor walks the table from the least recently touched entry and
//! frees resolved entries that are not on screen. Entries that are in use or
//! still pending are moved to the most-recent position and skipped, so a
//! stale tile never pushes out a visible one.

use std::fmt;

use super::table::RequestTable;
use crate::coord::TileAddress;

// =============================================================================
// Constants
// =============================================================================

/// Real evictions allowed in one pass before yielding.
pub const DEFAULT_MAX_EVICTIONS_PER_PASS: usize = 16;

/// Visible-count threshold at which the geometric policy stops halving.
pub const DEFAULT_MIN_TILE_FLOOR: usize = 4;

/// Tiles protected per remaining level once the geometric policy stops halving.
pub const DEFAULT_MIN_TILE_LEVEL_BONUS: usize = 4;

// =============================================================================
// Minimum tile policy
// =============================================================================

/// How the protected tile count is derived from the visible tile count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinTilePolicy {
    /// Always protect exactly this many tiles.
    Fixed(usize),

    /// Protect a screenful at the current level plus a shrinking share of
    /// each coarser level.
    ///
    /// Starting from the visible count, adds the count and halves it for
    /// each level until it falls below `floor`, then adds `level_bonus` for
    /// every level still remaining, plus one.
    Geometric { floor: usize, level_bonus: usize },
}

impl Default for MinTilePolicy {
    fn default() -> Self {
        Self::Geometric {
            floor: DEFAULT_MIN_TILE_FLOOR,
            level_bonus: DEFAULT_MIN_TILE_LEVEL_BONUS,
        }
    }
}

impl MinTilePolicy {
    /// Protected tile count for a source with `level_count` pyramid levels
    /// when `visible_tiles` tiles fit on screen.
    pub fn min_tile_number(&self, visible_tiles: usize, level_count: usize) -> usize {
        match *self {
            MinTilePolicy::Fixed(n) => n,
            MinTilePolicy::Geometric { floor, level_bonus } => {
                let mut total = 0usize;
                let mut counter = visible_tiles;
                for remaining in (1..=level_count).rev() {
                    total = total.saturating_add(counter);
                    counter /= 2;
                    if counter < floor {
                        total = total.saturating_add(level_bonus.saturating_mul(remaining));
                        break;
                    }
                }
                total.saturating_add(1)
            }
        }
    }
}

impl fmt::Display for MinTilePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinTilePolicy::Fixed(n) => write!(f, "fixed:{}", n),
            MinTilePolicy::Geometric { floor, level_bonus } => {
                write!(f, "geometric:{}:{}", floor, level_bonus)
            }
        }
    }
}

impl std::str::FromStr for MinTilePolicy {
    type Err = String;

    /// Parses `fixed:N`, `geometric` or `geometric:FLOOR:BONUS`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let parts: Vec<&str> = s.split(':').collect();
        let number = |v: &str| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| format!("'{}' is not a non-negative integer", v))
        };
        match parts.as_slice() {
            ["fixed", n] => Ok(MinTilePolicy::Fixed(number(n)?)),
            ["geometric"] => Ok(MinTilePolicy::default()),
            ["geometric", floor, bonus] => Ok(MinTilePolicy::Geometric {
                floor: number(floor)?,
                level_bonus: number(bonus)?,
            }),
            _ => Err(format!(
                "unknown policy '{}' (expected fixed:N or geometric[:FLOOR:BONUS])",
                s
            )),
        }
    }
}

// =============================================================================
// Budget and report
// =============================================================================

/// Limits applied by one eviction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionBudget {
    pub max_cache_bytes: u64,
    pub min_tile_number: usize,
    /// `None` lets one pass run until the budget is met.
    pub max_evictions_per_pass: Option<usize>,
}

impl EvictionBudget {
    pub fn new(max_cache_bytes: u64, min_tile_number: usize) -> Self {
        Self {
            max_cache_bytes,
            min_tile_number,
            max_evictions_per_pass: Some(DEFAULT_MAX_EVICTIONS_PER_PASS),
        }
    }

    /// Removes the per-pass cap.
    pub fn unbounded(mut self) -> Self {
        self.max_evictions_per_pass = None;
        self
    }

    pub fn with_max_evictions(mut self, max: usize) -> Self {
        self.max_evictions_per_pass = Some(max);
        self
    }

    /// True when the table is over budget and above the protected count.
    #[inline]
    pub fn is_exceeded(&self, entry_count: usize, total_bytes: u64) -> bool {
        entry_count > self.min_tile_number && total_bytes > self.max_cache_bytes
    }
}

/// Outcome of one eviction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub evicted: Vec<TileAddress>,
    pub bytes_freed: u64,
    pub skipped_in_use: usize,
    pub skipped_pending: usize,
}

impl EvictionReport {
    pub fn evicted_count(&self) -> usize {
        self.evicted.len()
    }
}

impl fmt::Display for EvictionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "evicted {} tiles ({} bytes), skipped {} in use, {} pending",
            self.evicted.len(),
            self.bytes_freed,
            self.skipped_in_use,
            self.skipped_pending
        )
    }
}

// =============================================================================
// Eviction
// =============================================================================

impl RequestTable {
    /// Runs one eviction pass.
    ///
    /// Each entry is visited at most once, so a table made only of protected
    /// entries ends the pass instead of spinning.
    pub fn evict(&self, budget: &EvictionBudget) -> EvictionReport {
        let mut report = EvictionReport::default();
        let mut inner = self.inner.lock();
        let mut remaining_visits = inner.slots.len();

        while remaining_visits > 0
            && budget.is_exceeded(inner.slots.len(), inner.total_bytes)
            && budget
                .max_evictions_per_pass
                .map_or(true, |cap| report.evicted.len() < cap)
        {
            remaining_visits -= 1;
            let Some((_, address)) = inner.recency.first_key_value().map(|(s, a)| (*s, *a)) else {
                break;
            };

            let (in_use, pending, size) = match inner.slots.get(&address) {
                Some(slot) => (slot.entry.is_in_use(), slot.entry.is_pending(), slot.size),
                None => break,
            };

            if in_use || pending {
                if in_use {
                    report.skipped_in_use += 1;
                } else {
                    report.skipped_pending += 1;
                }
                inner.bump(&address);
                continue;
            }

            inner.take(&address);
            report.evicted.push(address);
            report.bytes_freed += size;
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use proptest::prelude::*;

    fn addr(x: u32) -> TileAddress {
        TileAddress::new(10, x, 0)
    }

    fn resolved_table(sizes: &[usize]) -> RequestTable {
        let table = RequestTable::new();
        for (i, size) in sizes.iter().enumerate() {
            table.touch_or_insert(addr(i as u32));
            table.update(&addr(i as u32), Some(Bytes::from(vec![0u8; *size])));
        }
        table
    }

    #[test]
    fn test_geometric_policy_matches_level_walk() {
        let policy = MinTilePolicy::default();
        // 20 -> 10 -> 5 -> 2 (< 4): 20 + 10 + 5 + 4 * 7 + 1
        assert_eq!(policy.min_tile_number(20, 10), 20 + 10 + 5 + 4 * 7 + 1);
    }

    #[test]
    fn test_geometric_policy_small_screen() {
        let policy = MinTilePolicy::default();
        // 6 -> 3 (< 4) at the first level: 6 + 4 * 5 + 1
        assert_eq!(policy.min_tile_number(6, 5), 6 + 4 * 5 + 1);
    }

    #[test]
    fn test_geometric_policy_runs_out_of_levels() {
        let policy = MinTilePolicy::default();
        // Two levels only: 64 + 32, never drops under the floor
        assert_eq!(policy.min_tile_number(64, 2), 64 + 32 + 1);
    }

    #[test]
    fn test_fixed_policy() {
        assert_eq!(MinTilePolicy::Fixed(7).min_tile_number(1000, 20), 7);
    }

    #[test]
    fn test_policy_parse_and_display() {
        assert_eq!(
            "fixed:12".parse::<MinTilePolicy>().unwrap(),
            MinTilePolicy::Fixed(12)
        );
        assert_eq!(
            "geometric".parse::<MinTilePolicy>().unwrap(),
            MinTilePolicy::default()
        );
        let policy: MinTilePolicy = "Geometric:8:2".parse().unwrap();
        assert_eq!(
            policy,
            MinTilePolicy::Geometric {
                floor: 8,
                level_bonus: 2
            }
        );
        assert_eq!(policy.to_string(), "geometric:8:2");
        assert!("lru".parse::<MinTilePolicy>().is_err());
        assert!("fixed:x".parse::<MinTilePolicy>().is_err());
    }

    #[test]
    fn test_nothing_evicted_under_budget() {
        let table = resolved_table(&[100, 100]);
        let report = table.evict(&EvictionBudget::new(1000, 0));
        assert!(report.evicted.is_empty());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_evicts_least_recent_first() {
        let table = resolved_table(&[100, 100, 100]);
        table.touch_or_insert(addr(0));

        let report = table.evict(&EvictionBudget::new(200, 0));
        assert_eq!(report.evicted, vec![addr(1)]);
        assert_eq!(table.total_bytes(), 200);
    }

    #[test]
    fn test_scenario_mixed_in_use_respects_budget_and_minimum() {
        // Nine unused 100-byte entries and one in-use entry.
        let table = resolved_table(&[100; 10]);
        let protected = table.get(&addr(0)).unwrap();
        protected.set_in_use(true);

        let budget = EvictionBudget::new(500, 2).unbounded();
        let report = table.evict(&budget);

        assert!(table.total_bytes() <= 500 || table.len() == 2);
        assert_eq!(report.evicted.len(), 5);
        assert!(!report.evicted.contains(&addr(0)));
        assert!(table.contains(&addr(0)));
        assert!(protected.is_resolved());
    }

    #[test]
    fn test_minimum_tile_number_stops_eviction() {
        let table = resolved_table(&[100; 10]);
        let report = table.evict(&EvictionBudget::new(0, 4).unbounded());
        assert_eq!(report.evicted.len(), 6);
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_per_pass_cap() {
        let table = resolved_table(&[100; 10]);
        let report = table.evict(&EvictionBudget::new(0, 0).with_max_evictions(3));
        assert_eq!(report.evicted.len(), 3);
        assert_eq!(table.len(), 7);
    }

    #[test]
    fn test_pending_entries_are_skipped() {
        let table = resolved_table(&[100, 100]);
        table.touch_or_insert(addr(99));
        // pending entry is now most recent; make it least recent
        table.touch_or_insert(addr(0));
        table.touch_or_insert(addr(1));

        let report = table.evict(&EvictionBudget::new(0, 0).unbounded());
        assert_eq!(report.skipped_pending, 1);
        assert!(table.contains(&addr(99)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_all_protected_terminates() {
        let table = resolved_table(&[100; 5]);
        for x in 0..5 {
            table.get(&addr(x)).unwrap().set_in_use(true);
        }
        let report = table.evict(&EvictionBudget::new(0, 0).unbounded());
        assert!(report.evicted.is_empty());
        assert_eq!(report.skipped_in_use, 5);
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn test_second_pass_is_idle_when_budget_met() {
        let table = resolved_table(&[100; 6]);
        let budget = EvictionBudget::new(300, 0);
        let first = table.evict(&budget);
        let second = table.evict(&budget);
        assert_eq!(first.evicted.len(), 3);
        assert!(second.evicted.is_empty());
    }

    proptest! {
        #[test]
        fn prop_in_use_entries_are_never_evicted(
            entries in prop::collection::vec((1usize..500, any::<bool>()), 1..40),
            max_bytes in 0u64..5000,
            min_tiles in 0usize..10,
        ) {
            let sizes: Vec<usize> = entries.iter().map(|(s, _)| *s).collect();
            let table = resolved_table(&sizes);
            for (i, (_, in_use)) in entries.iter().enumerate() {
                if *in_use {
                    table.get(&addr(i as u32)).unwrap().set_in_use(true);
                }
            }

            let report = table.evict(&EvictionBudget::new(max_bytes, min_tiles));

            for (i, (_, in_use)) in entries.iter().enumerate() {
                if *in_use {
                    prop_assert!(table.contains(&addr(i as u32)));
                    prop_assert!(!report.evicted.contains(&addr(i as u32)));
                }
            }
        }

        #[test]
        fn prop_unbounded_pass_converges(
            entries in prop::collection::vec((1usize..500, any::<bool>()), 1..40),
            max_bytes in 0u64..5000,
            min_tiles in 0usize..10,
        ) {
            let sizes: Vec<usize> = entries.iter().map(|(s, _)| *s).collect();
            let table = resolved_table(&sizes);
            for (i, (_, in_use)) in entries.iter().enumerate() {
                if *in_use {
                    table.get(&addr(i as u32)).unwrap().set_in_use(true);
                }
            }

            table.evict(&EvictionBudget::new(max_bytes, min_tiles).unbounded());

            let only_protected_left = table
                .recency_order()
                .iter()
                .all(|a| table.get(a).map_or(false, |e| e.is_in_use()));
            prop_assert!(
                table.total_bytes() <= max_bytes
                    || table.len() <= min_tiles
                    || only_protected_left
            );

            let sum: u64 = table
                .recency_order()
                .iter()
                .filter_map(|a| table.get(a))
                .map(|e| e.size_bytes())
                .sum();
            prop_assert_eq!(sum, table.total_bytes());
        }
    }
}
