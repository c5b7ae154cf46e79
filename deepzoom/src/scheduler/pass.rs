//! One scheduling pass over the request table.

use std::fmt;

use super::plan::plan;
use super::validator::is_visible;
use crate::cache::RequestTable;
use crate::coord::{TileAddress, ViewportSnapshot};

/// What a pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub current_level: Option<u8>,
    /// Addresses inserted and handed to the fetch path.
    pub launched: usize,
    /// Addresses already present whose recency was refreshed.
    pub bumped: usize,
    /// Pending addresses removed because they left the viewport.
    pub dropped: usize,
    /// A newer viewport arrived during the background tier.
    pub superseded: bool,
    pub aborted: bool,
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.current_level {
            Some(level) => write!(f, "level {}: ", level)?,
            None => write!(f, "no visible tiles: ")?,
        }
        write!(
            f,
            "{} launched, {} bumped, {} dropped",
            self.launched, self.bumped, self.dropped
        )?;
        if self.superseded {
            write!(f, " (superseded)")?;
        }
        if self.aborted {
            write!(f, " (aborted)")?;
        }
        Ok(())
    }
}

/// Callbacks a pass drives.
pub trait PassSink {
    /// A newer viewport is waiting.
    fn superseded(&self) -> bool;
    /// The source is stopping.
    fn aborted(&self) -> bool;
    /// A pending address was removed from the table.
    fn dropped(&mut self, address: TileAddress);
    /// A new address was inserted and must be fetched.
    fn launch(&mut self, address: TileAddress);
}

/// Requests every tile `viewport` needs.
///
/// Pending entries that are no longer visible are removed first. The
/// primary tier (current level and the two above it, coarse first) always
/// completes; the background tier stops after the next launch once a newer
/// viewport is waiting.
pub fn run_pass(
    table: &RequestTable,
    viewport: &ViewportSnapshot,
    max_level: u8,
    sink: &mut impl PassSink,
) -> PassReport {
    let mut report = PassReport::default();
    if sink.aborted() {
        report.aborted = true;
        return report;
    }

    for address in table.pending_addresses() {
        if !is_visible(&address, viewport, max_level) && table.remove(&address).is_some() {
            sink.dropped(address);
            report.dropped += 1;
        }
    }

    let Some(plan) = plan(viewport, max_level) else {
        return report;
    };
    report.current_level = Some(plan.current_level);

    for address in plan.primary_addresses() {
        if sink.aborted() {
            report.aborted = true;
            return report;
        }
        if table.touch_or_insert(address) {
            sink.launch(address);
            report.launched += 1;
        } else {
            report.bumped += 1;
        }
    }

    for address in plan.background_addresses() {
        if sink.aborted() {
            report.aborted = true;
            return report;
        }
        if table.touch_or_insert(address) {
            sink.launch(address);
            report.launched += 1;
            if sink.superseded() {
                report.superseded = true;
                return report;
            }
        } else {
            report.bumped += 1;
        }
    }

    report
}
