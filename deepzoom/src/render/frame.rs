//! Per-frame in-use bookkeeping.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use super::TileResolver;
use crate::cache::TileEntry;
use crate::coord::TileAddress;
use crate::source::ResolvedTile;

/// Counts from one finished frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Entries drawn this frame.
    pub referenced: usize,
    /// Entries drawn last frame but not this one.
    pub released: usize,
}

/// Tracks which entries the renderer draws, frame to frame.
///
/// Entries resolved during a frame are marked in use, which protects them
/// from eviction. At the end of the frame, entries that were drawn in the
/// previous frame but not this one lose that protection and their decoded
/// bitmap; their bytes stay cached.
///
/// ```ignore
/// tracker.begin_frame();
/// for address in screen_tiles {
///     if let Some(tile) = tracker.resolve(&source, address) {
///         draw(tile.bitmap, tile.offset);
///     }
/// }
/// tracker.end_frame();
/// ```
#[derive(Default)]
pub struct FrameTracker {
    previous: HashMap<TileAddress, Arc<TileEntry>>,
    current: HashMap<TileAddress, Arc<TileEntry>>,
}

impl FrameTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_frame(&mut self) {
        self.current.clear();
    }

    /// Resolves one screen tile and records the entry it landed on.
    pub fn resolve(
        &mut self,
        resolver: &impl TileResolver,
        address: TileAddress,
    ) -> Option<ResolvedTile> {
        let resolved = resolver.resolve(address)?;
        self.current
            .insert(resolved.entry.address(), Arc::clone(&resolved.entry));
        Some(resolved)
    }

    pub fn end_frame(&mut self) -> FrameStats {
        let mut released = 0;
        for (address, entry) in self.previous.drain() {
            if !self.current.contains_key(&address) {
                entry.set_in_use(false);
                entry.clear_bitmap();
                released += 1;
            }
        }
        self.previous = mem::take(&mut self.current);
        FrameStats {
            referenced: self.previous.len(),
            released,
        }
    }

    /// Entries drawn in the last finished frame.
    pub fn referenced(&self) -> usize {
        self.previous.len()
    }
}
