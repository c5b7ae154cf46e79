use std::fmt;
use thiserror::Error;

/// Deepest pyramid level an address may use.
///
/// Keeps `1 << level` inside `u32` for tile indices.
pub const MAX_LEVEL: u8 = 30;

/// Errors that can occur when building tile addresses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordError {
    #[error("Invalid level: {0} (must be at most {max})", max = MAX_LEVEL)]
    InvalidLevel(u8),

    #[error("Tile index ({x}, {y}) outside the {size}x{size} grid at level {level}")]
    OutOfGrid { level: u8, x: u32, y: u32, size: u64 },
}

/// A tile in the image pyramid.
///
/// Level 0 is the coarsest level and holds a single tile; each level below
/// doubles the grid on both axes. Equality and hashing are structural, which
/// makes the address usable directly as a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileAddress {
    pub level: u8,
    pub x: u32,
    pub y: u32,
}

/// Position of a tile relative to one of its ancestors.
///
/// `levels` is how many levels separate the two; `x` and `y` index the
/// descendant inside the ancestor's `2^levels` sub-grid. A renderer scales the
/// ancestor bitmap by `2^levels` and shifts it by `(x, y)` tile widths to fill
/// the descendant's screen slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileOffset {
    pub levels: u8,
    pub x: u32,
    pub y: u32,
}

impl TileAddress {
    /// Creates an address without range checks.
    pub const fn new(level: u8, x: u32, y: u32) -> Self {
        Self { level, x, y }
    }

    /// Creates an address, rejecting levels past [`MAX_LEVEL`] and indices
    /// outside the level's grid.
    pub fn try_new(level: u8, x: u32, y: u32) -> Result<Self, CoordError> {
        if level > MAX_LEVEL {
            return Err(CoordError::InvalidLevel(level));
        }
        let size = Self::grid_size(level);
        if u64::from(x) >= size || u64::from(y) >= size {
            return Err(CoordError::OutOfGrid { level, x, y, size });
        }
        Ok(Self { level, x, y })
    }

    /// Number of tiles along one side of the grid at `level`.
    #[inline]
    pub fn grid_size(level: u8) -> u64 {
        1u64 << level.min(MAX_LEVEL)
    }

    /// Returns the ancestor covering this tile at a coarser `level`.
    ///
    /// Asking for the tile's own level returns the tile itself; asking for a
    /// deeper level returns `None`.
    #[inline]
    pub fn ancestor_at(&self, level: u8) -> Option<Self> {
        if level > self.level {
            return None;
        }
        let shift = self.level - level;
        Some(Self {
            level,
            x: self.x >> shift,
            y: self.y >> shift,
        })
    }

    /// Returns the direct parent, or `None` at level 0.
    #[inline]
    pub fn parent(&self) -> Option<Self> {
        self.level.checked_sub(1).and_then(|l| self.ancestor_at(l))
    }

    /// Iterates the ancestors from the parent up to level 0.
    pub fn ancestors(&self) -> impl Iterator<Item = TileAddress> {
        let tile = *self;
        (0..tile.level).rev().filter_map(move |l| tile.ancestor_at(l))
    }

    /// Position of this tile inside `ancestor`, or `None` when `ancestor`
    /// does not cover it.
    pub fn offset_within(&self, ancestor: &TileAddress) -> Option<TileOffset> {
        if self.ancestor_at(ancestor.level)? != *ancestor {
            return None;
        }
        let levels = self.level - ancestor.level;
        Some(TileOffset {
            levels,
            x: self.x - (ancestor.x << levels),
            y: self.y - (ancestor.y << levels),
        })
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}/{}/{}", self.level, self.x, self.y)
    }
}
