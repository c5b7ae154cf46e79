//! Level selection and tile bounds for a viewport.

use crate::coord::{TileAddress, ViewportSnapshot};

/// Levels fetched ahead of the background tier, counting the current one.
pub const PRIMARY_TIER_DEPTH: u8 = 3;

/// Inclusive tile index rectangle at one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileBounds {
    pub level: u8,
    pub x_start: u32,
    pub x_end: u32,
    pub y_start: u32,
    pub y_end: u32,
}

impl TileBounds {
    /// The same area at a coarser level.
    pub fn at_level(&self, level: u8) -> TileBounds {
        let shift = self.level.saturating_sub(level);
        TileBounds {
            level: level.min(self.level),
            x_start: self.x_start >> shift,
            x_end: self.x_end >> shift,
            y_start: self.y_start >> shift,
            y_end: self.y_end >> shift,
        }
    }

    pub fn tile_count(&self) -> usize {
        (self.x_end - self.x_start + 1) as usize * (self.y_end - self.y_start + 1) as usize
    }

    pub fn contains(&self, address: &TileAddress) -> bool {
        address.level == self.level
            && (self.x_start..=self.x_end).contains(&address.x)
            && (self.y_start..=self.y_end).contains(&address.y)
    }

    /// Addresses row by row, left to right.
    pub fn addresses(&self) -> impl Iterator<Item = TileAddress> {
        let bounds = *self;
        (bounds.y_start..=bounds.y_end).flat_map(move |y| {
            (bounds.x_start..=bounds.x_end).map(move |x| TileAddress::new(bounds.level, x, y))
        })
    }
}

/// What one scheduling pass asks for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelPlan {
    /// Level whose tiles are closest to one screen pixel per tile pixel.
    pub current_level: u8,
    /// On-screen size of a current-level tile relative to its nominal size.
    pub scale_factor: f64,
    pub bounds: TileBounds,
}

impl LevelPlan {
    /// Current level and up to two coarser levels, coarse first.
    pub fn primary_levels(&self) -> impl Iterator<Item = u8> {
        let top = self.current_level;
        top.saturating_sub(PRIMARY_TIER_DEPTH - 1)..=top
    }

    /// Remaining coarser levels, from the finest down to level 0.
    pub fn background_levels(&self) -> impl Iterator<Item = u8> {
        let end = self.current_level.checked_sub(PRIMARY_TIER_DEPTH);
        end.into_iter().flat_map(|end| (0..=end).rev())
    }

    /// Primary tier addresses in request order.
    pub fn primary_addresses(&self) -> impl Iterator<Item = TileAddress> + '_ {
        self.primary_levels()
            .flat_map(move |level| self.bounds.at_level(level).addresses())
    }

    /// Background tier addresses in request order.
    pub fn background_addresses(&self) -> impl Iterator<Item = TileAddress> + '_ {
        self.background_levels()
            .flat_map(move |level| self.bounds.at_level(level).addresses())
    }
}

/// Level whose tiles best match the viewport's zoom, clamped to the pyramid.
pub fn current_level(viewport: &ViewportSnapshot, max_level: u8) -> u8 {
    let level = viewport.log2_zoom().round();
    if level.is_nan() || level <= 0.0 {
        0
    } else {
        (level.min(f64::from(max_level))) as u8
    }
}

/// Works out the level and tile bounds for `viewport`.
///
/// Returns `None` when the viewport is not laid out or the pyramid is
/// entirely off screen.
pub fn plan(viewport: &ViewportSnapshot, max_level: u8) -> Option<LevelPlan> {
    if !viewport.is_laid_out() {
        return None;
    }
    let level = current_level(viewport, max_level);
    let scale_factor = (viewport.log2_zoom() - f64::from(level)).exp2();
    let visible = viewport.visible_image_rect()?;

    let tile_w = f64::from(viewport.tile_width) * scale_factor;
    let tile_h = f64::from(viewport.tile_height) * scale_factor;
    let last = TileAddress::grid_size(level).saturating_sub(1) as f64;

    let start = |edge: f64, size: f64| (edge / size).floor().clamp(0.0, last) as u32;
    let end = |far: f64, size: f64| ((far / size).ceil() - 1.0).clamp(0.0, last) as u32;

    let bounds = TileBounds {
        level,
        x_start: start(visible.x, tile_w),
        x_end: end(visible.right(), tile_w),
        y_start: start(visible.y, tile_h),
        y_end: end(visible.bottom(), tile_h),
    };
    if bounds.x_end < bounds.x_start || bounds.y_end < bounds.y_start {
        return None;
    }

    Some(LevelPlan {
        current_level: level,
        scale_factor,
        bounds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport(origin_x: f64, origin_y: f64, width: f64, aw: f64, ah: f64) -> ViewportSnapshot {
        ViewportSnapshot::new(origin_x, origin_y, width, aw, ah)
    }

    #[test]
    fn test_two_by_two_at_level_one() {
        let plan = plan(&viewport(0.0, 0.0, 1.0, 512.0, 512.0), 10).unwrap();
        assert_eq!(plan.current_level, 1);
        assert!((plan.scale_factor - 1.0).abs() < 1e-9);
        assert_eq!(
            plan.bounds,
            TileBounds {
                level: 1,
                x_start: 0,
                x_end: 1,
                y_start: 0,
                y_end: 1
            }
        );
        let levels: Vec<u8> = plan.primary_levels().collect();
        assert_eq!(levels, vec![0, 1]);
        assert_eq!(plan.background_levels().count(), 0);
    }

    #[test]
    fn test_level_is_rounded_and_clamped() {
        // zoom = 2^2.6 rounds to 3
        let zoom = 2f64.powf(2.6);
        let vp = viewport(0.0, 0.0, 1.0, 256.0 * zoom, 600.0);
        assert_eq!(current_level(&vp, 10), 3);
        assert_eq!(current_level(&vp, 2), 2);

        // zoomed far out
        let vp = viewport(0.0, 0.0, 8.0, 256.0, 256.0);
        assert_eq!(current_level(&vp, 10), 0);
    }

    #[test]
    fn test_zoomed_in_window() {
        // zoom = 1024/256/0.25 = 16 -> level 4, window covers x in [0.5, 0.75)
        let vp = viewport(0.5, 0.25, 0.25, 1024.0, 512.0);
        let plan = plan(&vp, 18).unwrap();
        assert_eq!(plan.current_level, 4);
        assert_eq!(plan.bounds.x_start, 8);
        assert_eq!(plan.bounds.x_end, 11);
        assert_eq!(plan.bounds.y_start, 4);
        assert_eq!(plan.bounds.y_end, 5);
        assert_eq!(plan.bounds.tile_count(), 8);
    }

    #[test]
    fn test_tiers_split_levels() {
        let vp = viewport(0.0, 0.0, 1.0 / 32.0, 256.0, 256.0);
        let plan = plan(&vp, 18).unwrap();
        assert_eq!(plan.current_level, 5);
        assert_eq!(plan.primary_levels().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(plan.background_levels().collect::<Vec<_>>(), vec![2, 1, 0]);
    }

    #[test]
    fn test_coarser_bounds_shift() {
        let bounds = TileBounds {
            level: 4,
            x_start: 8,
            x_end: 11,
            y_start: 4,
            y_end: 5,
        };
        let coarse = bounds.at_level(2);
        assert_eq!(
            coarse,
            TileBounds {
                level: 2,
                x_start: 2,
                x_end: 2,
                y_start: 1,
                y_end: 1
            }
        );
        assert!(coarse.contains(&TileAddress::new(2, 2, 1)));
        assert!(!coarse.contains(&TileAddress::new(3, 2, 1)));
    }

    #[test]
    fn test_primary_addresses_are_coarse_first() {
        let plan = plan(&viewport(0.0, 0.0, 1.0, 512.0, 512.0), 10).unwrap();
        let addresses: Vec<_> = plan.primary_addresses().collect();
        assert_eq!(addresses[0], TileAddress::new(0, 0, 0));
        assert_eq!(addresses.len(), 5);
        assert!(addresses[1..].iter().all(|a| a.level == 1));
    }

    #[test]
    fn test_not_laid_out() {
        assert!(plan(&viewport(0.0, 0.0, 0.0, 512.0, 512.0), 10).is_none());
        assert!(plan(&viewport(0.0, 0.0, 1.0, 0.0, 512.0), 10).is_none());
    }

    #[test]
    fn test_pyramid_off_screen() {
        assert!(plan(&viewport(2.0, 0.0, 1.0, 512.0, 512.0), 10).is_none());
    }
}
