//! Whether a tile still deserves to be fetched.

use crate::coord::{Rect, TileAddress, ViewportSnapshot};

/// Deepest level worth fetching for `viewport`: one above the current
/// zoom, never below zero.
pub fn deepest_useful_level(viewport: &ViewportSnapshot) -> f64 {
    viewport.log2_zoom().ceil().max(0.0)
}

/// Screen rectangle `address` occupies for `viewport`.
pub fn tile_screen_rect(address: &TileAddress, viewport: &ViewportSnapshot) -> Rect {
    let scale = (viewport.log2_zoom() - f64::from(address.level)).exp2();
    let width = f64::from(viewport.tile_width) * scale;
    let height = f64::from(viewport.tile_height) * scale;
    Rect::new(
        viewport.image_left() + f64::from(address.x) * width,
        viewport.image_top() + f64::from(address.y) * height,
        width,
        height,
    )
}

/// True when `address` would show up on screen for `viewport`.
pub fn is_visible(address: &TileAddress, viewport: &ViewportSnapshot, max_level: u8) -> bool {
    if !viewport.is_laid_out() || address.level > max_level {
        return false;
    }
    if f64::from(address.level) > deepest_useful_level(viewport) {
        return false;
    }
    tile_screen_rect(address, viewport)
        .intersect(&viewport.screen_rect())
        .is_some()
}
