//! Viewport snapshots and screen-space rectangles.
//!
//! Logical coordinates are normalized by the pyramid width: the whole image
//! spans `[0, 1)` horizontally, and `origin_y` uses the same unit so square
//! pixels stay square.

/// Default tile edge in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Axis-aligned rectangle in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// True when the rectangle covers no area.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Overlap of two rectangles, or `None` when they share no area.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        let rect = Rect::new(x, y, right - x, bottom - y);
        (!rect.is_empty()).then_some(rect)
    }
}

/// Immutable description of what is on screen.
///
/// A new snapshot fully replaces the previous one; nothing is merged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportSnapshot {
    /// Logical x of the visible top-left corner.
    pub origin_x: f64,
    /// Logical y of the visible top-left corner.
    pub origin_y: f64,
    /// Logical width of the visible window.
    pub viewport_width: f64,
    /// Control width in pixels.
    pub actual_width: f64,
    /// Control height in pixels.
    pub actual_height: f64,
    pub tile_width: u32,
    pub tile_height: u32,
}

impl ViewportSnapshot {
    /// Creates a snapshot with the default 256px tile size.
    pub fn new(
        origin_x: f64,
        origin_y: f64,
        viewport_width: f64,
        actual_width: f64,
        actual_height: f64,
    ) -> Self {
        Self {
            origin_x,
            origin_y,
            viewport_width,
            actual_width,
            actual_height,
            tile_width: DEFAULT_TILE_SIZE,
            tile_height: DEFAULT_TILE_SIZE,
        }
    }

    /// Replaces the tile size.
    pub fn with_tile_size(mut self, tile_width: u32, tile_height: u32) -> Self {
        self.tile_width = tile_width;
        self.tile_height = tile_height;
        self
    }

    /// False until the control has a usable size and a logical width.
    pub fn is_laid_out(&self) -> bool {
        self.viewport_width.is_finite()
            && self.viewport_width > 0.0
            && self.actual_width.is_finite()
            && self.actual_width > 0.0
            && self.actual_height.is_finite()
            && self.actual_height > 0.0
            && self.tile_width > 0
            && self.tile_height > 0
    }

    /// Number of level-0 tile widths that fit across the control.
    #[inline]
    pub fn zoom(&self) -> f64 {
        self.actual_width / f64::from(self.tile_width) / self.viewport_width
    }

    #[inline]
    pub fn log2_zoom(&self) -> f64 {
        self.zoom().log2()
    }

    /// Full pyramid width in screen pixels at this zoom.
    #[inline]
    pub fn image_width(&self) -> f64 {
        self.actual_width / self.viewport_width
    }

    /// Full pyramid height in screen pixels at this zoom.
    #[inline]
    pub fn image_height(&self) -> f64 {
        self.image_width() * f64::from(self.tile_height) / f64::from(self.tile_width)
    }

    /// Screen x of the pyramid's left edge.
    #[inline]
    pub fn image_left(&self) -> f64 {
        -self.origin_x * self.image_width()
    }

    /// Screen y of the pyramid's top edge.
    #[inline]
    pub fn image_top(&self) -> f64 {
        -self.origin_y * self.image_width()
    }

    /// The pyramid's full extent in screen pixels.
    pub fn image_rect(&self) -> Rect {
        Rect::new(
            self.image_left(),
            self.image_top(),
            self.image_width(),
            self.image_height(),
        )
    }

    /// The control's own rectangle.
    pub fn screen_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.actual_width, self.actual_height)
    }

    /// Part of the pyramid that is on screen, relative to the pyramid's
    /// top-left corner. `None` when nothing of the image is visible.
    pub fn visible_image_rect(&self) -> Option<Rect> {
        let visible = self.screen_rect().intersect(&self.image_rect())?;
        Some(Rect::new(
            visible.x - self.image_left(),
            visible.y - self.image_top(),
            visible.width,
            visible.height,
        ))
    }

    /// How many tiles can be partially visible at once for this control
    /// size, counting one extra column and row for partial tiles.
    pub fn visible_tile_capacity(&self) -> usize {
        if self.tile_width == 0 || self.tile_height == 0 {
            return 0;
        }
        let columns = (self.actual_width.max(0.0) / f64::from(self.tile_width)).ceil() as usize;
        let rows = (self.actual_height.max(0.0) / f64::from(self.tile_height)).ceil() as usize;
        (columns + 1) * (rows + 1)
    }

    /// True when the control's pixel size differs from `other`.
    pub fn size_differs(&self, other: &ViewportSnapshot) -> bool {
        self.actual_width != other.actual_width || self.actual_height != other.actual_height
    }
}
