//! Tile image decoding.
//!
//! Decoding correctness is delegated to the `image` crate; the cache only
//! needs "a displayable bitmap, or a remembered failure".

use thiserror::Error;

/// Errors that can occur while decoding tile bytes.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to decode tile image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Tile has no image data")]
    Empty,
}

/// Decoded RGBA8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Bitmap {
    /// Wraps raw RGBA8 pixels, row-major.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Memory held by the pixel buffer.
    pub fn size_bytes(&self) -> usize {
        self.pixels.len()
    }
}

/// Turns tile bytes into a bitmap.
pub trait TileDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Bitmap, DecodeError>;
}

/// Decoder for any format the `image` crate recognises.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder;

impl TileDecoder for ImageDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Bitmap, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Bitmap::new(width, height, rgba.into_raw()))
    }
}
