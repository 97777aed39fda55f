//! Solid-color placeholder tiles.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use image::{DynamicImage, Rgba, RgbaImage};
use tokio::sync::RwLock;

use super::codec::{offload, ImageFormat, RasterCodec};
use crate::error::CodecError;
use crate::geometry::TILE_SIZE;

const WHITE: [u8; 3] = [0xff, 0xff, 0xff];

/// Normalized background color of a placeholder tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlankColor {
    Transparent,
    Rgb([u8; 3]),
}

impl BlankColor {
    /// Parse a hex color (`0xRRGGBB`, `RRGGBB`, `RGB`, case-insensitive).
    ///
    /// Anything malformed becomes white.
    pub fn parse(input: &str) -> Self {
        let lower = input.trim().to_lowercase();
        let hex = lower.strip_prefix("0x").unwrap_or(&lower);
        let hex = hex.strip_prefix('#').unwrap_or(hex);

        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return BlankColor::Rgb(WHITE);
        }

        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return BlankColor::Rgb(WHITE),
        };

        let mut rgb = [0u8; 3];
        for (i, channel) in rgb.iter_mut().enumerate() {
            match u8::from_str_radix(&expanded[i * 2..i * 2 + 2], 16) {
                Ok(v) => *channel = v,
                Err(_) => return BlankColor::Rgb(WHITE),
            }
        }
        BlankColor::Rgb(rgb)
    }

    pub fn white() -> Self {
        BlankColor::Rgb(WHITE)
    }

    fn rgba(&self) -> [u8; 4] {
        match self {
            BlankColor::Transparent => [0, 0, 0, 0],
            BlankColor::Rgb([r, g, b]) => [*r, *g, *b, 0xff],
        }
    }
}

impl Default for BlankColor {
    fn default() -> Self {
        BlankColor::white()
    }
}

impl fmt::Display for BlankColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlankColor::Transparent => f.write_str("transparent"),
            BlankColor::Rgb(rgb) => write!(f, "{}", hex::encode(rgb)),
        }
    }
}

/// What to draw where a tile is missing: a background in an output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fill {
    pub color: BlankColor,
    pub format: ImageFormat,
}

impl Fill {
    pub fn new(color: BlankColor, format: ImageFormat) -> Self {
        Self { color, format }
    }

    /// Starting RGBA of a map canvas. Opaque formats start from the
    /// background; the rest start transparent.
    pub fn canvas_rgba(&self) -> [u8; 4] {
        if self.format.is_opaque() {
            self.color.rgba()
        } else {
            [0, 0, 0, 0]
        }
    }
}

/// Renders and memoizes 256x256 placeholder tiles per (color, format).
pub struct BlankTileProvider {
    codec: Arc<dyn RasterCodec>,
    tiles: RwLock<HashMap<(BlankColor, ImageFormat), Bytes>>,
}

impl BlankTileProvider {
    pub fn new(codec: Arc<dyn RasterCodec>) -> Self {
        Self {
            codec,
            tiles: RwLock::new(HashMap::new()),
        }
    }

    /// Encoded blank tile for `color` in `format`.
    pub async fn blank(&self, color: BlankColor, format: ImageFormat) -> Result<Bytes, CodecError> {
        if let Some(tile) = self.tiles.read().await.get(&(color, format)) {
            return Ok(tile.clone());
        }

        let codec = self.codec.clone();
        let tile = offload(move || {
            let canvas = RgbaImage::from_pixel(TILE_SIZE, TILE_SIZE, Rgba(color.rgba()));
            codec.encode(&DynamicImage::ImageRgba8(canvas), format)
        })
        .await?;

        // Racing renders produce identical bytes; keep whichever landed first
        let mut tiles = self.tiles.write().await;
        Ok(tiles.entry((color, format)).or_insert(tile).clone())
    }
}
