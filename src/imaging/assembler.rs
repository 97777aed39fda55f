//! Tile grid assembler.
//!
//! Stitches the tiles covering a bounding box at one zoom into a single RGBA
//! canvas whose pixels line up exactly with the box.
//!
//! ```text
//!   tile columns c0..c1, rows r0..r1 at tile size 256·scale
//!   ┌──────┬──────┬──────┐
//!   │      │  ┌───┼────┐ │   window (x0, y0, width, height) in pyramid pixels
//!   ├──────┼──┼───┼────┼─┤
//!   │      │  └───┼────┘ │   each tile is drawn at (c·ts - x0, r·ts - y0)
//!   └──────┴──────┴──────┘   and clipped by the canvas
//! ```
//!
//! Columns wrap around the antimeridian; rows above or below the pyramid are
//! left empty. Tiles are fetched with bounded concurrency.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use image::imageops;
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::codec::{offload, RasterCodec};
use crate::error::{AssemblyError, CodecError, FetchError};
use crate::geometry::{pixel_scaled, GeoBBox, TILE_SIZE};

/// Default maximum canvas area in pixels.
pub const DEFAULT_MAX_PIXEL_AREA: u64 = 4096 * 4096;

/// Default number of tiles fetched at once.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 8;

/// What to assemble.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridRequest {
    pub bbox: GeoBBox,
    pub zoom: u8,
    /// Output pixels per source pixel (1 = 256px tiles)
    pub scale: u32,
    /// RGBA the canvas starts as; shows through where no tile is drawn
    pub background: [u8; 4],
}

/// Pixel window of a bbox in the scaled pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub x0: i64,
    pub y0: i64,
    pub width: u64,
    pub height: u64,
    pub tile_size: u32,
}

impl PixelWindow {
    pub fn of(req: &GridRequest) -> Self {
        let tile_size = TILE_SIZE * req.scale.max(1);
        let (min_x, max_y) = pixel_scaled(req.bbox.min_lon, req.bbox.min_lat, req.zoom, tile_size);
        let (max_x, min_y) = pixel_scaled(req.bbox.max_lon, req.bbox.max_lat, req.zoom, tile_size);

        let x0 = min_x as i64;
        let y0 = min_y as i64;
        Self {
            x0,
            y0,
            width: (max_x as i64 - x0).max(1) as u64,
            height: (max_y as i64 - y0).max(1) as u64,
            tile_size,
        }
    }

    pub fn area(&self) -> u64 {
        self.width.saturating_mul(self.height)
    }

    /// Every (column, row) touching the window; columns are not yet wrapped.
    fn tiles(&self, zoom: u8) -> Vec<(i64, i64)> {
        let ts = self.tile_size as i64;
        let rows_in_pyramid = 1i64 << zoom;

        let c0 = self.x0.div_euclid(ts);
        let c1 = (self.x0 + self.width as i64 - 1).div_euclid(ts);
        let r0 = self.y0.div_euclid(ts).max(0);
        let r1 = (self.y0 + self.height as i64 - 1)
            .div_euclid(ts)
            .min(rows_in_pyramid - 1);

        let mut tiles = Vec::new();
        for row in r0..=r1 {
            for col in c0..=c1 {
                tiles.push((col, row));
            }
        }
        tiles
    }
}

/// Builds map canvases out of tiles.
#[derive(Clone)]
pub struct TileGridAssembler {
    codec: Arc<dyn RasterCodec>,
    max_area: u64,
    concurrency: usize,
}

impl TileGridAssembler {
    pub fn new(codec: Arc<dyn RasterCodec>, max_area: u64, concurrency: usize) -> Self {
        Self {
            codec,
            max_area,
            concurrency: concurrency.max(1),
        }
    }

    pub fn max_area(&self) -> u64 {
        self.max_area
    }

    /// Assemble the canvas for `req`, fetching tiles through `fetch`.
    ///
    /// `fetch(zoom, col, row)` receives wrapped, in-pyramid addresses. A
    /// failed tile leaves its area empty; a cancelled one aborts assembly.
    pub async fn assemble<F, Fut>(
        &self,
        req: &GridRequest,
        fetch: F,
        cancel: &CancellationToken,
    ) -> Result<DynamicImage, AssemblyError>
    where
        F: Fn(u8, u32, u32) -> Fut,
        Fut: Future<Output = Result<Bytes, FetchError>>,
    {
        let window = PixelWindow::of(req);
        if window.area() > self.max_area {
            return Err(AssemblyError::TooLarge {
                width: window.width,
                height: window.height,
                max_area: self.max_area,
            });
        }
        if cancel.is_cancelled() {
            return Err(AssemblyError::Cancelled);
        }

        let tiles = window.tiles(req.zoom);
        let columns = 1i64 << req.zoom;
        debug!(
            zoom = req.zoom,
            scale = req.scale,
            width = window.width,
            height = window.height,
            tiles = tiles.len(),
            "Assembling canvas"
        );

        let mut canvas = RgbaImage::from_pixel(
            window.width as u32,
            window.height as u32,
            Rgba(req.background),
        );
        let ts = window.tile_size as i64;

        let mut results = stream::iter(tiles)
            .map(|(col, row)| {
                let pending = fetch(req.zoom, col.rem_euclid(columns) as u32, row as u32);
                async move { (col, row, pending.await) }
            })
            .buffer_unordered(self.concurrency);

        while let Some((col, row, result)) = results.next().await {
            if cancel.is_cancelled() {
                return Err(AssemblyError::Cancelled);
            }

            let data = match result {
                Ok(data) => data,
                Err(FetchError::Cancelled) => return Err(AssemblyError::Cancelled),
                Err(e) => {
                    debug!(col, row, error = %e, "Tile missing from canvas");
                    continue;
                }
            };

            let codec = self.codec.clone();
            let size = window.tile_size;
            let tile = match offload(move || decode_tile(codec.as_ref(), &data, size)).await {
                Ok(tile) => tile,
                Err(e) => {
                    warn!(col, row, error = %e, "Undecodable tile left out of canvas");
                    continue;
                }
            };

            imageops::overlay(
                &mut canvas,
                &tile,
                col * ts - window.x0,
                row * ts - window.y0,
            );
        }

        Ok(DynamicImage::ImageRgba8(canvas))
    }
}

/// Decode one tile and bring it to `size` x `size` RGBA.
fn decode_tile(codec: &dyn RasterCodec, data: &[u8], size: u32) -> Result<RgbaImage, CodecError> {
    let mut tile = codec.decode(data)?;
    if tile.dimensions() != (size, size) {
        tile = codec.resize(&tile, size, size);
    }
    Ok(tile.into_rgba8())
}
