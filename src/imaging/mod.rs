//! Raster handling.
//!
//! - [`RasterCodec`] / [`ImageCodec`]: decode, encode, resize and blend tile bytes
//! - [`BlankTileProvider`]: memoized solid-color placeholder tiles
//! - [`TranscodeCache`]: content-addressed re-encoding of tiles
//! - [`TileGridAssembler`]: stitches tiles into a canvas covering a bbox

mod assembler;
mod blank;
mod codec;
mod transcode;

pub use assembler::{
    GridRequest, PixelWindow, TileGridAssembler, DEFAULT_FETCH_CONCURRENCY, DEFAULT_MAX_PIXEL_AREA,
};
pub use blank::{BlankColor, BlankTileProvider, Fill};
pub use codec::{
    offload, ImageCodec, ImageFormat, RasterCodec, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use transcode::TranscodeCache;
