//! Tile geometry.
//!
//! Pure math over the spherical (web) mercator tile pyramid: projection
//! between geographic coordinates and the projected plane, pixel positions at
//! a zoom level, tile-index extents of a bounding box, address validation and
//! zoom selection for bbox-driven requests.
//!
//! ```text
//!   (lon, lat) ──forward──▶ (x, y) metres      EPSG:4326 ⇄ EPSG:3857
//!   (lon, lat) ──pixel────▶ (px, py) at zoom    256 · 2^zoom pixels per side
//!   bbox       ──tile_bounds──▶ inclusive (col, row) rectangle
//! ```

mod address;
mod mercator;
mod zoom;

pub use address::{validate_address, Axis, TileAddress, ZoomRange};
pub use mercator::{
    forward, inverse, pixel, pixel_scaled, tile_bounds, GeoBBox, TileBounds, EARTH_RADIUS,
    MAX_EXTENT, TILE_SIZE,
};
pub use zoom::{select_zoom, DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM};
