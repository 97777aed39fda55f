//! Spherical mercator projection and tile-pyramid pixel math.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

/// Tile edge length in pixels.
pub const TILE_SIZE: u32 = 256;

/// WGS84 semi-major axis in metres.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Half the width of the projected plane in metres.
pub const MAX_EXTENT: f64 = 20_037_508.342_789_244;

/// Sine of latitude is clamped to this magnitude before projecting to pixels.
const MAX_SIN_LAT: f64 = 0.9999;

/// A geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl GeoBBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// The whole mercator world.
    pub fn world() -> Self {
        let (_, max_lat) = inverse(0.0, MAX_EXTENT);
        Self::new(-180.0, -max_lat, 180.0, max_lat)
    }

    /// True if all corners are finite and min < max on both axes.
    pub fn is_valid(&self) -> bool {
        let finite = [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
            .iter()
            .all(|v| v.is_finite());
        finite && self.min_lon < self.max_lon && self.min_lat < self.max_lat
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &GeoBBox) -> GeoBBox {
        GeoBBox {
            min_lon: self.min_lon.min(other.min_lon),
            min_lat: self.min_lat.min(other.min_lat),
            max_lon: self.max_lon.max(other.max_lon),
            max_lat: self.max_lat.max(other.max_lat),
        }
    }

    /// Reproject a box given in EPSG:3857 metres into degrees.
    pub fn from_mercator(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> GeoBBox {
        let (min_lon, min_lat) = inverse(min_x, min_y);
        let (max_lon, max_lat) = inverse(max_x, max_y);
        GeoBBox::new(min_lon, min_lat, max_lon, max_lat)
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }
}

impl From<[f64; 4]> for GeoBBox {
    fn from(v: [f64; 4]) -> Self {
        GeoBBox::new(v[0], v[1], v[2], v[3])
    }
}

/// Inclusive tile-index rectangle at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileBounds {
    pub min_col: i64,
    pub min_row: i64,
    pub max_col: i64,
    pub max_row: i64,
}

impl TileBounds {
    pub fn contains_col(&self, col: i64) -> bool {
        col >= self.min_col && col <= self.max_col
    }

    pub fn contains_row(&self, row: i64) -> bool {
        row >= self.min_row && row <= self.max_row
    }

    pub fn tile_count(&self) -> u64 {
        let cols = (self.max_col - self.min_col + 1).max(0) as u64;
        let rows = (self.max_row - self.min_row + 1).max(0) as u64;
        cols * rows
    }
}

/// Project geographic degrees onto the mercator plane (metres).
pub fn forward(lon: f64, lat: f64) -> (f64, f64) {
    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * (FRAC_PI_4 + 0.5 * lat.to_radians()).tan().ln();
    (
        x.clamp(-MAX_EXTENT, MAX_EXTENT),
        y.clamp(-MAX_EXTENT, MAX_EXTENT),
    )
}

/// Unproject mercator metres back to geographic degrees.
pub fn inverse(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (FRAC_PI_2 - 2.0 * (-y / EARTH_RADIUS).exp().atan()).to_degrees();
    (lon, lat)
}

/// Pixel position of a coordinate at `zoom` in a 256-pixel tile pyramid.
///
/// Origin is the top-left corner of the world; y grows southwards.
pub fn pixel(lon: f64, lat: f64, zoom: u8) -> (f64, f64) {
    pixel_scaled(lon, lat, zoom, TILE_SIZE)
}

/// Like [`pixel`], with an explicit tile edge length (used for scaled output).
pub fn pixel_scaled(lon: f64, lat: f64, zoom: u8, tile_size: u32) -> (f64, f64) {
    let size = tile_size as f64 * 2f64.powi(zoom as i32);
    let center = size / 2.0;
    let px_per_degree = size / 360.0;
    let px_per_radian = size / (2.0 * PI);

    let f = lat.to_radians().sin().clamp(-MAX_SIN_LAT, MAX_SIN_LAT);
    let x = (center + lon * px_per_degree).round();
    let y = (center - 0.5 * ((1.0 + f) / (1.0 - f)).ln() * px_per_radian).round();

    (x.min(size), y.min(size))
}

/// Inclusive tile-index rectangle covering `bbox` at `zoom`.
pub fn tile_bounds(bbox: &GeoBBox, zoom: u8) -> TileBounds {
    let (ll_x, ll_y) = pixel(bbox.min_lon, bbox.min_lat, zoom);
    let (ur_x, ur_y) = pixel(bbox.max_lon, bbox.max_lat, zoom);
    let size = TILE_SIZE as f64;

    let cols = [
        (ll_x / size).floor() as i64,
        ((ur_x - 1.0) / size).floor() as i64,
    ];
    let rows = [
        (ur_y / size).floor() as i64,
        ((ll_y - 1.0) / size).floor() as i64,
    ];

    TileBounds {
        min_col: cols[0].min(cols[1]).max(0),
        min_row: rows[0].min(rows[1]).max(0),
        max_col: cols[0].max(cols[1]),
        max_row: rows[0].max(rows[1]),
    }
}
