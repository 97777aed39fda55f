//! Tile address validation against a layer's envelope.

use std::fmt;

use super::mercator::{tile_bounds, GeoBBox};

/// A validated (zoom, column, row) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileAddress {
    pub zoom: u8,
    pub col: u32,
    pub row: u32,
}

impl TileAddress {
    pub fn new(zoom: u8, col: u32, row: u32) -> Self {
        Self { zoom, col, row }
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.col, self.row)
    }
}

/// Inclusive zoom range supported by a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomRange {
    pub min: u8,
    pub max: u8,
}

impl ZoomRange {
    pub fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, zoom: i64) -> bool {
        zoom >= self.min as i64 && zoom <= self.max as i64
    }

    /// Union of two ranges (not intersection).
    pub fn union(&self, other: &ZoomRange) -> ZoomRange {
        ZoomRange {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Tile-matrix-set name used in capabilities, e.g. `0to20`.
    pub fn tile_matrix_set(&self) -> String {
        format!("{}to{}", self.min, self.max)
    }
}

/// The first address axis found out of range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Zoom,
    Row,
    Col,
}

impl Axis {
    /// Request parameter naming this axis, used as the exception locator.
    pub fn locator(&self) -> &'static str {
        match self {
            Axis::Zoom => "TILEMATRIX",
            Axis::Row => "TILEROW",
            Axis::Col => "TILECOL",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.locator())
    }
}

/// Check a requested address against a layer's zoom range and envelope.
///
/// Zoom is checked first; row is checked before column.
pub fn validate_address(
    bbox: &GeoBBox,
    range: &ZoomRange,
    zoom: i64,
    col: i64,
    row: i64,
) -> Result<TileAddress, Axis> {
    if !range.contains(zoom) {
        return Err(Axis::Zoom);
    }
    let zoom = zoom as u8;

    let bounds = tile_bounds(bbox, zoom);
    if !bounds.contains_row(row) || row > u32::MAX as i64 {
        return Err(Axis::Row);
    }
    if !bounds.contains_col(col) || col > u32::MAX as i64 {
        return Err(Axis::Col);
    }

    Ok(TileAddress::new(zoom, col as u32, row as u32))
}
