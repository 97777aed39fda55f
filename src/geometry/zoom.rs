//! Zoom selection for bbox-driven rendering.

use super::mercator::{pixel, GeoBBox};

pub const DEFAULT_MIN_ZOOM: u8 = 0;
pub const DEFAULT_MAX_ZOOM: u8 = 20;

/// Pick the zoom whose map pixels best match the requested output pixels.
///
/// The pixel span of `bbox` is measured at `max_zoom`; each axis yields
/// `max_zoom - log2(span / output)` and the smaller (coarser) candidate is
/// rounded up, then clamped into `[min_zoom, max_zoom]`.
pub fn select_zoom(
    bbox: &GeoBBox,
    width: u32,
    height: u32,
    min_zoom: Option<u8>,
    max_zoom: Option<u8>,
) -> u8 {
    let min_zoom = min_zoom.unwrap_or(DEFAULT_MIN_ZOOM);
    let max_zoom = max_zoom.unwrap_or(DEFAULT_MAX_ZOOM);

    let (bl_x, bl_y) = pixel(bbox.min_lon, bbox.min_lat, max_zoom);
    let (tr_x, tr_y) = pixel(bbox.max_lon, bbox.max_lat, max_zoom);
    let span_x = tr_x - bl_x;
    let span_y = bl_y - tr_y;

    let ratio_x = span_x / width as f64;
    let ratio_y = span_y / height as f64;

    let candidate_x = max_zoom as f64 - ratio_x.log2();
    let candidate_y = max_zoom as f64 - ratio_y.log2();
    let adjusted = candidate_x.min(candidate_y).ceil();

    if adjusted.is_nan() {
        return max_zoom;
    }
    adjusted.clamp(min_zoom as f64, max_zoom as f64) as u8
}
