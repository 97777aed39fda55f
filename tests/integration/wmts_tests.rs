//! WMTS GetTile integration tests.
//!
//! Tests verify:
//! - Passthrough of upstream tiles in their own format
//! - Transcoding when another format is requested
//! - Tile address validation and its exception locators
//! - Hidden layers, unknown layers and missing upstream tiles

use std::sync::Arc;

use axum::http::StatusCode;
use image::ImageFormat as EncodedFormat;

use ogc_tile_server::geometry::{GeoBBox, ZoomRange};
use ogc_tile_server::layer::ConcreteLayer;

use super::test_utils::{
    decode, get, is_jpeg, is_png, router_with, solid_layer, solid_png, solid_tile, MockTileSource,
};

fn tile_uri(layer: &str, matrix: &str, row: i64, col: i64, format: &str) -> String {
    format!(
        "/wmts?SERVICE=WMTS&REQUEST=GetTile&LAYER={}&TILEMATRIXSET=0to20&TILEMATRIX={}&TILEROW={}&TILECOL={}&FORMAT={}",
        layer, matrix, row, col, format
    )
}

// =============================================================================
// Passthrough and Transcoding
// =============================================================================

#[tokio::test]
async fn test_get_tile_passthrough() {
    let tile = solid_png([10, 20, 30, 255]);
    let router = router_with(vec![solid_layer("base", tile.clone())]);

    let response = get(&router, &tile_uri("base", "0to20:18", 100, 200, "image/png")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.as_ref(), tile.as_slice());
    assert_eq!(response.header("content-type"), Some("image/png"));
    assert_eq!(
        response.header("content-length"),
        Some(tile.len().to_string().as_str())
    );
    assert!(response.header("etag").is_some());
    assert!(response.header("cache-control").is_some());
}

#[tokio::test]
async fn test_get_tile_keeps_upstream_etag() {
    let source = MockTileSource::new()
        .with_fallback(solid_png([1, 2, 3, 255]))
        .with_header("etag", "\"upstream-v1\"");
    let router = router_with(vec![ConcreteLayer::new("base", Arc::new(source))]);

    let response = get(&router, &tile_uri("base", "0to20:3", 1, 1, "image/png")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("etag"), Some("\"upstream-v1\""));
}

#[tokio::test]
async fn test_get_tile_content_type_from_bytes() {
    // S3 commonly labels objects binary/octet-stream
    let source = MockTileSource::new()
        .with_fallback(solid_png([1, 2, 3, 255]))
        .with_header("content-type", "binary/octet-stream");
    let router = router_with(vec![ConcreteLayer::new("base", Arc::new(source))]);

    let response = get(&router, &tile_uri("base", "0to20:3", 1, 1, "image/png")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("image/png"));
    assert!(is_png(&response.body));
}

#[tokio::test]
async fn test_get_tile_transcodes_to_jpeg() {
    let router = router_with(vec![solid_layer("base", solid_png([200, 0, 0, 255]))]);

    let response = get(&router, &tile_uri("base", "0to20:2", 1, 1, "image/jpeg")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("image/jpeg"));
    assert!(is_jpeg(&response.body));

    let pixel = decode(&response.body).get_pixel(128, 128).0;
    assert!(pixel[0] > 180 && pixel[1] < 40 && pixel[2] < 40);
}

#[tokio::test]
async fn test_get_tile_transcodes_jpeg_to_png() {
    let jpeg = solid_tile([0, 0, 255, 255], EncodedFormat::Jpeg);
    let router = router_with(vec![solid_layer("base", jpeg)]);

    let response = get(&router, &tile_uri("base", "0to20:2", 0, 0, "image/png")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(is_png(&response.body));
}

#[tokio::test]
async fn test_get_tile_serves_exact_address() {
    let red = solid_png([255, 0, 0, 255]);
    let source = MockTileSource::new().with_tile(5, 7, 9, red.clone());
    let router = router_with(vec![ConcreteLayer::new("base", Arc::new(source))]);

    let hit = get(&router, &tile_uri("base", "0to20:5", 9, 7, "image/png")).await;
    assert_eq!(hit.status, StatusCode::OK);
    assert_eq!(hit.body.as_ref(), red.as_slice());

    let miss = get(&router, &tile_uri("base", "0to20:5", 7, 9, "image/png")).await;
    assert_eq!(miss.status, StatusCode::NOT_FOUND);
    assert!(miss.text().contains("tile is not available"));
    assert!(miss.header("cache-control").is_none());
}

// =============================================================================
// Address Validation
// =============================================================================

#[tokio::test]
async fn test_get_tile_row_out_of_range() {
    let router = router_with(vec![solid_layer("base", solid_png([0, 0, 0, 255]))]);

    let response = get(&router, &tile_uri("base", "0to20:18", 1_000_000, 0, "image/png")).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.header("content-type"), Some("application/xml"));
    let body = response.text();
    assert!(body.contains("exceptionCode=\"TileOutOfRange\""));
    assert!(body.contains("locator=\"TILEROW\""));
}

#[tokio::test]
async fn test_get_tile_zoom_outside_layer_range() {
    let layer = ConcreteLayer::new(
        "city",
        Arc::new(MockTileSource::new().with_fallback(solid_png([0, 0, 0, 255]))),
    )
    .with_range(ZoomRange::new(10, 14));
    let router = router_with(vec![layer]);

    let response = get(&router, &tile_uri("city", "10to14:9", 0, 0, "image/png")).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.text().contains("locator=\"TILEMATRIX\""));
}

#[tokio::test]
async fn test_get_tile_column_outside_layer_envelope() {
    // Eastern hemisphere only: column 0 at zoom 1 is the western half.
    let layer = solid_layer("east", solid_png([0, 0, 0, 255]))
        .with_bbox(GeoBBox::new(10.0, -60.0, 170.0, 60.0));
    let router = router_with(vec![layer]);

    let response = get(&router, &tile_uri("east", "0to20:1", 0, 0, "image/png")).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.text().contains("locator=\"TILECOL\""));
}

#[tokio::test]
async fn test_get_tile_non_numeric_row() {
    let router = router_with(vec![solid_layer("base", solid_png([0, 0, 0, 255]))]);

    let response = get(
        &router,
        "/wmts?REQUEST=GetTile&LAYER=base&TILEMATRIX=0to20:1&TILEROW=abc&TILECOL=0&FORMAT=image/png",
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.text().contains("InvalidParameterValue"));
}

#[tokio::test]
async fn test_get_tile_missing_parameter() {
    let router = router_with(vec![solid_layer("base", solid_png([0, 0, 0, 255]))]);

    let response = get(&router, "/wmts?REQUEST=GetTile&LAYER=base&TILEROW=0&TILECOL=0").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let body = response.text();
    assert!(body.contains("MissingParameterValue"));
    assert!(body.contains("locator=\"TILEMATRIX\""));
}

// =============================================================================
// Layer Errors
// =============================================================================

#[tokio::test]
async fn test_get_tile_unknown_layer() {
    let router = router_with(vec![solid_layer("base", solid_png([0, 0, 0, 255]))]);

    let response = get(&router, &tile_uri("nope", "0to20:1", 0, 0, "image/png")).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.text().contains("locator=\"LAYER\""));
}

#[tokio::test]
async fn test_get_tile_hidden_layer_is_unauthorized() {
    let layer = solid_layer("secret", solid_png([0, 0, 0, 255])).with_visible(false);
    let router = router_with(vec![layer]);

    let response = get(&router, &tile_uri("secret", "0to20:1", 0, 0, "image/png")).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(response.header("content-type").unwrap().starts_with("text/plain"));
}
