//! WMS GetMap integration tests.
//!
//! Tests verify:
//! - Rendering in both supported reference systems
//! - Output formats and canvas dimensions
//! - Multi-layer compositing and blank fills
//! - Request validation (SRS, size, layer count)

use std::sync::Arc;

use axum::http::StatusCode;

use ogc_tile_server::geometry::GeoBBox;
use ogc_tile_server::layer::ConcreteLayer;
use ogc_tile_server::service::ServiceConfig;

use super::test_utils::{
    decode, get, is_jpeg, is_png, router_with, router_with_config, solid_layer, solid_png,
    MockTileSource,
};

fn map_uri(layers: &str, srs: &str, bbox: &str, width: u32, height: u32, extra: &str) -> String {
    format!(
        "/wms?SERVICE=WMS&VERSION=1.3.0&REQUEST=GetMap&LAYERS={}&CRS={}&BBOX={}&WIDTH={}&HEIGHT={}&FORMAT=image/png{}",
        layers, srs, bbox, width, height, extra
    )
}

fn assert_color(pixel: [u8; 4], expected: [u8; 4]) {
    for (got, want) in pixel.iter().zip(expected.iter()) {
        assert!(
            (*got as i16 - *want as i16).abs() <= 2,
            "pixel {:?} differs from {:?}",
            pixel,
            expected
        );
    }
}

// =============================================================================
// Rendering
// =============================================================================

#[tokio::test]
async fn test_get_map_geographic() {
    let router = router_with(vec![solid_layer("base", solid_png([255, 0, 0, 255]))]);

    let response = get(&router, &map_uri("base", "EPSG:4326", "-10,-10,10,10", 256, 256, "")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("image/png"));
    assert!(response.header("etag").is_some());
    assert!(is_png(&response.body));

    let image = decode(&response.body);
    assert_eq!(image.dimensions(), (256, 256));
    assert_color(image.get_pixel(128, 128).0, [255, 0, 0, 255]);
}

#[tokio::test]
async fn test_get_map_mercator() {
    let router = router_with(vec![solid_layer("base", solid_png([0, 255, 0, 255]))]);

    let response = get(
        &router,
        &map_uri("base", "EPSG:3857", "-1000000,-1000000,1000000,1000000", 300, 200, ""),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    let image = decode(&response.body);
    assert_eq!(image.dimensions(), (300, 200));
    assert_color(image.get_pixel(150, 100).0, [0, 255, 0, 255]);
}

#[tokio::test]
async fn test_get_map_jpeg_output() {
    let router = router_with(vec![solid_layer("base", solid_png([0, 0, 255, 255]))]);

    let uri = map_uri("base", "EPSG:4326", "0,0,20,20", 128, 128, "").replace("image/png", "image/jpeg");
    let response = get(&router, &uri).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("image/jpeg"));
    assert!(is_jpeg(&response.body));
}

#[tokio::test]
async fn test_get_map_parameters_are_case_insensitive() {
    let router = router_with(vec![solid_layer("base", solid_png([255, 0, 0, 255]))]);

    let response = get(
        &router,
        "/ows?service=wms&request=getmap&layers=base&srs=epsg:4326&bbox=0,0,10,10&width=64&height=64&format=image/png",
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
}

// =============================================================================
// Compositing and Fill
// =============================================================================

#[tokio::test]
async fn test_get_map_composites_layers_bottom_to_top() {
    let bottom = solid_layer("bottom", solid_png([0, 0, 255, 255]));
    let top = solid_layer("top", solid_png([0, 0, 0, 0]));
    let router = router_with(vec![bottom, top]);

    let response = get(&router, &map_uri("bottom,top", "EPSG:4326", "-10,-10,10,10", 128, 128, "")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_color(decode(&response.body).get_pixel(64, 64).0, [0, 0, 255, 255]);
}

#[tokio::test]
async fn test_get_map_missing_tiles_use_background() {
    let empty = ConcreteLayer::new("empty", Arc::new(MockTileSource::new()));
    let router = router_with(vec![empty]);

    let response = get(
        &router,
        &map_uri("empty", "EPSG:4326", "-10,-10,10,10", 64, 64, "&BGCOLOR=0xFF0000"),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_color(decode(&response.body).get_pixel(32, 32).0, [255, 0, 0, 255]);
}

#[tokio::test]
async fn test_get_map_transparent_background() {
    let empty = ConcreteLayer::new("empty", Arc::new(MockTileSource::new()));
    let router = router_with(vec![empty]);

    let response = get(
        &router,
        &map_uri("empty", "EPSG:4326", "-10,-10,10,10", 64, 64, "&TRANSPARENT=TRUE"),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(decode(&response.body).get_pixel(32, 32).0[3], 0);
}

#[tokio::test]
async fn test_get_map_outside_layer_envelope_is_blank() {
    let source = Arc::new(MockTileSource::new().with_fallback(solid_png([0, 255, 0, 255])));
    let layer = ConcreteLayer::new("east", source.clone()).with_bbox(GeoBBox::new(100.0, 0.0, 120.0, 20.0));
    let router = router_with(vec![layer]);

    let response = get(
        &router,
        &map_uri("east", "EPSG:4326", "-60,-40,-40,-20", 64, 64, "&BGCOLOR=0x000000"),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_color(decode(&response.body).get_pixel(32, 32).0, [0, 0, 0, 255]);
    assert_eq!(source.request_count(), 0);
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_get_map_invalid_srs() {
    let router = router_with(vec![solid_layer("base", solid_png([0, 0, 0, 255]))]);

    let response = get(&router, &map_uri("base", "EPSG:27700", "0,0,10,10", 64, 64, "")).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let body = response.text();
    assert!(body.contains("exceptionCode=\"InvalidSRS\""));
    assert!(body.contains("locator=\"SRS\""));
}

#[tokio::test]
async fn test_get_map_invalid_bbox() {
    let router = router_with(vec![solid_layer("base", solid_png([0, 0, 0, 255]))]);

    let response = get(&router, &map_uri("base", "EPSG:4326", "10,10,0,0", 64, 64, "")).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.text().contains("locator=\"BBOX\""));
}

#[tokio::test]
async fn test_get_map_too_large() {
    let config = ServiceConfig {
        max_pixel_area: 512 * 512,
        ..ServiceConfig::default()
    };
    let router = router_with_config(vec![solid_layer("base", solid_png([0, 0, 0, 255]))], config);

    let response = get(&router, &map_uri("base", "EPSG:4326", "0,0,10,10", 1024, 1024, "")).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.text().contains("locator=\"WIDTH\""));
}

#[tokio::test]
async fn test_get_map_too_many_layers() {
    let config = ServiceConfig {
        max_layers: 2,
        ..ServiceConfig::default()
    };
    let layers = vec![
        solid_layer("a", solid_png([0, 0, 0, 255])),
        solid_layer("b", solid_png([0, 0, 0, 255])),
        solid_layer("c", solid_png([0, 0, 0, 255])),
    ];
    let router = router_with_config(layers, config);

    let response = get(&router, &map_uri("a,b,c", "EPSG:4326", "0,0,10,10", 64, 64, "")).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.text().contains("locator=\"LAYERS\""));
}

#[tokio::test]
async fn test_get_map_hidden_member_is_unauthorized() {
    let visible = solid_layer("visible", solid_png([0, 0, 0, 255]));
    let hidden = solid_layer("hidden", solid_png([0, 0, 0, 255])).with_visible(false);
    let router = router_with(vec![visible, hidden]);

    let response = get(&router, &map_uri("visible,hidden", "EPSG:4326", "0,0,10,10", 64, 64, "")).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_get_map_missing_crs() {
    let router = router_with(vec![solid_layer("base", solid_png([0, 0, 0, 255]))]);

    let response = get(
        &router,
        "/wms?REQUEST=GetMap&LAYERS=base&BBOX=0,0,10,10&WIDTH=64&HEIGHT=64&FORMAT=image/png",
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.text().contains("MissingParameterValue"));
}
