//! Capabilities documents and auxiliary HTTP endpoints.
//!
//! Tests verify:
//! - WMS and WMTS capabilities list only visible layers
//! - Tile matrix sets follow the layer zoom ranges
//! - SERVICE and REQUEST dispatch errors
//! - Health and layer listing endpoints

use axum::http::StatusCode;

use ogc_tile_server::geometry::ZoomRange;
use ogc_tile_server::service::ServiceConfig;

use super::test_utils::{get, router_with, router_with_config, solid_layer, solid_png};

fn layers() -> Vec<ogc_tile_server::layer::ConcreteLayer> {
    vec![
        solid_layer("base", solid_png([0, 0, 0, 255])).with_title("Base & Roads"),
        solid_layer("city", solid_png([0, 0, 0, 255])).with_range(ZoomRange::new(10, 14)),
        solid_layer("secret", solid_png([0, 0, 0, 255])).with_visible(false),
    ]
}

// =============================================================================
// Capabilities
// =============================================================================

#[tokio::test]
async fn test_wmts_capabilities() {
    let router = router_with(layers());

    let response = get(&router, "/wmts?SERVICE=WMTS&REQUEST=GetCapabilities").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("text/xml"));
    assert!(response.header("etag").is_some());

    let body = response.text();
    assert!(body.contains("<ows:Identifier>base</ows:Identifier>"));
    assert!(body.contains("<ows:Identifier>city</ows:Identifier>"));
    assert!(!body.contains("secret"));
    assert!(body.contains("Base &amp; Roads"));
    assert!(body.contains("<TileMatrixSet>0to20</TileMatrixSet>"));
    assert!(body.contains("<TileMatrixSet>10to14</TileMatrixSet>"));
    assert!(body.contains("<TileMatrix>0to20:18</TileMatrix>"));
    assert!(body.contains("<TileMatrix>10to14:12</TileMatrix>"));
    assert!(!body.contains("<TileMatrix>10to14:9</TileMatrix>"));
}

#[tokio::test]
async fn test_wms_capabilities() {
    let config = ServiceConfig {
        public_url: "https://maps.example.com/".to_string(),
        ..ServiceConfig::default()
    };
    let router = router_with_config(layers(), config);

    let response = get(&router, "/wms?SERVICE=WMS&REQUEST=GetCapabilities").await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.text();
    assert!(body.contains("<Name>base</Name>"));
    assert!(body.contains("<Name>city</Name>"));
    assert!(!body.contains("<Name>secret</Name>"));
    assert!(body.contains("https://maps.example.com/wms?"));
    assert!(body.contains("<CRS>EPSG:4326</CRS>"));
    assert!(body.contains("<LayerLimit>10</LayerLimit>"));
}

#[tokio::test]
async fn test_capabilities_are_stable() {
    let router = router_with(layers());

    let first = get(&router, "/ows?SERVICE=WMTS&REQUEST=GetCapabilities").await;
    let second = get(&router, "/ows?service=wmts&request=getcapabilities").await;

    assert_eq!(first.body, second.body);
    assert_eq!(first.header("etag"), second.header("etag"));
}

#[tokio::test]
async fn test_capabilities_unknown_service() {
    let router = router_with(layers());

    let response = get(&router, "/ows?SERVICE=WCS&REQUEST=GetCapabilities").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.text().contains("locator=\"SERVICE\""));
}

#[tokio::test]
async fn test_capabilities_missing_service() {
    let router = router_with(layers());

    let response = get(&router, "/ows?REQUEST=GetCapabilities").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.text().contains("MissingParameterValue"));
}

// =============================================================================
// Dispatch
// =============================================================================

#[tokio::test]
async fn test_unknown_request() {
    let router = router_with(layers());

    let response = get(&router, "/wms?SERVICE=WMS&REQUEST=GetFeatureInfo").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.header("content-type"), Some("application/xml"));
    let body = response.text();
    assert!(body.contains("ExceptionReport"));
    assert!(body.contains("OperationNotSupported"));
    assert!(body.contains("locator=\"REQUEST\""));
    assert!(response.header("cache-control").is_none());
}

#[tokio::test]
async fn test_missing_request() {
    let router = router_with(layers());

    let response = get(&router, "/wms").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.text().contains("locator=\"REQUEST\""));
}

// =============================================================================
// Auxiliary Endpoints
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let router = router_with(layers());

    let response = get(&router, "/health").await;

    assert_eq!(response.status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_layers_endpoint() {
    let router = router_with(layers());

    let response = get(&router, "/layers").await;

    assert_eq!(response.status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(json["title"], "Test Maps");

    let listed = json["layers"].as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["name"], "base");
    assert_eq!(listed[0]["title"], "Base & Roads");
    assert_eq!(listed[1]["min_zoom"], 10);
    assert_eq!(listed[1]["max_zoom"], 14);
}

#[tokio::test]
async fn test_unknown_route() {
    let router = router_with(layers());

    let response = get(&router, "/tiles/base/0/0/0.png").await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}
