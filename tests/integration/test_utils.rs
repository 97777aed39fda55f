//! Test utilities for integration tests.
//!
//! Provides an in-memory tile source, tile image builders and a router
//! factory wired the same way `serve` wires it.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use image::{ImageFormat as EncodedFormat, Rgba, RgbaImage};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use ogc_tile_server::error::FetchError;
use ogc_tile_server::geometry::TileAddress;
use ogc_tile_server::layer::{ConcreteLayer, LayerRegistry, RawTile, ServiceInfo, TileSource};
use ogc_tile_server::server::{create_router, RouterConfig};
use ogc_tile_server::service::{OgcService, ServiceConfig};

// =============================================================================
// Mock Tile Source
// =============================================================================

/// Tile source backed by a map of addresses.
///
/// Addresses without an entry answer with the fallback tile, or
/// `FetchError::NotFound` when there is none.
pub struct MockTileSource {
    tiles: HashMap<(u8, u32, u32), Bytes>,
    fallback: Option<Bytes>,
    headers: HeaderMap,
    requests: AtomicUsize,
}

impl MockTileSource {
    pub fn new() -> Self {
        Self {
            tiles: HashMap::new(),
            fallback: None,
            headers: HeaderMap::new(),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn with_tile(mut self, zoom: u8, col: u32, row: u32, data: impl Into<Bytes>) -> Self {
        self.tiles.insert((zoom, col, row), data.into());
        self
    }

    pub fn with_fallback(mut self, data: impl Into<Bytes>) -> Self {
        self.fallback = Some(data.into());
        self
    }

    pub fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.insert(name, value.parse().unwrap());
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Default for MockTileSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TileSource for MockTileSource {
    async fn get_tile(
        &self,
        addr: TileAddress,
        cancel: &CancellationToken,
    ) -> Result<RawTile, FetchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        self.tiles
            .get(&(addr.zoom, addr.col, addr.row))
            .or(self.fallback.as_ref())
            .map(|data| RawTile::with_headers(data.clone(), self.headers.clone()))
            .ok_or_else(|| FetchError::NotFound(format!("{}/{}/{}", addr.zoom, addr.col, addr.row)))
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

// =============================================================================
// Tile Images
// =============================================================================

/// Encode a solid 256x256 tile.
pub fn solid_tile(color: [u8; 4], format: EncodedFormat) -> Vec<u8> {
    let image = RgbaImage::from_pixel(256, 256, Rgba(color));
    let mut out = Cursor::new(Vec::new());
    match format {
        EncodedFormat::Jpeg => image::DynamicImage::ImageRgba8(image)
            .to_rgb8()
            .write_to(&mut out, format)
            .unwrap(),
        _ => image.write_to(&mut out, format).unwrap(),
    }
    out.into_inner()
}

pub fn solid_png(color: [u8; 4]) -> Vec<u8> {
    solid_tile(color, EncodedFormat::Png)
}

pub fn decode(data: &[u8]) -> RgbaImage {
    image::load_from_memory(data).unwrap().to_rgba8()
}

pub fn is_png(data: &[u8]) -> bool {
    data.starts_with(&[0x89, b'P', b'N', b'G'])
}

pub fn is_jpeg(data: &[u8]) -> bool {
    data.starts_with(&[0xFF, 0xD8])
}

// =============================================================================
// Router Helpers
// =============================================================================

/// Build a router over the given layers with default service settings.
pub fn router_with(layers: Vec<ConcreteLayer>) -> Router {
    router_with_config(layers, ServiceConfig::default())
}

pub fn router_with_config(layers: Vec<ConcreteLayer>, config: ServiceConfig) -> Router {
    let info = ServiceInfo {
        title: "Test Maps".to_string(),
        abstract_text: "Layers for integration tests".to_string(),
    };
    let registry = Arc::new(LayerRegistry::new(info, layers).unwrap());
    let service = Arc::new(OgcService::new(registry, config));
    create_router(service, RouterConfig::new().with_tracing(false))
}

/// A layer named `name` whose every tile is `tile`.
pub fn solid_layer(name: &str, tile: Vec<u8>) -> ConcreteLayer {
    ConcreteLayer::new(name, Arc::new(MockTileSource::new().with_fallback(tile)))
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub async fn get(router: &Router, uri: &str) -> TestResponse {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    TestResponse {
        status,
        headers,
        body,
    }
}
