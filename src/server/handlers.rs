//! HTTP request handlers for the OGC endpoints.
//!
//! # Endpoints
//!
//! - `GET /wms`, `GET /wmts`, `GET /ows` - OGC key-value-pair requests
//! - `GET /layers` - JSON listing of the visible layers
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::service::{OgcService, QueryParams, ResponseEnvelope};

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the OGC service.
pub struct AppState {
    /// Request pipeline shared by every handler
    pub service: Arc<OgcService>,

    /// Cache-Control max-age for successful responses, in seconds
    pub cache_max_age: u32,

    /// Parent of every per-request cancellation token
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(service: Arc<OgcService>) -> Self {
        Self::with_cache_max_age(service, 3600)
    }

    pub fn with_cache_max_age(service: Arc<OgcService>, cache_max_age: u32) -> Self {
        Self {
            service,
            cache_max_age,
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancel in-flight requests when `shutdown` fires.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            cache_max_age: self.cache_max_age,
            shutdown: self.shutdown.clone(),
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// One entry of the `/layers` listing.
#[derive(Debug, Serialize)]
pub struct LayerSummary {
    pub name: String,
    pub title: String,
    /// `[min_lon, min_lat, max_lon, max_lat]`
    pub bbox: [f64; 4],
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub formats: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct LayersResponse {
    pub title: String,
    pub layers: Vec<LayerSummary>,
}

// =============================================================================
// Envelope Conversion
// =============================================================================

impl IntoResponse for ResponseEnvelope {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.data));
        *response.status_mut() = self.code;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Attach Cache-Control to successful envelopes.
fn with_cache_control(mut envelope: ResponseEnvelope, max_age: u32) -> ResponseEnvelope {
    if envelope.is_success() {
        if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={}", max_age)) {
            envelope.headers.insert(header::CACHE_CONTROL, value);
        }
    }
    envelope
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle an OGC key-value-pair request.
///
/// # Endpoint
///
/// `GET /wms?SERVICE=WMS&REQUEST=GetMap&...`
/// `GET /wmts?SERVICE=WMTS&REQUEST=GetTile&...`
///
/// Parameter names are case-insensitive. The request is cancelled if the
/// client goes away before the response is ready.
///
/// # Response
///
/// - `200 OK`: image or capabilities document
/// - `400 Bad Request`: OWS exception report
/// - `401 Unauthorized`: the layer is not viewable
/// - `404 Not Found`: the upstream tile is unavailable
/// - `500 Internal Server Error`: OWS exception report
pub async fn ogc_handler(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Response {
    let params = QueryParams::from_pairs(pairs);
    debug!(parameters = params.len(), "OGC request");

    let cancel = state.shutdown.child_token();
    // Dropping the handler future (client disconnect) cancels the request.
    let _guard = cancel.clone().drop_guard();

    let envelope = state.service.handle(&params, &cancel).await;
    with_cache_control(envelope, state.cache_max_age).into_response()
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// List the layers clients may request.
///
/// # Endpoint
///
/// `GET /layers`
pub async fn layers_handler(State(state): State<AppState>) -> Json<LayersResponse> {
    let registry = state.service.registry();
    let layers = registry
        .visible()
        .map(|layer| LayerSummary {
            name: layer.name().to_string(),
            title: layer.title().to_string(),
            bbox: layer.bbox().to_array(),
            min_zoom: layer.range().min,
            max_zoom: layer.range().max,
            formats: layer.formats().iter().map(|f| f.mime()).collect(),
        })
        .collect();

    Json(LayersResponse {
        title: registry.info().title.clone(),
        layers,
    })
}

// =============================================================================
// Tests
// =============================================================================
