//! OGC request orchestration.
//!
//! [`OgcService`] is the single entry point for WMS and WMTS requests. It
//! dispatches on `REQUEST` and turns every outcome, success or
//! [`ServiceError`], into a [`ResponseEnvelope`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          OgcService                          │
//! │                dispatch on REQUEST (any case)                │
//! └───────┬──────────────────────┬──────────────────────┬────────┘
//!         ▼                      ▼                      ▼
//!  GetCapabilities           GetTile                GetMap
//!  CapabilitiesService       TileService            MapService
//!  (cached documents)        TileFetcher,           Compositor,
//!                            TranscodeCache         TileGridAssembler
//!
//!  Err(ServiceError) ──▶ ServiceErrors::render ──▶ ResponseEnvelope
//! ```

mod capabilities;
mod map;
mod params;
mod response;
mod tile;

pub use capabilities::{CapabilitiesService, OgcKind};
pub use map::{parse_bbox, scale_for_dpi, MapRequest, MapService, Srs, MAX_SCALE};
pub use params::QueryParams;
pub use response::{ResponseEnvelope, ServiceErrors, EXCEPTION_CACHE_ENTRIES};
pub use tile::{TileRequest, TileService};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::{CacheStore, MemoryCacheStore, DEFAULT_CACHE_CAPACITY};
use crate::error::{ExceptionCode, ServiceError};
use crate::fetch::Compositor;
use crate::imaging::{
    BlankTileProvider, ImageCodec, RasterCodec, TileGridAssembler, TranscodeCache,
    DEFAULT_FETCH_CONCURRENCY, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_PIXEL_AREA,
};
use crate::layer::{LayerRegistry, DEFAULT_MAX_LAYERS};

/// Default base URL written into capabilities documents.
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:3000";

/// Tunables of the request pipeline.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL of this server as seen by clients
    pub public_url: String,

    /// Maximum number of layers in one GetMap request
    pub max_layers: usize,

    /// Maximum pixel area of an assembled or requested map
    pub max_pixel_area: u64,

    /// Tiles fetched at once while assembling a map
    pub fetch_concurrency: usize,

    /// Byte capacity of the transcode cache
    pub cache_size: usize,

    /// JPEG quality used when encoding
    pub jpeg_quality: u8,

    /// Expose internal error messages to clients
    pub dev_mode: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            public_url: DEFAULT_PUBLIC_URL.to_string(),
            max_layers: DEFAULT_MAX_LAYERS,
            max_pixel_area: DEFAULT_MAX_PIXEL_AREA,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            cache_size: DEFAULT_CACHE_CAPACITY,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            dev_mode: false,
        }
    }
}

/// WMS/WMTS front door shared by all HTTP requests.
pub struct OgcService {
    registry: Arc<LayerRegistry>,
    tiles: TileService,
    maps: MapService,
    capabilities: CapabilitiesService,
    errors: ServiceErrors,
}

impl OgcService {
    /// Build the pipeline with an in-memory transcode cache and the default codec.
    pub fn new(registry: Arc<LayerRegistry>, config: ServiceConfig) -> Self {
        let store = Arc::new(MemoryCacheStore::with_capacity(config.cache_size));
        let codec = Arc::new(ImageCodec::with_quality(config.jpeg_quality));
        Self::with_parts(registry, config, store, codec)
    }

    /// Build the pipeline around an existing cache store and codec.
    pub fn with_parts(
        registry: Arc<LayerRegistry>,
        config: ServiceConfig,
        store: Arc<dyn CacheStore>,
        codec: Arc<dyn RasterCodec>,
    ) -> Self {
        let blanks = Arc::new(BlankTileProvider::new(codec.clone()));
        let compositor = Compositor::new(codec.clone(), blanks);
        let assembler =
            TileGridAssembler::new(codec.clone(), config.max_pixel_area, config.fetch_concurrency);
        let transcoder = TranscodeCache::new(store, codec.clone());

        Self {
            tiles: TileService::new(registry.clone(), transcoder, codec.clone()),
            maps: MapService::new(
                registry.clone(),
                compositor,
                assembler,
                codec,
                config.max_layers,
            ),
            capabilities: CapabilitiesService::new(
                registry.clone(),
                &config.public_url,
                config.max_layers,
            ),
            errors: ServiceErrors::new(config.dev_mode),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<LayerRegistry> {
        &self.registry
    }

    /// Answer one request. Never fails: errors become exception envelopes.
    pub async fn handle(&self, params: &QueryParams, cancel: &CancellationToken) -> ResponseEnvelope {
        match self.dispatch(params, cancel).await {
            Ok(envelope) => envelope,
            Err(err) => self.errors.render(&err).await,
        }
    }

    async fn dispatch(
        &self,
        params: &QueryParams,
        cancel: &CancellationToken,
    ) -> Result<ResponseEnvelope, ServiceError> {
        let request = params.require("request")?;
        debug!(request, "Dispatching OGC request");

        match request.to_lowercase().as_str() {
            "getcapabilities" => self.capabilities.get_capabilities(params).await,
            "getmap" => self.maps.get_map(params, cancel).await,
            "gettile" => self.tiles.get_tile(params, cancel).await,
            _ => Err(ServiceError::parameter(
                ExceptionCode::OperationNotSupported,
                Some("REQUEST"),
                format!("unknown/invalid request: {}", request),
            )),
        }
    }
}
