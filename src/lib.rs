//! # OGC Tile Server
//!
//! A WMS 1.3.0 and WMTS 1.0.0 server that serves Web Mercator raster tiles
//! from pluggable upstream sources (HTTP tile templates or S3 buckets).
//!
//! ## Features
//!
//! - **WMTS GetTile**: passes upstream tiles through, transcoding only when the
//!   requested format differs (results cached by content digest)
//! - **WMS GetMap**: assembles arbitrary bounding boxes from tiles, compositing
//!   several layers and resizing to the requested canvas
//! - **Capabilities**: WMS and WMTS documents generated from the layer registry
//! - **OWS exceptions**: every failure is reported as an `ExceptionReport`
//!
//! ## Architecture
//!
//! - [`geometry`] - Web Mercator math, zoom selection and tile addressing
//! - [`imaging`] - Codecs, blank tiles, transcoding and grid assembly
//! - [`cache`] - Byte-bounded cache stores
//! - [`layer`] - Layers, tile sources and the layer registry
//! - [`fetch`] - Deadline-bound fetching and multi-layer compositing
//! - [`service`] - OGC request parsing, dispatch and responses
//! - [`server`] - Axum router and handlers
//! - [`config`] - CLI configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use ogc_tile_server::{create_router, LayerRegistry, LayersFile, OgcService, RouterConfig, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let file = LayersFile::load("layers.json")?;
//!     let registry = Arc::new(LayerRegistry::from_file(&file, Duration::from_secs(10)).await?);
//!     let service = Arc::new(OgcService::new(registry, ServiceConfig::default()));
//!
//!     let router = create_router(service, RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod geometry;
pub mod imaging;
pub mod layer;
pub mod server;
pub mod service;

// Re-export commonly used types
pub use cache::{CacheStore, MemoryCacheStore};
pub use config::{CheckConfig, Cli, Command, ServeConfig};
pub use error::{
    AssemblyError, CodecError, ConfigError, ExceptionCode, FetchError, ServiceError,
    TranscodeError,
};
pub use fetch::{Compositor, TileFetcher};
pub use geometry::{GeoBBox, TileAddress, ZoomRange};
pub use imaging::{ImageCodec, ImageFormat, RasterCodec, TileGridAssembler, TranscodeCache};
pub use layer::{
    ConcreteLayer, HttpTileSource, LayerRegistry, LayersFile, MapLayer, RawTile, S3TileSource,
    ServiceInfo, TileSource,
};
pub use server::{create_router, AppState, RouterConfig};
pub use service::{OgcService, QueryParams, ResponseEnvelope, ServiceConfig};
