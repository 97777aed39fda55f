//! Layer registry.
//!
//! Built once at startup from the layers file. Every concrete layer owns its
//! fetcher (and therefore its source) for the life of the process; requests
//! only ever borrow layers through [`LayerRegistry::find`] (tile path, single
//! layer) or [`LayerRegistry::resolve`] (map path, one or more layers).
//!
//! ```text
//! layers.json ──▶ LayersFile ──▶ LayerRegistry ──┬── find("base")        ─▶ Arc<ConcreteLayer>
//!                                                └── resolve("a,b", max) ─▶ MapLayer::Composite
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use aws_sdk_s3::Client as S3Client;
use tracing::info;

use crate::error::{ConfigError, ExceptionCode, ServiceError};

use super::file::{LayersFile, SourceDefinition};
use super::http_source::HttpTileSource;
use super::map_layer::{CompositeLayer, ConcreteLayer, MapLayer};
use super::s3_source::{create_s3_client, S3TileSource};
use super::source::TileSource;

// =============================================================================
// Configuration
// =============================================================================

/// Default maximum number of layers in one composite request.
pub const DEFAULT_MAX_LAYERS: usize = 10;

/// Service-level metadata shown in capabilities documents.
#[derive(Debug, Clone, Default)]
pub struct ServiceInfo {
    pub title: String,
    pub abstract_text: String,
}

// =============================================================================
// LayerRegistry
// =============================================================================

/// All configured layers, in declaration order.
pub struct LayerRegistry {
    info: ServiceInfo,
    layers: Vec<Arc<ConcreteLayer>>,
    by_name: HashMap<String, usize>,
}

impl LayerRegistry {
    /// Register `layers`; names must be unique.
    pub fn new(info: ServiceInfo, layers: Vec<ConcreteLayer>) -> Result<Self, ConfigError> {
        let mut by_name = HashMap::with_capacity(layers.len());
        for (idx, layer) in layers.iter().enumerate() {
            if by_name.insert(layer.name().to_string(), idx).is_some() {
                return Err(ConfigError::Invalid(format!(
                    "duplicate layer name '{}'",
                    layer.name()
                )));
            }
        }

        Ok(Self {
            info,
            layers: layers.into_iter().map(Arc::new).collect(),
            by_name,
        })
    }

    /// Build every layer of a validated layers file, creating its source.
    ///
    /// One HTTP client is shared by all HTTP layers; S3 clients are shared per
    /// (endpoint, region).
    pub async fn from_file(file: &LayersFile, fetch_timeout: Duration) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("ogc-tile-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {}", e)))?;
        let mut s3_clients: HashMap<(Option<String>, String), S3Client> = HashMap::new();

        let mut layers = Vec::with_capacity(file.layers.len());
        for def in &file.layers {
            let source: Arc<dyn TileSource> = match &def.source {
                SourceDefinition::Http { url } => Arc::new(HttpTileSource::new(http.clone(), url)),
                SourceDefinition::S3 {
                    bucket,
                    prefix,
                    extension,
                    endpoint,
                    region,
                } => {
                    let key = (endpoint.clone(), region.clone());
                    let client = match s3_clients.get(&key) {
                        Some(client) => client.clone(),
                        None => {
                            let client = create_s3_client(endpoint.as_deref(), region).await;
                            s3_clients.insert(key, client.clone());
                            client
                        }
                    };
                    Arc::new(S3TileSource::new(client, bucket.clone(), prefix, extension))
                }
            };

            info!(
                layer = %def.name,
                source = %source.describe(),
                min_zoom = def.range[0],
                max_zoom = def.range[1],
                viewable = def.viewable,
                "Registered layer"
            );

            let layer = ConcreteLayer::new(def.name.clone(), source)
                .with_title(def.title.clone().unwrap_or_else(|| def.name.clone()))
                .with_bbox(def.envelope())
                .with_range(def.zoom_range())
                .with_visible(def.viewable)
                .with_formats(def.image_formats()?)
                .with_timeout(fetch_timeout);
            layers.push(layer);
        }

        Self::new(
            ServiceInfo {
                title: file.title.clone(),
                abstract_text: file.abstract_text.clone(),
            },
            layers,
        )
    }

    pub fn info(&self) -> &ServiceInfo {
        &self.info
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ConcreteLayer>> {
        self.by_name.get(name).map(|&idx| &self.layers[idx])
    }

    /// All layers in declaration order, visible or not.
    pub fn layers(&self) -> &[Arc<ConcreteLayer>] {
        &self.layers
    }

    /// Visible layers in declaration order.
    pub fn visible(&self) -> impl Iterator<Item = &Arc<ConcreteLayer>> {
        self.layers.iter().filter(|l| l.visible())
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Look up a single layer for the tile path.
    ///
    /// Unknown names are `InvalidParameterValue` (locator `LAYER`); hidden
    /// layers are `Unauthorized`.
    pub fn find(&self, name: &str) -> Result<Arc<ConcreteLayer>, ServiceError> {
        let layer = self.get(name).ok_or_else(|| no_such_layer(name, "LAYER"))?;
        if !layer.visible() {
            return Err(ServiceError::Unauthorized);
        }
        Ok(layer.clone())
    }

    /// Resolve a comma-separated `LAYERS` value for the map path.
    ///
    /// One name yields a concrete layer, several a composite stacked in the
    /// order given (first is bottom-most).
    pub fn resolve(&self, names: &str, max_layers: usize) -> Result<MapLayer, ServiceError> {
        let requested: Vec<&str> = names
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .collect();

        if requested.is_empty() {
            return Err(ServiceError::invalid("layers", names));
        }
        if requested.len() > max_layers {
            return Err(ServiceError::parameter(
                ExceptionCode::InvalidParameterValue,
                Some("LAYERS"),
                format!(
                    "too many layers requested: {} (maximum {})",
                    requested.len(),
                    max_layers
                ),
            ));
        }

        let mut members = Vec::with_capacity(requested.len());
        for name in requested {
            let layer = self.get(name).ok_or_else(|| no_such_layer(name, "LAYERS"))?;
            if !layer.visible() {
                return Err(ServiceError::Unauthorized);
            }
            members.push(layer.clone());
        }

        if members.len() == 1 {
            return Ok(MapLayer::Concrete(members.remove(0)));
        }
        CompositeLayer::new(members)
            .map(MapLayer::Composite)
            .ok_or_else(|| ServiceError::invalid("layers", names))
    }
}

fn no_such_layer(name: &str, locator: &str) -> ServiceError {
    ServiceError::parameter(
        ExceptionCode::InvalidParameterValue,
        Some(locator),
        format!("No such layer: {}", name),
    )
}
