//! Layers and their tile sources.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              LayerRegistry               │
//! │   (built once from the layers file)      │
//! └─────────────────────┬────────────────────┘
//!                       │ find / resolve
//!                       ▼
//! ┌──────────────────────────────────────────┐
//! │     MapLayer (Concrete | Composite)      │
//! └─────────────────────┬────────────────────┘
//!                       │ TileFetcher
//!                       ▼
//! ┌──────────────────────────────────────────┐
//! │            TileSource trait              │
//! └──────────┬───────────────────┬───────────┘
//!            ▼                   ▼
//!    ┌───────────────┐   ┌───────────────┐
//!    │HttpTileSource │   │ S3TileSource  │
//!    └───────────────┘   └───────────────┘
//! ```

mod file;
mod http_source;
mod map_layer;
mod registry;
mod s3_source;
mod source;

pub use file::{LayerDefinition, LayersFile, SourceDefinition};
pub use http_source::HttpTileSource;
pub use map_layer::{CompositeLayer, ConcreteLayer, MapLayer};
pub use registry::{LayerRegistry, ServiceInfo, DEFAULT_MAX_LAYERS};
pub use s3_source::{create_s3_client, S3TileSource};
pub use source::{RawTile, TileSource};
