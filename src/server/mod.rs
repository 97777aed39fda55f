//! HTTP server layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │              GET /wms | /wmts | /ows ?REQUEST=...               │
//! │                                                                 │
//! │  ┌──────────────────────────────┐  ┌─────────────────────────┐  │
//! │  │          handlers            │  │         routes          │  │
//! │  │ (query -> OgcService::handle)│  │ (router, CORS, tracing) │  │
//! │  └──────────────────────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    health_handler, layers_handler, ogc_handler, AppState, HealthResponse, LayerSummary,
    LayersResponse,
};
pub use routes::{create_router, RouterConfig};
