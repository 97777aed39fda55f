//! GetTile: zoom/row/column-driven requests.
//!
//! ```text
//! LAYER, TILEMATRIX, TILEROW, TILECOL, FORMAT
//!        │
//!        ▼
//!  find layer ─▶ parse zoom/row/col ─▶ validate_address ─▶ TileFetcher
//!                                                             │
//!                      detected == FORMAT ? as-is : TranscodeCache
//! ```

use std::sync::Arc;

use http::header::CONTENT_TYPE;
use http::HeaderValue;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::map::Srs;
use super::params::{parse_strict, QueryParams};
use super::response::{set_length_and_etag, ResponseEnvelope};
use crate::error::{ExceptionCode, FetchError, ServiceError};
use crate::geometry::validate_address;
use crate::imaging::{ImageFormat, RasterCodec, TranscodeCache};
use crate::layer::LayerRegistry;

/// Required GetTile parameters, checked in this order.
const REQUIRED: [&str; 5] = ["layer", "tilematrix", "tilerow", "tilecol", "format"];

/// A parsed GetTile request. Zoom, row and column are validated later
/// against the layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRequest {
    pub layer: String,
    pub format: ImageFormat,
    pub zoom: i64,
    pub row: i64,
    pub col: i64,
}

impl TileRequest {
    pub fn from_params(params: &QueryParams) -> Result<Self, ServiceError> {
        for key in REQUIRED {
            params.require(key)?;
        }
        // The tile matrix set fixes the projection; a supplied SRS must still be known
        if let Some(srs) = params.get_any(&["srs", "crs"]) {
            Srs::parse(srs)?;
        }

        let raw_format = params.require("format")?;
        let format = ImageFormat::from_mime(raw_format)
            .ok_or_else(|| ServiceError::invalid("format", raw_format))?;

        let matrix = params.require("tilematrix")?;
        let zoom_text = matrix.rsplit(':').next().unwrap_or(matrix);

        Ok(Self {
            layer: params.require("layer")?.to_string(),
            format,
            zoom: parse_strict("tilematrix", zoom_text)?,
            row: params.parse("tilerow")?,
            col: params.parse("tilecol")?,
        })
    }
}

/// Serves single tiles from one registered layer.
#[derive(Clone)]
pub struct TileService {
    registry: Arc<LayerRegistry>,
    transcoder: TranscodeCache,
    codec: Arc<dyn RasterCodec>,
}

impl TileService {
    pub fn new(
        registry: Arc<LayerRegistry>,
        transcoder: TranscodeCache,
        codec: Arc<dyn RasterCodec>,
    ) -> Self {
        Self {
            registry,
            transcoder,
            codec,
        }
    }

    pub async fn get_tile(
        &self,
        params: &QueryParams,
        cancel: &CancellationToken,
    ) -> Result<ResponseEnvelope, ServiceError> {
        let request = TileRequest::from_params(params)?;
        let layer = self.registry.find(&request.layer)?;

        if !layer.formats().contains(&request.format) {
            return Err(ServiceError::invalid("format", request.format.mime()));
        }

        let addr = validate_address(
            layer.bbox(),
            layer.range(),
            request.zoom,
            request.col,
            request.row,
        )
        .map_err(|axis| {
            ServiceError::parameter(
                ExceptionCode::TileOutOfRange,
                Some(axis.locator()),
                format!("{} is out of range", axis.locator()),
            )
        })?;

        let tile = match layer.fetcher().fetch(addr, cancel).await {
            Ok(tile) => tile,
            Err(FetchError::Cancelled) => return Err(ServiceError::Cancelled),
            Err(e) => {
                debug!(layer = layer.name(), tile = %addr, error = %e, "Tile fetch failed");
                return Err(ServiceError::NotFound {
                    message: "tile is not available".to_string(),
                });
            }
        };

        let detected = self.codec.detect(&tile.data)?;
        let mut headers = tile.headers;

        if detected == request.format {
            // Upstream labels (e.g. S3 `binary/octet-stream`) are not trusted.
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(detected.mime()));
            set_length_and_etag(&mut headers, &tile.data, false);
            return Ok(ResponseEnvelope::ok(tile.data, headers));
        }

        debug!(
            layer = layer.name(),
            tile = %addr,
            from = detected.mime(),
            to = request.format.mime(),
            "Transcoding tile"
        );
        let data = self
            .transcoder
            .transcode(&tile.data, request.format, cancel)
            .await?;

        headers.insert(CONTENT_TYPE, HeaderValue::from_static(request.format.mime()));
        set_length_and_etag(&mut headers, &data, true);
        Ok(ResponseEnvelope::ok(data, headers))
    }
}
