//! GetMap: bbox-driven rendering.
//!
//! ```text
//! LAYERS, BBOX, WIDTH, HEIGHT, FORMAT, SRS|CRS [, DPI, BGCOLOR, TRANSPARENT]
//!        │
//!        ▼
//!  validate ─▶ resolve layers ─▶ select_zoom ─▶ TileGridAssembler ◀─┐
//!                                                   │ TooLarge      │
//!                                                   └── zoom - 1 ───┘
//!        resize to WIDTH x HEIGHT ─▶ encode ─▶ envelope
//! ```

use std::sync::Arc;

use image::GenericImageView;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::params::QueryParams;
use super::response::ResponseEnvelope;
use crate::error::{AssemblyError, ExceptionCode, ServiceError};
use crate::fetch::Compositor;
use crate::geometry::{select_zoom, GeoBBox};
use crate::imaging::{
    offload, BlankColor, Fill, GridRequest, ImageFormat, RasterCodec, TileGridAssembler,
};
use crate::layer::LayerRegistry;

/// Upper bound on the DPI-derived scale factor.
pub const MAX_SCALE: u32 = 16;

const DEFAULT_BGCOLOR: &str = "0xffffff";

/// Reference system of the BBOX parameter.
///
/// Accepts `EPSG:3857`, its legacy alias `EPSG:900913`, and `EPSG:4326`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Srs {
    Mercator,
    Geographic,
}

impl Srs {
    pub fn parse(value: &str) -> Result<Self, ServiceError> {
        match value.trim().to_lowercase().as_str() {
            "epsg:900913" | "epsg:3857" => Ok(Srs::Mercator),
            "epsg:4326" => Ok(Srs::Geographic),
            _ => Err(ServiceError::parameter(
                ExceptionCode::InvalidSrs,
                Some("SRS"),
                format!("invalid srs: {}", value),
            )),
        }
    }
}

/// Output pixels per source pixel for a requested DPI.
///
/// `round(72 / dpi)`; anything that is not a positive finite number, or a
/// missing DPI, gives 1.
pub fn scale_for_dpi(dpi: Option<&str>) -> u32 {
    let Some(dpi) = dpi.and_then(|d| d.trim().parse::<f64>().ok()) else {
        return 1;
    };
    let scale = (72.0 / dpi).round();
    if scale.is_finite() && scale >= 1.0 {
        (scale as u32).min(MAX_SCALE)
    } else {
        1
    }
}

/// Parse `minx,miny,maxx,maxy`.
pub fn parse_bbox(raw: &str) -> Result<[f64; 4], ServiceError> {
    let values: Vec<f64> = raw
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| ServiceError::invalid("bbox", raw))?;

    match values.as_slice() {
        [min_x, min_y, max_x, max_y]
            if values.iter().all(|v| v.is_finite()) && min_x < max_x && min_y < max_y =>
        {
            Ok([*min_x, *min_y, *max_x, *max_y])
        }
        _ => Err(ServiceError::invalid("bbox", raw)),
    }
}

/// A validated GetMap request, before layer resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct MapRequest {
    pub layers: String,
    pub bbox: GeoBBox,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub scale: u32,
    pub fill: Fill,
}

impl MapRequest {
    pub fn from_params(params: &QueryParams) -> Result<Self, ServiceError> {
        let layers = params.require("layers")?;
        let raw_bbox = params.require("bbox")?;
        let raw_width = params.require("width")?;
        let raw_height = params.require("height")?;
        let raw_format = params.require("format")?;
        let srs = params
            .get_any(&["srs", "crs"])
            .ok_or_else(|| ServiceError::missing("srs"))?;

        let srs = Srs::parse(srs)?;
        let format = ImageFormat::from_mime(raw_format)
            .ok_or_else(|| ServiceError::invalid("format", raw_format))?;
        let scale = scale_for_dpi(params.get_any(&["dpi", "map_resolution"]));

        let transparent = params
            .get("transparent")
            .is_some_and(|t| t.eq_ignore_ascii_case("true"));
        let color = if transparent && format == ImageFormat::Png {
            BlankColor::Transparent
        } else {
            BlankColor::parse(params.get("bgcolor").unwrap_or(DEFAULT_BGCOLOR))
        };

        let [min_x, min_y, max_x, max_y] = parse_bbox(raw_bbox)?;
        let bbox = match srs {
            Srs::Geographic => GeoBBox::new(min_x, min_y, max_x, max_y),
            Srs::Mercator => GeoBBox::from_mercator(min_x, min_y, max_x, max_y),
        };
        if !bbox.is_valid() {
            return Err(ServiceError::invalid("bbox", raw_bbox));
        }

        Ok(Self {
            layers: layers.to_string(),
            bbox,
            width: positive("width", raw_width)?,
            height: positive("height", raw_height)?,
            format,
            scale,
            fill: Fill::new(color, format),
        })
    }
}

fn positive(key: &str, raw: &str) -> Result<u32, ServiceError> {
    match raw.trim().parse::<u32>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(ServiceError::invalid(key, raw)),
    }
}

/// Renders map images out of layer tiles.
#[derive(Clone)]
pub struct MapService {
    registry: Arc<LayerRegistry>,
    compositor: Compositor,
    assembler: TileGridAssembler,
    codec: Arc<dyn RasterCodec>,
    max_layers: usize,
}

impl MapService {
    pub fn new(
        registry: Arc<LayerRegistry>,
        compositor: Compositor,
        assembler: TileGridAssembler,
        codec: Arc<dyn RasterCodec>,
        max_layers: usize,
    ) -> Self {
        Self {
            registry,
            compositor,
            assembler,
            codec,
            max_layers,
        }
    }

    pub async fn get_map(
        &self,
        params: &QueryParams,
        cancel: &CancellationToken,
    ) -> Result<ResponseEnvelope, ServiceError> {
        let request = MapRequest::from_params(params)?;
        let layer = self.registry.resolve(&request.layers, self.max_layers)?;

        let requested_area = request.width as u64 * request.height as u64;
        if requested_area > self.assembler.max_area() {
            return Err(AssemblyError::TooLarge {
                width: request.width as u64,
                height: request.height as u64,
                max_area: self.assembler.max_area(),
            }
            .into());
        }

        let range = *layer.range();
        let mut zoom = select_zoom(
            &request.bbox,
            request.width,
            request.height,
            Some(range.min),
            Some(range.max),
        );
        debug!(
            layer = layer.name(),
            zoom,
            scale = request.scale,
            width = request.width,
            height = request.height,
            "Rendering map"
        );

        let fill = request.fill;
        let canvas = loop {
            let grid = GridRequest {
                bbox: request.bbox,
                zoom,
                scale: request.scale,
                background: fill.canvas_rgba(),
            };
            let result = self
                .assembler
                .assemble(
                    &grid,
                    |z, c, r| self.compositor.map_tile(&layer, z, c, r, fill, cancel),
                    cancel,
                )
                .await;

            match result {
                Err(AssemblyError::TooLarge { .. }) if zoom > range.min => {
                    debug!(zoom, "Canvas too large, lowering zoom");
                    zoom -= 1;
                }
                other => break other?,
            }
        };

        if cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }
        let (width, height) = (request.width, request.height);
        let image = if canvas.dimensions() != (width, height) {
            let codec = self.codec.clone();
            offload(move || Ok(codec.resize(&canvas, width, height))).await?
        } else {
            canvas
        };
        if cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }

        let codec = self.codec.clone();
        let format = request.format;
        let data = offload(move || codec.encode(&image, format)).await?;
        Ok(ResponseEnvelope::image(data, request.format))
    }
}
