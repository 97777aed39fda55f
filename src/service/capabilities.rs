//! GetCapabilities documents.
//!
//! Both documents are rendered from the registry's visible layers on first
//! request and reused afterwards; the registry does not change at runtime.

use std::collections::BTreeSet;
use std::fmt::{self, Write};
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;

use super::params::QueryParams;
use super::response::{escape_xml, ResponseEnvelope};
use crate::error::{ExceptionCode, ServiceError};
use crate::geometry::{forward, tile_bounds, ZoomRange, MAX_EXTENT, TILE_SIZE};
use crate::imaging::ImageFormat;
use crate::layer::{ConcreteLayer, LayerRegistry};

/// Scale denominator of zoom 0 for 256px tiles at 0.28mm per pixel.
const ZOOM0_SCALE_DENOMINATOR: f64 = 559_082_264.028_717_8;

/// Output formats offered by GetMap.
const MAP_FORMATS: [ImageFormat; 3] = [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Webp];

/// Which OGC service a capabilities request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OgcKind {
    Wms,
    Wmts,
}

impl OgcKind {
    pub fn parse(value: Option<&str>) -> Result<Self, ServiceError> {
        let value = value.ok_or_else(|| ServiceError::missing("service"))?;
        match value.to_lowercase().as_str() {
            "wms" => Ok(OgcKind::Wms),
            "wmts" => Ok(OgcKind::Wmts),
            _ => Err(ServiceError::parameter(
                ExceptionCode::InvalidParameterValue,
                Some("SERVICE"),
                format!("unknown service: {}", value),
            )),
        }
    }
}

/// Renders and caches the WMS and WMTS capabilities documents.
pub struct CapabilitiesService {
    registry: Arc<LayerRegistry>,
    public_url: String,
    max_layers: usize,
    wms: OnceCell<ResponseEnvelope>,
    wmts: OnceCell<ResponseEnvelope>,
}

impl CapabilitiesService {
    pub fn new(registry: Arc<LayerRegistry>, public_url: &str, max_layers: usize) -> Self {
        Self {
            registry,
            public_url: public_url.trim_end_matches('/').to_string(),
            max_layers,
            wms: OnceCell::new(),
            wmts: OnceCell::new(),
        }
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    pub async fn get_capabilities(&self, params: &QueryParams) -> Result<ResponseEnvelope, ServiceError> {
        let kind = OgcKind::parse(params.get("service"))?;
        let cell = match kind {
            OgcKind::Wms => &self.wms,
            OgcKind::Wmts => &self.wmts,
        };

        let envelope = cell
            .get_or_try_init(|| async {
                let document = match kind {
                    OgcKind::Wms => self.render_wms(),
                    OgcKind::Wmts => self.render_wmts(),
                }
                .map_err(|e| ServiceError::internal(format!("capabilities rendering failed: {}", e)))?;
                info!(service = ?kind, bytes = document.len(), "Rendered capabilities document");
                Ok::<_, ServiceError>(ResponseEnvelope::xml(document))
            })
            .await?;
        Ok(envelope.clone())
    }

    fn visible(&self) -> Vec<&Arc<ConcreteLayer>> {
        self.registry.visible().collect()
    }

    fn render_wms(&self) -> Result<String, fmt::Error> {
        let info = self.registry.info();
        let href = format!("{}/wms?", self.public_url);
        let mut out = String::new();

        writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
        writeln!(
            out,
            r#"<WMS_Capabilities version="1.3.0" xmlns="http://www.opengis.net/wms" xmlns:xlink="http://www.w3.org/1999/xlink">"#
        )?;
        writeln!(out, "  <Service>")?;
        writeln!(out, "    <Name>WMS</Name>")?;
        writeln!(out, "    <Title>{}</Title>", escape_xml(&info.title))?;
        writeln!(out, "    <Abstract>{}</Abstract>", escape_xml(&info.abstract_text))?;
        writeln!(
            out,
            r#"    <OnlineResource xlink:type="simple" xlink:href="{}"/>"#,
            escape_xml(&href)
        )?;
        writeln!(out, "    <LayerLimit>{}</LayerLimit>", self.max_layers)?;
        writeln!(out, "  </Service>")?;

        writeln!(out, "  <Capability>")?;
        writeln!(out, "    <Request>")?;
        write_wms_operation(&mut out, "GetCapabilities", &["text/xml"], &href)?;
        let formats: Vec<&str> = MAP_FORMATS.iter().map(ImageFormat::mime).collect();
        write_wms_operation(&mut out, "GetMap", &formats, &href)?;
        writeln!(out, "    </Request>")?;
        writeln!(out, "    <Exception><Format>XML</Format></Exception>")?;

        writeln!(out, "    <Layer>")?;
        writeln!(out, "      <Title>{}</Title>", escape_xml(&info.title))?;
        for crs in ["EPSG:3857", "EPSG:900913", "EPSG:4326"] {
            writeln!(out, "      <CRS>{}</CRS>", crs)?;
        }
        for layer in self.visible() {
            let bbox = layer.bbox();
            let (min_x, min_y) = forward(bbox.min_lon, bbox.min_lat);
            let (max_x, max_y) = forward(bbox.max_lon, bbox.max_lat);

            writeln!(out, r#"      <Layer queryable="0" opaque="0">"#)?;
            writeln!(out, "        <Name>{}</Name>", escape_xml(layer.name()))?;
            writeln!(out, "        <Title>{}</Title>", escape_xml(layer.title()))?;
            writeln!(out, "        <EX_GeographicBoundingBox>")?;
            writeln!(out, "          <westBoundLongitude>{}</westBoundLongitude>", bbox.min_lon)?;
            writeln!(out, "          <eastBoundLongitude>{}</eastBoundLongitude>", bbox.max_lon)?;
            writeln!(out, "          <southBoundLatitude>{}</southBoundLatitude>", bbox.min_lat)?;
            writeln!(out, "          <northBoundLatitude>{}</northBoundLatitude>", bbox.max_lat)?;
            writeln!(out, "        </EX_GeographicBoundingBox>")?;
            writeln!(
                out,
                r#"        <BoundingBox CRS="EPSG:3857" minx="{}" miny="{}" maxx="{}" maxy="{}"/>"#,
                min_x, min_y, max_x, max_y
            )?;
            writeln!(
                out,
                r#"        <BoundingBox CRS="EPSG:4326" minx="{}" miny="{}" maxx="{}" maxy="{}"/>"#,
                bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat
            )?;
            writeln!(out, "      </Layer>")?;
        }
        writeln!(out, "    </Layer>")?;
        writeln!(out, "  </Capability>")?;
        writeln!(out, "</WMS_Capabilities>")?;
        Ok(out)
    }

    fn render_wmts(&self) -> Result<String, fmt::Error> {
        let info = self.registry.info();
        let href = format!("{}/wmts?", self.public_url);
        let layers = self.visible();
        let mut out = String::new();

        writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
        writeln!(
            out,
            r#"<Capabilities version="1.0.0" xmlns="http://www.opengis.net/wmts/1.0" xmlns:ows="http://www.opengis.net/ows/1.1" xmlns:xlink="http://www.w3.org/1999/xlink">"#
        )?;
        writeln!(out, "  <ows:ServiceIdentification>")?;
        writeln!(out, "    <ows:Title>{}</ows:Title>", escape_xml(&info.title))?;
        writeln!(out, "    <ows:Abstract>{}</ows:Abstract>", escape_xml(&info.abstract_text))?;
        writeln!(out, "    <ows:ServiceType>OGC WMTS</ows:ServiceType>")?;
        writeln!(out, "    <ows:ServiceTypeVersion>1.0.0</ows:ServiceTypeVersion>")?;
        writeln!(out, "  </ows:ServiceIdentification>")?;

        writeln!(out, "  <ows:OperationsMetadata>")?;
        for operation in ["GetCapabilities", "GetTile"] {
            writeln!(out, r#"    <ows:Operation name="{}">"#, operation)?;
            writeln!(
                out,
                r#"      <ows:DCP><ows:HTTP><ows:Get xlink:href="{}">"#,
                escape_xml(&href)
            )?;
            writeln!(
                out,
                "        <ows:Constraint name=\"GetEncoding\"><ows:AllowedValues><ows:Value>KVP</ows:Value></ows:AllowedValues></ows:Constraint>"
            )?;
            writeln!(out, "      </ows:Get></ows:HTTP></ows:DCP>")?;
            writeln!(out, "    </ows:Operation>")?;
        }
        writeln!(out, "  </ows:OperationsMetadata>")?;

        writeln!(out, "  <Contents>")?;
        let mut ranges = BTreeSet::new();
        for layer in &layers {
            ranges.insert((layer.range().min, layer.range().max));
            write_wmts_layer(&mut out, layer)?;
        }
        for (min, max) in ranges {
            write_tile_matrix_set(&mut out, &ZoomRange::new(min, max))?;
        }
        writeln!(out, "  </Contents>")?;
        writeln!(out, "</Capabilities>")?;
        Ok(out)
    }
}

fn write_wms_operation(out: &mut String, name: &str, formats: &[&str], href: &str) -> fmt::Result {
    writeln!(out, "      <{}>", name)?;
    for format in formats {
        writeln!(out, "        <Format>{}</Format>", format)?;
    }
    writeln!(
        out,
        r#"        <DCPType><HTTP><Get><OnlineResource xlink:type="simple" xlink:href="{}"/></Get></HTTP></DCPType>"#,
        escape_xml(href)
    )?;
    writeln!(out, "      </{}>", name)
}

fn write_wmts_layer(out: &mut String, layer: &ConcreteLayer) -> fmt::Result {
    let bbox = layer.bbox();
    let range = layer.range();
    let set = range.tile_matrix_set();

    writeln!(out, "    <Layer>")?;
    writeln!(out, "      <ows:Title>{}</ows:Title>", escape_xml(layer.title()))?;
    writeln!(out, "      <ows:Identifier>{}</ows:Identifier>", escape_xml(layer.name()))?;
    writeln!(out, "      <ows:WGS84BoundingBox>")?;
    writeln!(out, "        <ows:LowerCorner>{} {}</ows:LowerCorner>", bbox.min_lon, bbox.min_lat)?;
    writeln!(out, "        <ows:UpperCorner>{} {}</ows:UpperCorner>", bbox.max_lon, bbox.max_lat)?;
    writeln!(out, "      </ows:WGS84BoundingBox>")?;
    writeln!(
        out,
        r#"      <Style isDefault="true"><ows:Identifier>default</ows:Identifier></Style>"#
    )?;
    for format in layer.formats() {
        writeln!(out, "      <Format>{}</Format>", format.mime())?;
    }
    writeln!(out, "      <TileMatrixSetLink>")?;
    writeln!(out, "        <TileMatrixSet>{}</TileMatrixSet>", set)?;
    writeln!(out, "        <TileMatrixSetLimits>")?;
    for zoom in range.min..=range.max {
        let limits = tile_bounds(bbox, zoom);
        writeln!(out, "          <TileMatrixLimits>")?;
        writeln!(out, "            <TileMatrix>{}:{}</TileMatrix>", set, zoom)?;
        writeln!(out, "            <MinTileRow>{}</MinTileRow>", limits.min_row)?;
        writeln!(out, "            <MaxTileRow>{}</MaxTileRow>", limits.max_row)?;
        writeln!(out, "            <MinTileCol>{}</MinTileCol>", limits.min_col)?;
        writeln!(out, "            <MaxTileCol>{}</MaxTileCol>", limits.max_col)?;
        writeln!(out, "          </TileMatrixLimits>")?;
    }
    writeln!(out, "        </TileMatrixSetLimits>")?;
    writeln!(out, "      </TileMatrixSetLink>")?;
    writeln!(out, "    </Layer>")
}

fn write_tile_matrix_set(out: &mut String, range: &ZoomRange) -> fmt::Result {
    let set = range.tile_matrix_set();
    writeln!(out, "    <TileMatrixSet>")?;
    writeln!(out, "      <ows:Identifier>{}</ows:Identifier>", set)?;
    writeln!(out, "      <ows:SupportedCRS>urn:ogc:def:crs:EPSG::3857</ows:SupportedCRS>")?;
    for zoom in range.min..=range.max {
        let matrix = 1u64 << zoom;
        writeln!(out, "      <TileMatrix>")?;
        writeln!(out, "        <ows:Identifier>{}:{}</ows:Identifier>", set, zoom)?;
        writeln!(
            out,
            "        <ScaleDenominator>{}</ScaleDenominator>",
            ZOOM0_SCALE_DENOMINATOR / matrix as f64
        )?;
        writeln!(out, "        <TopLeftCorner>{} {}</TopLeftCorner>", -MAX_EXTENT, MAX_EXTENT)?;
        writeln!(out, "        <TileWidth>{}</TileWidth>", TILE_SIZE)?;
        writeln!(out, "        <TileHeight>{}</TileHeight>", TILE_SIZE)?;
        writeln!(out, "        <MatrixWidth>{}</MatrixWidth>", matrix)?;
        writeln!(out, "        <MatrixHeight>{}</MatrixHeight>", matrix)?;
        writeln!(out, "      </TileMatrix>")?;
    }
    writeln!(out, "    </TileMatrixSet>")
}
