//! Layers file (JSON) model and validation.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::geometry::{GeoBBox, ZoomRange, DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM};
use crate::imaging::ImageFormat;

/// Top-level document of the layers file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayersFile {
    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default, rename = "abstract")]
    pub abstract_text: String,

    pub layers: Vec<LayerDefinition>,
}

/// One layer entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerDefinition {
    #[serde(alias = "identifier")]
    pub name: String,

    #[serde(default)]
    pub title: Option<String>,

    /// [minLon, minLat, maxLon, maxLat]
    #[serde(default = "default_bbox")]
    pub bbox: [f64; 4],

    /// [minZoom, maxZoom]
    #[serde(default = "default_range")]
    pub range: [u8; 2],

    #[serde(default = "default_viewable")]
    pub viewable: bool,

    /// MIME types or short names (`png`, `jpeg`, `webp`)
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,

    pub source: SourceDefinition,
}

/// Where a layer's tiles come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceDefinition {
    /// XYZ/TMS endpoint; `url` holds `{z}`, `{x}`, `{y}` or `{-y}`
    Http { url: String },

    /// One object per tile at `{prefix}/{z}/{x}/{y}.{extension}`
    S3 {
        bucket: String,
        #[serde(default)]
        prefix: String,
        #[serde(default = "default_extension")]
        extension: String,
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default = "default_region")]
        region: String,
    },
}

fn default_title() -> String {
    "OGC Tile Server".to_string()
}

fn default_bbox() -> [f64; 4] {
    GeoBBox::world().to_array()
}

fn default_range() -> [u8; 2] {
    [DEFAULT_MIN_ZOOM, DEFAULT_MAX_ZOOM]
}

fn default_viewable() -> bool {
    true
}

fn default_formats() -> Vec<String> {
    vec!["image/png".to_string(), "image/jpeg".to_string()]
}

fn default_extension() -> String {
    "png".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl LayersFile {
    /// Read, parse and validate a layers file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let file: LayersFile = serde_json::from_str(text)?;
        file.validate()?;
        Ok(file)
    }

    /// Check ordered finite envelopes, ordered zoom ranges, known formats and
    /// unique names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.layers.is_empty() {
            return Err(ConfigError::Invalid("no layers defined".to_string()));
        }

        let mut seen = HashSet::new();
        for layer in &self.layers {
            if layer.name.trim().is_empty() {
                return Err(ConfigError::Invalid("layer with empty name".to_string()));
            }
            if layer.name.contains(',') {
                return Err(ConfigError::Invalid(format!(
                    "layer name '{}' must not contain ','",
                    layer.name
                )));
            }
            if !seen.insert(layer.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate layer name '{}'",
                    layer.name
                )));
            }
            if !layer.envelope().is_valid() {
                return Err(ConfigError::Invalid(format!(
                    "layer '{}' has an invalid bbox {:?}",
                    layer.name, layer.bbox
                )));
            }
            if layer.range[0] > layer.range[1] || layer.range[1] > 30 {
                return Err(ConfigError::Invalid(format!(
                    "layer '{}' has an invalid zoom range {:?}",
                    layer.name, layer.range
                )));
            }
            layer.image_formats()?;
        }
        Ok(())
    }
}

impl LayerDefinition {
    pub fn envelope(&self) -> GeoBBox {
        GeoBBox::from(self.bbox)
    }

    pub fn zoom_range(&self) -> ZoomRange {
        ZoomRange::new(self.range[0], self.range[1])
    }

    pub fn image_formats(&self) -> Result<Vec<ImageFormat>, ConfigError> {
        self.formats
            .iter()
            .map(|f| {
                ImageFormat::from_mime(f)
                    .or_else(|| ImageFormat::from_extension(f))
                    .ok_or_else(|| {
                        ConfigError::Invalid(format!(
                            "layer '{}' lists unknown format '{}'",
                            self.name, f
                        ))
                    })
            })
            .collect()
    }
}
