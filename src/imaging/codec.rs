//! Raster codec.
//!
//! Decodes tile bytes into pixels and back, resizes canvases and alpha-blends
//! tile stacks. The server talks to the codec through [`RasterCodec`] so the
//! expensive paths can be observed (or replaced) in tests.
//!
//! # Design Decisions
//!
//! - **Format by signature**: the format of a payload is always read from its
//!   magic bytes, never from a self-reported content-type.
//!
//! - **JPEG drops alpha**: encoding to JPEG converts to RGB first.
//!
//! - **Blend output is PNG**: blended stacks keep their transparency.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};

use crate::error::CodecError;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

const PNG_SIGNATURE: [u8; 4] = [0x89, 0x50, 0x4E, 0x47];
const JPEG_SIGNATURE: [u8; 2] = [0xFF, 0xD8];

// =============================================================================
// Image Format
// =============================================================================

/// Output formats the server can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    /// Parse a MIME type such as `image/png` (parameters are ignored).
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_lowercase();
        match essence.as_str() {
            "image/png" => Some(ImageFormat::Png),
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }

    /// Parse a short name such as `png` or `jpg`.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim().to_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpeg" | "jpg" => Some(ImageFormat::Jpeg),
            "webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }

    /// Identify a payload by its magic bytes.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.starts_with(&PNG_SIGNATURE) {
            Some(ImageFormat::Png)
        } else if data.starts_with(&JPEG_SIGNATURE) {
            Some(ImageFormat::Jpeg)
        } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            Some(ImageFormat::Webp)
        } else {
            None
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Webp => "webp",
        }
    }

    /// True if the format has no transparency channel at all.
    ///
    /// A tile in such a format fully covers everything beneath it.
    pub fn is_opaque(&self) -> bool {
        matches!(self, ImageFormat::Jpeg)
    }
}

// =============================================================================
// Codec Trait
// =============================================================================

/// Decode/encode/resize/blend operations over tile bytes.
pub trait RasterCodec: Send + Sync {
    /// Identify the format of `data` from its byte signature.
    fn detect(&self, data: &[u8]) -> Result<ImageFormat, CodecError> {
        ImageFormat::detect(data).ok_or(CodecError::UnknownFormat)
    }

    fn decode(&self, data: &[u8]) -> Result<DynamicImage, CodecError>;

    fn encode(&self, image: &DynamicImage, format: ImageFormat) -> Result<Bytes, CodecError>;

    /// Resize to exactly `width` x `height`, ignoring aspect ratio.
    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage;

    /// Alpha-blend `layers` (bottom-most first) into one PNG of the given size.
    fn blend(&self, layers: &[Bytes], width: u32, height: u32) -> Result<Bytes, CodecError>;
}

/// Run codec work on the blocking thread pool.
///
/// Decode, encode, resize and blend are CPU-bound and must not run on the
/// async worker threads.
pub async fn offload<T, F>(work: F) -> Result<T, CodecError>
where
    F: FnOnce() -> Result<T, CodecError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CodecError::Task {
            message: e.to_string(),
        })?
}

// =============================================================================
// image-crate Codec
// =============================================================================

/// [`RasterCodec`] backed by the `image` crate.
#[derive(Debug, Clone)]
pub struct ImageCodec {
    jpeg_quality: u8,
}

impl ImageCodec {
    pub fn new() -> Self {
        Self::with_quality(DEFAULT_JPEG_QUALITY)
    }

    /// Create a codec encoding JPEG at `quality` (clamped to 1-100).
    pub fn with_quality(quality: u8) -> Self {
        Self {
            jpeg_quality: quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY),
        }
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }
}

impl Default for ImageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterCodec for ImageCodec {
    fn decode(&self, data: &[u8]) -> Result<DynamicImage, CodecError> {
        image::load_from_memory(data).map_err(|e| CodecError::Decode {
            message: e.to_string(),
        })
    }

    fn encode(&self, image: &DynamicImage, format: ImageFormat) -> Result<Bytes, CodecError> {
        let mut output = Vec::new();
        let result = match format {
            ImageFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                let mut encoder = JpegEncoder::new_with_quality(&mut output, self.jpeg_quality);
                encoder.encode_image(&rgb)
            }
            ImageFormat::Png => image.write_to(&mut Cursor::new(&mut output), image::ImageFormat::Png),
            ImageFormat::Webp => DynamicImage::ImageRgba8(image.to_rgba8())
                .write_to(&mut Cursor::new(&mut output), image::ImageFormat::WebP),
        };

        result.map_err(|e| CodecError::Encode {
            message: e.to_string(),
        })?;

        Ok(Bytes::from(output))
    }

    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        image.resize_exact(width, height, FilterType::Triangle)
    }

    fn blend(&self, layers: &[Bytes], width: u32, height: u32) -> Result<Bytes, CodecError> {
        if layers.is_empty() {
            return Err(CodecError::Blend {
                message: "nothing to blend".to_string(),
            });
        }

        let mut canvas = RgbaImage::new(width, height);
        for layer in layers {
            let mut top = self.decode(layer)?;
            if top.width() != width || top.height() != height {
                top = self.resize(&top, width, height);
            }
            imageops::overlay(&mut canvas, &top.to_rgba8(), 0, 0);
        }

        self.encode(&DynamicImage::ImageRgba8(canvas), ImageFormat::Png)
    }
}

// =============================================================================
// Tests
// =============================================================================
