use std::fmt;

use thiserror::Error;

/// Errors produced while fetching a single raw tile from a layer source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The source did not answer within the attempt deadline
    #[error("Tile source timed out")]
    Timeout,

    /// The source has no tile at this address
    #[error("Tile not found: {0}")]
    NotFound(String),

    /// Any other upstream failure (HTTP status, S3 error, connection reset)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The request's cancellation token fired before the fetch finished
    #[error("Fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether this error qualifies for the single timeout retry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

/// Errors from the raster codec (decode, encode, resize, blend).
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// Byte signature matches no supported image format
    #[error("Unknown image type")]
    UnknownFormat,

    /// Failed to decode source image
    #[error("Failed to decode image: {message}")]
    Decode { message: String },

    /// Failed to encode output image
    #[error("Failed to encode image: {message}")]
    Encode { message: String },

    /// Failed to blend a stack of images
    #[error("Failed to blend images: {message}")]
    Blend { message: String },

    /// The blocking codec task panicked or was aborted
    #[error("Codec task failed: {message}")]
    Task { message: String },
}

/// Errors from stitching a canvas out of tiles.
#[derive(Debug, Clone, Error)]
pub enum AssemblyError {
    /// The canvas at the lowest allowed zoom still exceeds the pixel-area bound
    #[error("Desired image is too large: {width}x{height} exceeds {max_area} pixels")]
    TooLarge {
        width: u64,
        height: u64,
        max_area: u64,
    },

    #[error("Assembly cancelled")]
    Cancelled,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors from the transcode cache.
#[derive(Debug, Clone, Error)]
pub enum TranscodeError {
    #[error("Transcode cancelled")]
    Cancelled,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors raised while loading the layers file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read layers file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse layers file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid layer configuration: {0}")]
    Invalid(String),
}

/// OGC exception codes carried by the `exceptionCode` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionCode {
    MissingParameterValue,
    InvalidParameterValue,
    InvalidSrs,
    TileOutOfRange,
    LayerNotDefined,
    OperationNotSupported,
    NoApplicableCode,
}

impl ExceptionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionCode::MissingParameterValue => "MissingParameterValue",
            ExceptionCode::InvalidParameterValue => "InvalidParameterValue",
            ExceptionCode::InvalidSrs => "InvalidSRS",
            ExceptionCode::TileOutOfRange => "TileOutOfRange",
            ExceptionCode::LayerNotDefined => "LayerNotDefined",
            ExceptionCode::OperationNotSupported => "OperationNotSupported",
            ExceptionCode::NoApplicableCode => "NoApplicableCode",
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal errors of a WMS/WMTS request.
///
/// These never escape an orchestrator: they are rendered into a
/// [`ResponseEnvelope`](crate::service::ResponseEnvelope) by
/// [`ServiceErrors::render`](crate::service::ServiceErrors::render).
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// Missing or invalid request parameter (HTTP 400)
    #[error("{message}")]
    Parameter {
        code: ExceptionCode,
        locator: Option<String>,
        message: String,
    },

    /// Layer or composite member is not viewable (HTTP 401)
    #[error("not authorized")]
    Unauthorized,

    /// Tile could not be retrieved (HTTP 404)
    #[error("{message}")]
    NotFound { message: String },

    /// Unexpected failure (HTTP 500)
    #[error("{message}")]
    Internal { message: String },

    /// The request's cancellation token fired (HTTP 500)
    #[error("request cancelled")]
    Cancelled,
}

impl ServiceError {
    pub fn missing(param: &str) -> Self {
        ServiceError::Parameter {
            code: ExceptionCode::MissingParameterValue,
            locator: Some(param.to_uppercase()),
            message: format!("missing required parameter: {}", param.to_lowercase()),
        }
    }

    pub fn invalid(param: &str, value: &str) -> Self {
        ServiceError::Parameter {
            code: ExceptionCode::InvalidParameterValue,
            locator: Some(param.to_uppercase()),
            message: format!(
                "Invalid parameter value for {}: {}",
                param.to_uppercase(),
                value
            ),
        }
    }

    pub fn parameter(code: ExceptionCode, locator: Option<&str>, message: impl Into<String>) -> Self {
        ServiceError::Parameter {
            code,
            locator: locator.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ServiceError::Internal {
            message: message.into(),
        }
    }
}

impl From<CodecError> for ServiceError {
    fn from(err: CodecError) -> Self {
        ServiceError::internal(err.to_string())
    }
}

impl From<AssemblyError> for ServiceError {
    fn from(err: AssemblyError) -> Self {
        match err {
            AssemblyError::Cancelled => ServiceError::Cancelled,
            AssemblyError::TooLarge { .. } => ServiceError::parameter(
                ExceptionCode::InvalidParameterValue,
                Some("WIDTH"),
                err.to_string(),
            ),
            AssemblyError::Codec(codec) => codec.into(),
        }
    }
}

impl From<TranscodeError> for ServiceError {
    fn from(err: TranscodeError) -> Self {
        match err {
            TranscodeError::Cancelled => ServiceError::Cancelled,
            TranscodeError::Codec(codec) => codec.into(),
        }
    }
}
