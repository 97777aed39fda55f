//! Command-line configuration.
//!
//! Every option can also be set through an environment variable with the
//! `OGC_` prefix:
//!
//! - `OGC_HOST` - Server bind address (default: 0.0.0.0)
//! - `OGC_PORT` - Server port (default: 3000)
//! - `OGC_LAYERS` - Path of the JSON layers file (required)
//! - `OGC_PUBLIC_URL` - Base URL written into capabilities documents
//! - `OGC_CACHE_SIZE` - Transcode cache capacity in bytes (default: 20MB)
//! - `OGC_MAX_LAYERS` - Layers allowed in one GetMap request (default: 10)
//! - `OGC_MAX_PIXEL_AREA` - Largest map canvas in pixels (default: 4096x4096)
//! - `OGC_FETCH_TIMEOUT_MS` - Deadline of one tile fetch attempt (default: 10000)
//! - `OGC_FETCH_CONCURRENCY` - Tiles fetched at once per map (default: 8)
//! - `OGC_JPEG_QUALITY` - JPEG encoding quality (default: 80)
//! - `OGC_DEV_MODE` - Expose internal error messages (default: false)
//! - `OGC_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `OGC_CORS_ORIGINS` - Allowed CORS origins, comma-separated (default: any)

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::imaging::{
    DEFAULT_FETCH_CONCURRENCY, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_PIXEL_AREA, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};
use crate::layer::DEFAULT_MAX_LAYERS;
use crate::service::ServiceConfig;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

/// Default deadline of a single fetch attempt in milliseconds.
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;

// =============================================================================
// CLI Arguments
// =============================================================================

/// OGC Tile Server - WMS and WMTS over pluggable raster tile sources.
#[derive(Parser, Debug, Clone)]
#[command(name = "ogc-tile-server")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the WMS/WMTS server.
    Serve(ServeConfig),

    /// Load and validate a layers file, then print what it describes.
    Check(CheckConfig),
}

/// Options of `serve`.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "OGC_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "OGC_PORT")]
    pub port: u16,

    /// JSON file describing the service and its layers.
    #[arg(long, env = "OGC_LAYERS")]
    pub layers: PathBuf,

    /// Base URL clients use to reach this server.
    ///
    /// Defaults to http://localhost:<port>.
    #[arg(long, env = "OGC_PUBLIC_URL")]
    pub public_url: Option<String>,

    // =========================================================================
    // Pipeline Configuration
    // =========================================================================
    /// Transcode cache capacity in bytes.
    #[arg(long, default_value_t = DEFAULT_CACHE_CAPACITY, env = "OGC_CACHE_SIZE")]
    pub cache_size: usize,

    /// Maximum number of layers in one GetMap request.
    #[arg(long, default_value_t = DEFAULT_MAX_LAYERS, env = "OGC_MAX_LAYERS")]
    pub max_layers: usize,

    /// Largest assembled map canvas, in pixels.
    #[arg(long, default_value_t = DEFAULT_MAX_PIXEL_AREA, env = "OGC_MAX_PIXEL_AREA")]
    pub max_pixel_area: u64,

    /// Deadline of one tile fetch attempt, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT_MS, env = "OGC_FETCH_TIMEOUT_MS")]
    pub fetch_timeout_ms: u64,

    /// Tiles fetched at once while assembling a map.
    #[arg(long, default_value_t = DEFAULT_FETCH_CONCURRENCY, env = "OGC_FETCH_CONCURRENCY")]
    pub fetch_concurrency: usize,

    /// JPEG quality for encoded output (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "OGC_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Include internal error messages in exception reports.
    #[arg(long, default_value_t = false, env = "OGC_DEV_MODE")]
    pub dev_mode: bool,

    // =========================================================================
    // HTTP Configuration
    // =========================================================================
    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "OGC_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "OGC_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.layers.as_os_str().is_empty() {
            return Err("A layers file is required. Set --layers or OGC_LAYERS".to_string());
        }

        if let Some(url) = &self.public_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("public_url must be an http(s) URL, got '{}'", url));
            }
        }

        if self.cache_size == 0 {
            return Err("cache_size must be greater than 0".to_string());
        }
        if self.max_layers == 0 {
            return Err("max_layers must be greater than 0".to_string());
        }
        if self.max_pixel_area < 256 * 256 {
            return Err("max_pixel_area must be at least one tile (65536)".to_string());
        }
        if self.fetch_timeout_ms == 0 {
            return Err("fetch_timeout_ms must be greater than 0".to_string());
        }
        if self.fetch_concurrency == 0 {
            return Err("fetch_concurrency must be greater than 0".to_string());
        }
        if !(MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&self.jpeg_quality) {
            return Err(format!(
                "jpeg_quality must be between {} and {}",
                MIN_JPEG_QUALITY, MAX_JPEG_QUALITY
            ));
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn public_url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.port))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            public_url: self.public_url(),
            max_layers: self.max_layers,
            max_pixel_area: self.max_pixel_area,
            fetch_concurrency: self.fetch_concurrency,
            cache_size: self.cache_size,
            jpeg_quality: self.jpeg_quality,
            dev_mode: self.dev_mode,
        }
    }
}

/// Options of `check`.
#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    /// JSON file describing the service and its layers.
    #[arg(long, env = "OGC_LAYERS")]
    pub layers: PathBuf,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ServeConfig {
        ServeConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            layers: PathBuf::from("layers.json"),
            public_url: None,
            cache_size: DEFAULT_CACHE_CAPACITY,
            max_layers: 5,
            max_pixel_area: DEFAULT_MAX_PIXEL_AREA,
            fetch_timeout_ms: 2500,
            fetch_concurrency: 4,
            jpeg_quality: 85,
            dev_mode: false,
            cache_max_age: 7200,
            cors_origins: None,
            verbose: false,
            no_tracing: false,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_missing_layers_file() {
        let mut config = test_config();
        config.layers = PathBuf::new();
        let result = config.validate();
        assert!(result.unwrap_err().contains("layers"));
    }

    #[test]
    fn test_invalid_limits() {
        let mut config = test_config();
        config.cache_size = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.max_layers = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.max_pixel_area = 100;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.fetch_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.fetch_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_jpeg_quality() {
        let mut config = test_config();
        config.jpeg_quality = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.jpeg_quality = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_public_url() {
        let mut config = test_config();
        assert_eq!(config.public_url(), "http://localhost:8080");

        config.public_url = Some("https://maps.example.com".to_string());
        assert!(config.validate().is_ok());
        assert_eq!(config.service_config().public_url, "https://maps.example.com");

        config.public_url = Some("maps.example.com".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bind_address_and_timeout() {
        let config = test_config();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.fetch_timeout(), Duration::from_millis(2500));
    }

    #[test]
    fn test_parse_serve_command() {
        let cli = Cli::try_parse_from([
            "ogc-tile-server",
            "serve",
            "--layers",
            "conf/layers.json",
            "--port",
            "9000",
            "--cors-origins",
            "https://a.example,https://b.example",
            "--dev-mode",
        ])
        .unwrap();

        match cli.into_command() {
            Command::Serve(config) => {
                assert_eq!(config.port, 9000);
                assert_eq!(config.layers, PathBuf::from("conf/layers.json"));
                assert_eq!(config.cors_origins.as_ref().map(Vec::len), Some(2));
                assert!(config.dev_mode);
                assert_eq!(config.max_layers, DEFAULT_MAX_LAYERS);
            }
            other => panic!("Expected serve, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_check_command() {
        let cli = Cli::try_parse_from(["ogc-tile-server", "check", "--layers", "l.json"]).unwrap();
        assert!(matches!(cli.into_command(), Command::Check(c) if c.layers == PathBuf::from("l.json")));
    }
}
