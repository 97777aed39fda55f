//! S3-backed tile source.
//!
//! Tiles are stored one object per tile under `{prefix}/{z}/{x}/{y}.{ext}` in
//! S3 or an S3-compatible store (MinIO, R2, ...).

use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::Client;
use http::header::{CONTENT_TYPE, ETAG};
use http::{HeaderMap, HeaderValue};
use tokio_util::sync::CancellationToken;

use super::source::{RawTile, TileSource};
use crate::error::FetchError;
use crate::geometry::TileAddress;

/// S3-backed implementation of [`TileSource`].
#[derive(Clone)]
pub struct S3TileSource {
    client: Client,
    bucket: String,
    prefix: String,
    extension: String,
}

impl S3TileSource {
    /// Create a source reading `bucket`, with keys below `prefix`.
    ///
    /// Leading and trailing slashes of `prefix` are ignored.
    pub fn new(client: Client, bucket: String, prefix: &str, extension: &str) -> Self {
        Self {
            client,
            bucket,
            prefix: prefix.trim_matches('/').to_string(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object key for one tile.
    pub fn key_for(&self, addr: TileAddress) -> String {
        let path = format!("{}/{}/{}.{}", addr.zoom, addr.col, addr.row, self.extension);
        if self.prefix.is_empty() {
            path
        } else {
            format!("{}/{}", self.prefix, path)
        }
    }
}

#[async_trait]
impl TileSource for S3TileSource {
    async fn get_tile(
        &self,
        addr: TileAddress,
        cancel: &CancellationToken,
    ) -> Result<RawTile, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let key = self.key_for(addr);
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                if matches!(e, SdkError::TimeoutError(_)) {
                    return FetchError::Timeout;
                }

                let no_such_key = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                let status_is_404 = e
                    .raw_response()
                    .map(|r| r.status().as_u16() == 404)
                    .unwrap_or(false);

                if no_such_key || status_is_404 {
                    FetchError::NotFound(format!("s3://{}/{}", self.bucket, key))
                } else {
                    FetchError::Upstream(e.to_string())
                }
            })?;

        let mut headers = HeaderMap::new();
        if let Some(value) = resp.content_type().and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert(CONTENT_TYPE, value);
        }
        if let Some(value) = resp.e_tag().and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert(ETAG, value);
        }

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| FetchError::Upstream(e.to_string()))?
            .into_bytes();

        Ok(RawTile::with_headers(data, headers))
    }

    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }
}

/// Create an S3 client with optional custom endpoint and region.
///
/// A custom endpoint (MinIO and friends) switches to path-style addressing.
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    let sdk_config = loader.load().await;
    let builder = aws_sdk_s3::config::Builder::from(&sdk_config);
    let s3_config = if endpoint_url.is_some() {
        builder.force_path_style(true).build()
    } else {
        builder.build()
    };

    Client::from_conf(s3_config)
}
