//! Tile source reading from an XYZ/TMS HTTP endpoint.

use async_trait::async_trait;
use http::header::{CONTENT_TYPE, ETAG, LAST_MODIFIED};
use http::{HeaderMap, StatusCode};
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use super::source::{RawTile, TileSource};
use crate::error::FetchError;
use crate::geometry::TileAddress;

/// Headers copied from the upstream response.
const PASSTHROUGH_HEADERS: [http::header::HeaderName; 3] = [CONTENT_TYPE, ETAG, LAST_MODIFIED];

/// HTTP tile source driven by a URL template.
///
/// The template may contain `{z}`, `{x}`, `{y}` and `{-y}` (the TMS row, counted
/// from the bottom of the pyramid).
#[derive(Clone)]
pub struct HttpTileSource {
    client: Client,
    template: String,
}

impl HttpTileSource {
    pub fn new(client: Client, template: impl Into<String>) -> Self {
        Self {
            client,
            template: template.into(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Expand the URL template for one address.
    pub fn url_for(&self, addr: TileAddress) -> String {
        let rows = 1u64 << addr.zoom;
        let tms_row = rows.saturating_sub(1).saturating_sub(addr.row as u64);
        self.template
            .replace("{z}", &addr.zoom.to_string())
            .replace("{x}", &addr.col.to_string())
            .replace("{-y}", &tms_row.to_string())
            .replace("{y}", &addr.row.to_string())
    }
}

#[async_trait]
impl TileSource for HttpTileSource {
    async fn get_tile(
        &self,
        addr: TileAddress,
        cancel: &CancellationToken,
    ) -> Result<RawTile, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let url = self.url_for(addr);
        let response = self.client.get(&url).send().await.map_err(classify)?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => {
                return Err(FetchError::NotFound(url));
            }
            status => {
                return Err(FetchError::Upstream(format!("{} returned {}", url, status)));
            }
        }

        let mut headers = HeaderMap::new();
        for name in PASSTHROUGH_HEADERS {
            if let Some(value) = response.headers().get(&name) {
                headers.insert(name, value.clone());
            }
        }

        let data = response.bytes().await.map_err(classify)?;
        Ok(RawTile::with_headers(data, headers))
    }

    fn describe(&self) -> String {
        self.template.clone()
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Upstream(err.to_string())
    }
}
