use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::geometry::TileAddress;

/// Tile bytes plus whatever headers the source reported with them.
///
/// Headers are advisory only: the real format is always sniffed from `data`.
#[derive(Debug, Clone, Default)]
pub struct RawTile {
    pub data: Bytes,
    pub headers: HeaderMap,
}

impl RawTile {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            headers: HeaderMap::new(),
        }
    }

    pub fn with_headers(data: impl Into<Bytes>, headers: HeaderMap) -> Self {
        Self {
            data: data.into(),
            headers,
        }
    }
}

/// Something that can produce one raw tile of a layer.
///
/// Implementations do not retry and do not enforce deadlines; both are the
/// job of [`TileFetcher`](crate::fetch::TileFetcher). They may return early
/// with [`FetchError::Cancelled`] when `cancel` has fired.
#[async_trait]
pub trait TileSource: Send + Sync {
    async fn get_tile(
        &self,
        addr: TileAddress,
        cancel: &CancellationToken,
    ) -> Result<RawTile, FetchError>;

    /// Short human-readable description used in logs.
    fn describe(&self) -> String;
}
