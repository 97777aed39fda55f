//! Multi-layer compositor.
//!
//! Fetches the members of a composite layer from the top-most down, stops as
//! soon as an opaque tile is found (everything below it is hidden), and blends
//! what it got bottom-to-top.
//!
//! ```text
//! members: [bottom, middle, top]
//!
//!   top ──fetch──▶ PNG (has alpha)      keep, continue
//!   middle ─fetch─▶ JPEG (opaque)       keep, stop
//!   bottom                              never fetched
//!
//!   reverse ──▶ [middle, top] ──blend──▶ PNG
//! ```
//!
//! Member failures are dropped. Zero results degrade to a blank tile, one
//! result is returned untouched, several are blended (blank on blend failure).

use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use http::{HeaderMap, HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::etag;
use crate::error::FetchError;
use crate::geometry::{validate_address, TILE_SIZE};
use crate::imaging::{offload, BlankTileProvider, Fill, ImageFormat, RasterCodec};
use crate::layer::{ConcreteLayer, MapLayer, RawTile};

/// Compositor shared by all requests.
#[derive(Clone)]
pub struct Compositor {
    codec: Arc<dyn RasterCodec>,
    blanks: Arc<BlankTileProvider>,
}

impl Compositor {
    pub fn new(codec: Arc<dyn RasterCodec>, blanks: Arc<BlankTileProvider>) -> Self {
        Self { codec, blanks }
    }

    pub fn blanks(&self) -> &Arc<BlankTileProvider> {
        &self.blanks
    }

    /// Composite one tile address across `members` (bottom-most first).
    ///
    /// Hidden members and members with no tile at this address are skipped.
    /// Only cancellation of `cancel` is reported as an error.
    pub async fn get_tile(
        &self,
        members: &[Arc<ConcreteLayer>],
        zoom: u8,
        col: u32,
        row: u32,
        fill: Fill,
        cancel: &CancellationToken,
    ) -> Result<RawTile, FetchError> {
        let mut fetched: Vec<RawTile> = Vec::with_capacity(members.len());

        for member in members.iter().rev() {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            if !member.visible() {
                debug!(layer = member.name(), "Skipping hidden composite member");
                continue;
            }

            let addr = match validate_address(
                member.bbox(),
                member.range(),
                zoom as i64,
                col as i64,
                row as i64,
            ) {
                Ok(addr) => addr,
                Err(axis) => {
                    debug!(layer = member.name(), %axis, zoom, col, row, "Member has no tile here");
                    continue;
                }
            };

            let handle = member.fetcher().spawn(addr, cancel);
            match handle.join().await {
                Ok(tile) => match self.codec.detect(&tile.data) {
                    Ok(detected) => {
                        fetched.push(tile);
                        if detected.is_opaque() {
                            debug!(layer = member.name(), tile = %addr, "Opaque member, skipping layers below");
                            break;
                        }
                    }
                    Err(_) => {
                        debug!(layer = member.name(), tile = %addr, "Dropping member tile of unknown format");
                    }
                },
                Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                Err(e) => {
                    debug!(layer = member.name(), tile = %addr, error = %e, "Dropping failed member");
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        fetched.reverse();
        match fetched.len() {
            0 => self.blank_tile(fill).await,
            1 => Ok(fetched.remove(0)),
            _ => {
                let layers: Vec<Bytes> = fetched.into_iter().map(|t| t.data).collect();
                let codec = self.codec.clone();
                match offload(move || codec.blend(&layers, TILE_SIZE, TILE_SIZE)).await {
                    Ok(blended) => Ok(tile_response(blended, ImageFormat::Png, true)),
                    Err(e) => {
                        debug!(error = %e, "Blend failed, using blank tile");
                        self.blank_tile(fill).await
                    }
                }
            }
        }
    }

    /// Tile source used when assembling a map canvas.
    ///
    /// Addresses outside the layer's envelope and failed fetches become blank
    /// tiles of the requested background and format.
    pub async fn map_tile(
        &self,
        layer: &MapLayer,
        zoom: u8,
        col: u32,
        row: u32,
        fill: Fill,
        cancel: &CancellationToken,
    ) -> Result<Bytes, FetchError> {
        let addr = match validate_address(layer.bbox(), layer.range(), zoom as i64, col as i64, row as i64) {
            Ok(addr) => addr,
            Err(_) => return self.blank_tile(fill).await.map(|t| t.data),
        };

        match layer {
            MapLayer::Composite(composite) => self
                .get_tile(composite.members(), zoom, col, row, fill, cancel)
                .await
                .map(|t| t.data),
            MapLayer::Concrete(concrete) => {
                match concrete.fetcher().fetch(addr, cancel).await {
                    Ok(tile) => Ok(tile.data),
                    Err(FetchError::Cancelled) => Err(FetchError::Cancelled),
                    Err(e) => {
                        debug!(layer = concrete.name(), tile = %addr, error = %e, "Using blank tile");
                        self.blank_tile(fill).await.map(|t| t.data)
                    }
                }
            }
        }
    }

    async fn blank_tile(&self, fill: Fill) -> Result<RawTile, FetchError> {
        self.blanks
            .blank(fill.color, fill.format)
            .await
            .map(|data| tile_response(data, fill.format, false))
            .map_err(|e| FetchError::Upstream(e.to_string()))
    }
}

fn tile_response(data: Bytes, format: ImageFormat, with_etag: bool) -> RawTile {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(format.mime()));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(data.len()));
    if with_etag {
        if let Ok(value) = HeaderValue::from_str(&etag(&data)) {
            headers.insert(ETAG, value);
        }
    }
    RawTile::with_headers(data, headers)
}
