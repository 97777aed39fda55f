//! Content-addressed transcode cache.
//!
//! Maps (source bytes, target format) to previously encoded bytes. The key is
//! the SHA-224 of the source bytes followed by the target MIME type, so an
//! entry's value is a pure function of its key.
//!
//! ```text
//! transcode(bytes, fmt, token)
//!     │
//!     ├── hit ───────────────────────────────▶ cached bytes
//!     │
//!     └── miss ─▶ check ─▶ decode ─▶ check ─▶ encode ─▶ check ─▶ set ─▶ bytes
//!                   │                 │                   │
//!                   └─────────────────┴───────────────────┴──▶ Cancelled (no write)
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::codec::{offload, ImageFormat, RasterCodec};
use crate::cache::{digest, CacheStore};
use crate::error::TranscodeError;

/// Transcoder in front of a shared [`CacheStore`].
#[derive(Clone)]
pub struct TranscodeCache {
    store: Arc<dyn CacheStore>,
    codec: Arc<dyn RasterCodec>,
}

impl TranscodeCache {
    pub fn new(store: Arc<dyn CacheStore>, codec: Arc<dyn RasterCodec>) -> Self {
        Self { store, codec }
    }

    /// Cache key for `data` re-encoded as `format`.
    pub fn key(data: &[u8], format: ImageFormat) -> String {
        digest(&[data, format.mime().as_bytes()])
    }

    /// Re-encode `data` as `format`, reusing a previous result when present.
    pub async fn transcode(
        &self,
        data: &Bytes,
        format: ImageFormat,
        cancel: &CancellationToken,
    ) -> Result<Bytes, TranscodeError> {
        let key = Self::key(data, format);

        if let Some(hit) = self.store.get(&key).await {
            debug!(key = %key, format = format.mime(), "Transcode cache hit");
            return Ok(hit);
        }
        debug!(key = %key, format = format.mime(), "Transcode cache miss");

        check(cancel)?;
        let codec = self.codec.clone();
        let source = data.clone();
        let image = offload(move || codec.decode(&source)).await?;
        check(cancel)?;
        let codec = self.codec.clone();
        let encoded = offload(move || codec.encode(&image, format)).await?;
        check(cancel)?;

        self.store.set(&key, encoded.clone()).await;
        Ok(encoded)
    }
}

fn check(cancel: &CancellationToken) -> Result<(), TranscodeError> {
    if cancel.is_cancelled() {
        Err(TranscodeError::Cancelled)
    } else {
        Ok(())
    }
}
