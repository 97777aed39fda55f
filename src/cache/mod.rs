//! Content-addressed byte storage.
//!
//! The transcode cache only needs an async `get`/`set` contract over byte
//! values; eviction is the store's business. [`MemoryCacheStore`] is the
//! default, an LRU bounded by total payload size.
//!
//! Keys are hex-encoded SHA-224 digests (see [`digest`]), so identical inputs
//! always map to the same key and concurrent writers for a key race safely.

mod memory;

pub use memory::{MemoryCacheStore, DEFAULT_CACHE_CAPACITY};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha224};

/// Async key/value store over byte payloads.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<Bytes>;

    async fn set(&self, key: &str, value: Bytes);
}

/// Hex SHA-224 of the concatenation of `parts`.
pub fn digest(parts: &[&[u8]]) -> String {
    let mut hasher = Sha224::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// Quoted digest of a payload, suitable for an `ETag` header.
pub fn etag(data: &[u8]) -> String {
    format!("\"{}\"", digest(&[data]))
}
