//! In-memory LRU store bounded by total payload size.

use std::num::NonZeroUsize;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::debug;

use super::CacheStore;

/// Default capacity: 20MB
pub const DEFAULT_CACHE_CAPACITY: usize = 20 * 1024 * 1024;

/// Bound on entry count, independent of byte size
const DEFAULT_MAX_ENTRIES: usize = 10_000;

struct Inner {
    entries: LruCache<String, Bytes>,
    current_size: usize,
}

/// LRU cache of encoded payloads with size-based capacity.
///
/// Least-recently-used entries are evicted once the sum of stored payload
/// sizes exceeds the capacity. Shared across requests via `Arc`.
pub struct MemoryCacheStore {
    inner: Mutex<Inner>,
    max_size: usize,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Create a store holding at most `max_size` bytes of payload.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(cap),
                current_size: 0,
            }),
            max_size,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    /// Current total payload size in bytes.
    pub async fn size(&self) -> usize {
        self.inner.lock().await.current_size
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.inner.lock().await.entries.contains(key)
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Option<Bytes> {
        self.inner.lock().await.entries.get(key).cloned()
    }

    async fn set(&self, key: &str, value: Bytes) {
        // A payload larger than the whole store would only evict everything else
        if value.len() > self.max_size {
            debug!(key, size = value.len(), "Payload exceeds cache capacity, not stored");
            return;
        }

        let mut inner = self.inner.lock().await;
        let size = value.len();

        if let Some(old) = inner.entries.peek(key) {
            let old_len = old.len();
            inner.current_size = inner.current_size.saturating_sub(old_len);
        }

        // Entry-count eviction happens inside `push`; account for it too
        if let Some((evicted_key, evicted)) = inner.entries.push(key.to_string(), value) {
            if evicted_key != key {
                inner.current_size = inner.current_size.saturating_sub(evicted.len());
            }
        }
        inner.current_size += size;

        while inner.current_size > self.max_size {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => {
                    inner.current_size = inner.current_size.saturating_sub(evicted.len());
                }
                None => break,
            }
        }
    }
}
