//! Single-layer tile fetch with deadline, retry and cancellation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::FetchError;
use crate::geometry::TileAddress;
use crate::layer::{RawTile, TileSource};

/// Default deadline of a single fetch attempt.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetch wrapper owned by one layer.
///
/// Each attempt runs under a deadline and a child of the request's
/// cancellation token. A timed-out attempt is retried exactly once, and only
/// while the request token has not fired. Cancellation is never retried.
#[derive(Clone)]
pub struct TileFetcher {
    layer: Arc<str>,
    source: Arc<dyn TileSource>,
    timeout: Duration,
}

impl fmt::Debug for TileFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileFetcher")
            .field("layer", &self.layer)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TileFetcher {
    pub fn new(layer: impl Into<Arc<str>>, source: Arc<dyn TileSource>, timeout: Duration) -> Self {
        Self {
            layer: layer.into(),
            source,
            timeout,
        }
    }

    pub fn layer(&self) -> &str {
        &self.layer
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn source(&self) -> &Arc<dyn TileSource> {
        &self.source
    }

    /// Fetch one tile, retrying a single timeout.
    pub async fn fetch(
        &self,
        addr: TileAddress,
        cancel: &CancellationToken,
    ) -> Result<RawTile, FetchError> {
        match self.attempt(addr, cancel).await {
            Err(FetchError::Timeout) if !cancel.is_cancelled() => {
                debug!(layer = %self.layer, tile = %addr, "Fetch timed out, retrying once");
                self.attempt(addr, cancel).await
            }
            other => other,
        }
    }

    /// Run [`fetch`](Self::fetch) on its own task.
    ///
    /// The returned handle can cancel the fetch without touching the rest of
    /// the request; cancelling the request cancels the fetch too.
    pub fn spawn(&self, addr: TileAddress, cancel: &CancellationToken) -> FetchHandle {
        let token = cancel.child_token();
        let fetcher = self.clone();
        let task_token = token.clone();
        let task = tokio::spawn(async move { fetcher.fetch(addr, &task_token).await });
        FetchHandle { token, task }
    }

    async fn attempt(
        &self,
        addr: TileAddress,
        cancel: &CancellationToken,
    ) -> Result<RawTile, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        // Anything the source spawned for this attempt stops when we leave
        let attempt = cancel.child_token();
        let _guard = attempt.clone().drop_guard();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = tokio::time::timeout(self.timeout, self.source.get_tile(addr, &attempt)) => {
                match result {
                    Ok(tile) => tile,
                    Err(_) => Err(FetchError::Timeout),
                }
            }
        }
    }
}

/// Handle to a spawned fetch.
pub struct FetchHandle {
    token: CancellationToken,
    task: JoinHandle<Result<RawTile, FetchError>>,
}

impl FetchHandle {
    /// Cancel this fetch; [`join`](Self::join) then yields `Cancelled`.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn join(self) -> Result<RawTile, FetchError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(FetchError::Cancelled),
            Err(e) => Err(FetchError::Upstream(format!("fetch task failed: {}", e))),
        }
    }
}
