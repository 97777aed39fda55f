//! Scripted in-memory tile sources for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use http::HeaderMap;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::geometry::TileAddress;
use crate::layer::{RawTile, TileSource};

#[derive(Debug, Clone)]
pub enum Script {
    Ok(Vec<u8>),
    Fail(FetchError),
    Delay(Duration, Vec<u8>),
}

/// Source replaying a script; the last step repeats forever.
pub struct MockSource {
    steps: Mutex<Vec<Script>>,
    calls: AtomicUsize,
    completed: AtomicUsize,
    headers: HeaderMap,
}

impl MockSource {
    pub fn new(step: Script) -> Self {
        Self::sequence(vec![step])
    }

    pub fn sequence(steps: Vec<Script>) -> Self {
        Self {
            steps: Mutex::new(steps),
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            headers: HeaderMap::new(),
        }
    }

    /// Headers attached to every successful tile.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Delayed steps that ran to the end of their delay.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Script {
        let mut steps = self.steps.lock().unwrap();
        if steps.len() > 1 {
            steps.remove(0)
        } else {
            steps[0].clone()
        }
    }
}

#[async_trait]
impl TileSource for MockSource {
    async fn get_tile(
        &self,
        _addr: TileAddress,
        cancel: &CancellationToken,
    ) -> Result<RawTile, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_step() {
            Script::Ok(data) => Ok(RawTile::with_headers(data, self.headers.clone())),
            Script::Fail(err) => Err(err),
            Script::Delay(delay, data) => {
                tokio::select! {
                    _ = cancel.cancelled() => Err(FetchError::Cancelled),
                    _ = tokio::time::sleep(delay) => {
                        self.completed.fetch_add(1, Ordering::SeqCst);
                        Ok(RawTile::with_headers(data, self.headers.clone()))
                    }
                }
            }
        }
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
