//! Tile fetching.
//!
//! [`TileFetcher`] wraps one layer's source with a per-attempt deadline, a
//! single timeout retry and cancellation. [`Compositor`] fans a tile address
//! out over the members of a composite layer.

mod compositor;
mod fetcher;

#[cfg(test)]
pub(crate) mod testing;

pub use compositor::Compositor;
pub use fetcher::{FetchHandle, TileFetcher, DEFAULT_FETCH_TIMEOUT};
