//! Fetcher collaborator traits
//!
//! The engine drives two external collaborators: a [`BatchFetcher`] that
//! produces pages for `Reload`/`LoadMore`, and an optional
//! [`BatchUpdateFetcher`] that produces fresh data for already-loaded keys.
//! Transport, serialization, and retry policy all live behind these traits;
//! the engine only sees their results.

use crate::error::{FetchError, UpdateError};
use crate::types::{Batch, FetchedPage};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;

/// Stream of per-key results produced by the asynchronous update path
pub type UpdateStream<K, T> = BoxStream<'static, (K, Result<T, UpdateError>)>;

/// Produces the next batch of paginated data.
///
/// `Reload` calls `fetch` with an empty `current` slice; `LoadMore` passes
/// the loaded list so the fetcher can derive a cursor from it. A cancelled
/// call must not corrupt the fetcher's own side state.
#[async_trait]
pub trait BatchFetcher<P, K, T>: Send + Sync {
    /// Fetch the next page for `request`, given the batches loaded so far
    async fn fetch(
        &self,
        request: &P,
        current: &[Batch<K, T>],
    ) -> Result<FetchedPage<K, T>, FetchError>;
}

/// Produces updated data for a set of already-loaded keys.
///
/// The engine picks the entry point from the update action's mode:
/// `fetch_sync` blocks the affected keys until it resolves, `fetch_async`
/// hands back a stream whose items are applied opportunistically, each only
/// if its key still exists when the item arrives.
#[async_trait]
pub trait BatchUpdateFetcher<K, T, U>: Send + Sync {
    /// Fetch updated data for the given batches in one blocking call.
    ///
    /// The returned map may cover only a subset of the requested keys;
    /// uncovered keys are simply left unchanged.
    async fn fetch_sync(
        &self,
        batches: &[Batch<K, T>],
        request: &U,
    ) -> Result<HashMap<K, T>, UpdateError>;

    /// Fetch updated data on the fire-and-forget path.
    ///
    /// Returns a stream of per-key results; an `Err` item reports that key's
    /// failure without aborting the rest of the stream.
    async fn fetch_async(
        &self,
        batches: &[Batch<K, T>],
        request: &U,
    ) -> Result<UpdateStream<K, T>, UpdateError>;
}
