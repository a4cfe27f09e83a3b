//! Snapshot and status types

use crate::error::FetchError;
use crate::types::{Batch, OperationId};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

// ============================================================================
// PaginationStatus
// ============================================================================

/// Overall state of the paginated list.
///
/// Transitions:
/// `None → Loading → Content { has_more } → { LoadingMore → Content | Error }`,
/// with `Error` reachable from `Loading` or `LoadingMore`, any state reachable
/// back to `None` via `Reset`, and `CancelBatchLoading` reverting
/// `Loading`/`LoadingMore` to the prior stable value without visiting `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PaginationStatus {
    /// Nothing ever loaded; initial state and the state after `Reset`
    #[default]
    None,

    /// A `Reload` is in flight; existing batches, if any, are being replaced
    Loading,

    /// A `LoadMore` is appending; existing batches remain visible
    LoadingMore,

    /// Stable: batches available, no load in flight
    Content {
        /// Whether the fetcher reported more pages behind the last one
        has_more: bool,
    },

    /// The most recent load failed; previously loaded batches are retained
    /// in the snapshot so stale content can be shown next to the error
    Error(FetchError),
}

impl PaginationStatus {
    /// Check whether a load is in flight
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading | Self::LoadingMore)
    }

    /// Check whether this is a stable status (no load in flight)
    pub fn is_stable(&self) -> bool {
        !self.is_loading()
    }

    /// Check whether the list holds stable content
    pub fn is_content(&self) -> bool {
        matches!(self, Self::Content { .. })
    }

    /// Check whether the most recent load failed
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Whether more pages can be appended without fresh request parameters
    pub fn has_more(&self) -> bool {
        matches!(self, Self::Content { has_more: true })
    }
}

// ============================================================================
// BatchListState
// ============================================================================

/// The aggregate, immutable snapshot of a paginated list.
///
/// Invariants:
/// - no two batches share a key
/// - `batches` is in load order, oldest page first
/// - for synchronous updates, every key is owned by at most one running
///   operation at a time (the registry here also lists queued operations)
#[derive(Debug, Clone)]
pub struct BatchListState<K, P, T> {
    /// Loaded batches, oldest page first
    pub batches: Vec<Batch<K, T>>,

    /// Overall state-machine value
    pub status: PaginationStatus,

    /// Most recently used request parameters; consumed by parameter-less
    /// `LoadMore` calls
    pub last_request_params: Option<P>,

    /// Registry of in-flight (running or queued) update operations and the
    /// keys each one targets
    pub in_flight_updates: HashMap<OperationId, HashSet<K>>,
}

// Manual impl: the update registry needs `K: Eq + Hash` for map equality,
// which a derived `PartialEq` would not require of `K`.
impl<K, P, T> PartialEq for BatchListState<K, P, T>
where
    K: Eq + Hash,
    P: PartialEq,
    T: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.batches == other.batches
            && self.status == other.status
            && self.last_request_params == other.last_request_params
            && self.in_flight_updates == other.in_flight_updates
    }
}

impl<K, P, T> Default for BatchListState<K, P, T> {
    fn default() -> Self {
        Self {
            batches: Vec::new(),
            status: PaginationStatus::None,
            last_request_params: None,
            in_flight_updates: HashMap::new(),
        }
    }
}

impl<K, P, T> BatchListState<K, P, T>
where
    K: Eq + Hash,
{
    /// Create a new empty snapshot with status `None`
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of loaded batches
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Check whether no batches are loaded
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Look up a batch by key
    pub fn get(&self, key: &K) -> Option<&Batch<K, T>> {
        self.batches.iter().find(|b| &b.key == key)
    }

    /// Check whether a key is present in the list
    pub fn contains_key(&self, key: &K) -> bool {
        self.batches.iter().any(|b| &b.key == key)
    }

    /// Keys in load order
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.batches.iter().map(|b| &b.key)
    }

    /// Check whether an update operation is in flight (running or queued)
    pub fn is_update_in_flight(&self, operation_id: &OperationId) -> bool {
        self.in_flight_updates.contains_key(operation_id)
    }
}
