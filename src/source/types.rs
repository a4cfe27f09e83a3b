//! Action and side-channel types

use crate::error::UpdateError;
use crate::types::OperationId;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

// ============================================================================
// UpdateMode
// ============================================================================

/// How an update operation interacts with its target keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Lock the target keys for the duration of the call; overlapping
    /// synchronous updates queue behind the owner
    Sync,
    /// Fire-and-forget: no locks, per-key results applied opportunistically
    Async,
}

impl UpdateMode {
    /// Check whether this mode locks its target keys
    pub fn locks_keys(&self) -> bool {
        matches!(self, Self::Sync)
    }
}

// ============================================================================
// UpdateParams
// ============================================================================

/// Captured parameters of an in-flight update operation, as seen by
/// cancellation predicates
#[derive(Debug, Clone)]
pub struct UpdateParams<K, U> {
    /// Identifier the operation was deduplicated under
    pub operation_id: OperationId,
    /// Keys the operation targets (already intersected with the list)
    pub keys: HashSet<K>,
    /// The caller's update request
    pub request: U,
    /// Sync or async path
    pub mode: UpdateMode,
}

/// Predicate selecting in-flight update operations for cancellation
pub type UpdatePredicate<K, U> = Arc<dyn Fn(&UpdateParams<K, U>) -> bool + Send + Sync>;

// ============================================================================
// BatchAction
// ============================================================================

/// The closed set of commands accepted by a
/// [`BatchListSource`](crate::source::BatchListSource).
///
/// A tagged variant per command keeps the orchestrator's dispatch an
/// exhaustive match with no default fallthrough.
pub enum BatchAction<K, P, U> {
    /// Discard all batches and load the first page afresh
    Reload {
        /// Request parameters for the first page
        request: P,
    },

    /// Append the next page; `None` reuses the last request parameters
    LoadMore {
        /// Explicit request parameters, or `None` to reuse the last ones
        request: Option<P>,
    },

    /// Request updated data for a set of existing keys
    UpdateBatches {
        /// Target keys; must be non-empty
        keys: HashSet<K>,
        /// The update request handed to the fetcher
        request: U,
        /// Sync (key-locking) or async (fire-and-forget) path
        mode: UpdateMode,
        /// Dedup identifier; `None` draws a fresh one from the generator
        operation_id: Option<OperationId>,
    },

    /// Cancel the in-flight `Reload`/`LoadMore`, if any
    CancelBatchLoading,

    /// Cancel every in-flight update operation and release all key locks
    CancelAllUpdates,

    /// Cancel the in-flight update operations matching the predicate
    CancelUpdates {
        /// Selects operations by their captured parameters
        predicate: UpdatePredicate<K, U>,
    },

    /// Cancel everything, clear the list, and return to the initial state
    Reset,
}

impl<K, P, U> BatchAction<K, P, U> {
    /// Reload the list from the first page
    pub fn reload(request: P) -> Self {
        Self::Reload { request }
    }

    /// Append the next page using the last request parameters
    pub fn load_more() -> Self {
        Self::LoadMore { request: None }
    }

    /// Append the next page with explicit request parameters
    pub fn load_more_with(request: P) -> Self {
        Self::LoadMore {
            request: Some(request),
        }
    }

    /// Synchronous update with an engine-assigned operation id
    pub fn update(keys: HashSet<K>, request: U) -> Self {
        Self::UpdateBatches {
            keys,
            request,
            mode: UpdateMode::Sync,
            operation_id: None,
        }
    }

    /// Synchronous update deduplicated under a caller-supplied id
    pub fn update_with_id(keys: HashSet<K>, request: U, id: impl Into<OperationId>) -> Self {
        Self::UpdateBatches {
            keys,
            request,
            mode: UpdateMode::Sync,
            operation_id: Some(id.into()),
        }
    }

    /// Asynchronous update with an engine-assigned operation id
    pub fn update_async(keys: HashSet<K>, request: U) -> Self {
        Self::UpdateBatches {
            keys,
            request,
            mode: UpdateMode::Async,
            operation_id: None,
        }
    }

    /// Asynchronous update deduplicated under a caller-supplied id
    pub fn update_async_with_id(keys: HashSet<K>, request: U, id: impl Into<OperationId>) -> Self {
        Self::UpdateBatches {
            keys,
            request,
            mode: UpdateMode::Async,
            operation_id: Some(id.into()),
        }
    }

    /// Cancel the update operations matching `predicate`
    pub fn cancel_updates<F>(predicate: F) -> Self
    where
        F: Fn(&UpdateParams<K, U>) -> bool + Send + Sync + 'static,
    {
        Self::CancelUpdates {
            predicate: Arc::new(predicate),
        }
    }
}

impl<K: fmt::Debug, P: fmt::Debug, U: fmt::Debug> fmt::Debug for BatchAction<K, P, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reload { request } => f.debug_struct("Reload").field("request", request).finish(),
            Self::LoadMore { request } => {
                f.debug_struct("LoadMore").field("request", request).finish()
            }
            Self::UpdateBatches {
                keys,
                request,
                mode,
                operation_id,
            } => f
                .debug_struct("UpdateBatches")
                .field("keys", keys)
                .field("request", request)
                .field("mode", mode)
                .field("operation_id", operation_id)
                .finish(),
            Self::CancelBatchLoading => f.write_str("CancelBatchLoading"),
            Self::CancelAllUpdates => f.write_str("CancelAllUpdates"),
            Self::CancelUpdates { .. } => f.write_str("CancelUpdates { .. }"),
            Self::Reset => f.write_str("Reset"),
        }
    }
}

// ============================================================================
// UpdateEvent
// ============================================================================

/// Out-of-band result of an update operation, emitted on the side channel.
///
/// Update failures never escalate to the list's overall status; observers
/// interested in them subscribe to
/// [`update_results`](crate::source::BatchListSource::update_results).
#[derive(Debug, Clone)]
pub struct UpdateEvent<K, U> {
    /// Identifier the operation ran under
    pub operation_id: OperationId,
    /// The caller's update request
    pub request: U,
    /// Keys whose data was replaced, or the failure that left the list
    /// untouched
    pub result: Result<Vec<K>, UpdateError>,
}

impl<K, U> UpdateEvent<K, U>
where
    K: Eq + Hash,
{
    /// Check whether the event reports a success covering `key`
    pub fn applied(&self, key: &K) -> bool {
        self.result
            .as_ref()
            .is_ok_and(|keys| keys.iter().any(|k| k == key))
    }
}
