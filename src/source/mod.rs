//! The batch list source
//!
//! # Overview
//!
//! The source module provides:
//! - `BatchListSource` - the public handle: dispatch actions, observe state
//! - `BatchAction` - the closed command set
//! - `UpdateEvent` - out-of-band update results
//!
//! Each source owns one actor task and has an explicit lifecycle: created
//! with the owning feature, torn down (cancelling all in-flight work) when
//! the handle is dropped or [`shutdown`](BatchListSource::shutdown).

mod actor;
mod types;

pub use types::{BatchAction, UpdateEvent, UpdateMode, UpdateParams, UpdatePredicate};

use crate::error::{Error, Result};
use crate::fetcher::{BatchFetcher, BatchUpdateFetcher};
use crate::state::BatchListState;
use crate::types::{OperationIdGenerator, RandomIds};
use actor::SourceActor;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

/// Buffered update events per subscriber before the oldest are dropped
const UPDATE_RESULTS_CAPACITY: usize = 64;

/// Single-writer orchestrator for one paginated list.
///
/// Accepts [`BatchAction`]s, serializes their effect on the
/// [`BatchListState`], and drives the fetcher collaborators via cancellable
/// background work. `dispatch` never blocks: progress is observed through
/// [`observe`](Self::observe) and [`update_results`](Self::update_results).
pub struct BatchListSource<K, P, T, U> {
    actions: mpsc::UnboundedSender<BatchAction<K, P, U>>,
    state_rx: watch::Receiver<BatchListState<K, P, T>>,
    update_results: broadcast::Sender<UpdateEvent<K, U>>,
    actor: JoinHandle<()>,
}

impl<K, P, T, U> BatchListSource<K, P, T, U>
where
    K: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    /// Create a source with random default operation identifiers.
    ///
    /// `update_fetcher` may be `None` for plain paginated lists; update
    /// actions are then dropped with a warning.
    pub fn new(
        fetcher: Arc<dyn BatchFetcher<P, K, T>>,
        update_fetcher: Option<Arc<dyn BatchUpdateFetcher<K, T, U>>>,
    ) -> Self {
        Self::with_id_generator(fetcher, update_fetcher, Arc::new(RandomIds))
    }

    /// Create a source with an injected operation id generator
    pub fn with_id_generator(
        fetcher: Arc<dyn BatchFetcher<P, K, T>>,
        update_fetcher: Option<Arc<dyn BatchUpdateFetcher<K, T, U>>>,
        id_generator: Arc<dyn OperationIdGenerator>,
    ) -> Self {
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(BatchListState::new());
        let (update_results, _) = broadcast::channel(UPDATE_RESULTS_CAPACITY);

        let actor = SourceActor::new(
            fetcher,
            update_fetcher,
            id_generator,
            state_tx,
            update_results.clone(),
            events_tx,
        );
        let actor = tokio::spawn(actor.run(actions_rx, events_rx));

        Self {
            actions: actions_tx,
            state_rx,
            update_results,
            actor,
        }
    }

    /// Submit an action to the serialized queue; returns immediately.
    ///
    /// Fails fast, without touching state, on structural preconditions: an
    /// update with an empty key set, or a source that has been shut down.
    pub fn dispatch(&self, action: BatchAction<K, P, U>) -> Result<()> {
        if let BatchAction::UpdateBatches { keys, .. } = &action {
            if keys.is_empty() {
                return Err(Error::EmptyKeySet);
            }
        }
        self.actions.send(action).map_err(|_| Error::SourceClosed)
    }

    /// Observe the current snapshot and all subsequent ones.
    ///
    /// Every received value is a fully consistent snapshot; intermediate
    /// snapshots may be skipped under load, never torn.
    pub fn observe(&self) -> watch::Receiver<BatchListState<K, P, T>> {
        self.state_rx.clone()
    }

    /// Current snapshot without subscribing
    pub fn current(&self) -> BatchListState<K, P, T> {
        self.state_rx.borrow().clone()
    }

    /// Subscribe to out-of-band update results.
    ///
    /// Carries per-operation successes and failures, dedup drops, and
    /// per-key results of asynchronous updates. Load failures are not here;
    /// they surface as [`PaginationStatus::Error`](crate::PaginationStatus).
    pub fn update_results(&self) -> broadcast::Receiver<UpdateEvent<K, U>> {
        self.update_results.subscribe()
    }

    /// Tear the source down, cancelling all in-flight work, and wait for
    /// the actor to finish. Dropping the handle has the same effect without
    /// the wait.
    pub async fn shutdown(self) {
        drop(self.actions);
        let _ = self.actor.await;
    }
}
