//! Single-writer orchestrator
//!
//! One actor task owns the snapshot, the lock table, and all in-flight task
//! bookkeeping. Actions and fetch results both arrive over channels and are
//! applied one at a time, so no two state mutations ever interleave and every
//! published snapshot is fully consistent.
//!
//! Cancellation is race-free by tagging rather than by abort alone: load
//! results carry a generation, update results carry a per-operation token,
//! and a result whose tag no longer matches the actor's bookkeeping is
//! discarded on arrival.

use crate::error::{FetchError, UpdateError};
use crate::fetcher::{BatchFetcher, BatchUpdateFetcher};
use crate::source::types::{BatchAction, UpdateEvent, UpdateMode, UpdateParams, UpdatePredicate};
use crate::state::{BatchListState, PaginationStatus};
use crate::types::{Batch, FetchedPage, OperationId, OperationIdGenerator};
use futures::StreamExt;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// ============================================================================
// Internal events
// ============================================================================

/// Which load pipeline produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum LoadKind {
    Reload,
    LoadMore,
}

/// Completion events sent from background tasks back to the actor
pub(super) enum TaskEvent<K, T> {
    LoadFinished {
        generation: u64,
        kind: LoadKind,
        result: Result<FetchedPage<K, T>, FetchError>,
    },
    SyncUpdateFinished {
        operation_id: OperationId,
        token: u64,
        result: Result<HashMap<K, T>, UpdateError>,
    },
    AsyncUpdateItem {
        operation_id: OperationId,
        token: u64,
        key: K,
        result: Result<T, UpdateError>,
    },
    AsyncUpdateFinished {
        operation_id: OperationId,
        token: u64,
        error: Option<UpdateError>,
    },
}

// ============================================================================
// Bookkeeping entries
// ============================================================================

struct LoadTask<P> {
    kind: LoadKind,
    generation: u64,
    /// Request to commit into `last_request_params` when the result applies.
    /// A cancelled load leaves the previous parameters in place.
    params: Option<P>,
    handle: JoinHandle<()>,
}

struct UpdateEntry<K, U> {
    params: UpdateParams<K, U>,
    token: u64,
    handle: JoinHandle<()>,
}

struct PendingUpdate<K, U> {
    params: UpdateParams<K, U>,
}

// ============================================================================
// Actor
// ============================================================================

pub(super) struct SourceActor<K, P, T, U> {
    fetcher: Arc<dyn BatchFetcher<P, K, T>>,
    update_fetcher: Option<Arc<dyn BatchUpdateFetcher<K, T, U>>>,
    id_generator: Arc<dyn OperationIdGenerator>,

    state: BatchListState<K, P, T>,
    state_tx: watch::Sender<BatchListState<K, P, T>>,
    update_results: broadcast::Sender<UpdateEvent<K, U>>,
    events_tx: mpsc::UnboundedSender<TaskEvent<K, T>>,

    load: Option<LoadTask<P>>,
    load_generation: u64,
    /// Stable status to revert to when an in-flight load is cancelled
    prior_status: PaginationStatus,

    /// Running update operations, sync and async
    updates: HashMap<OperationId, UpdateEntry<K, U>>,
    /// Synchronous updates queued behind a locked key, FIFO
    waiting: VecDeque<PendingUpdate<K, U>>,
    /// Keys owned by a running synchronous update
    locked_keys: HashSet<K>,
    next_token: u64,
}

impl<K, P, T, U> SourceActor<K, P, T, U>
where
    K: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    pub(super) fn new(
        fetcher: Arc<dyn BatchFetcher<P, K, T>>,
        update_fetcher: Option<Arc<dyn BatchUpdateFetcher<K, T, U>>>,
        id_generator: Arc<dyn OperationIdGenerator>,
        state_tx: watch::Sender<BatchListState<K, P, T>>,
        update_results: broadcast::Sender<UpdateEvent<K, U>>,
        events_tx: mpsc::UnboundedSender<TaskEvent<K, T>>,
    ) -> Self {
        Self {
            fetcher,
            update_fetcher,
            id_generator,
            state: BatchListState::new(),
            state_tx,
            update_results,
            events_tx,
            load: None,
            load_generation: 0,
            prior_status: PaginationStatus::None,
            updates: HashMap::new(),
            waiting: VecDeque::new(),
            locked_keys: HashSet::new(),
            next_token: 0,
        }
    }

    /// Run until the action channel closes, then tear everything down
    pub(super) async fn run(
        mut self,
        mut actions: mpsc::UnboundedReceiver<BatchAction<K, P, U>>,
        mut events: mpsc::UnboundedReceiver<TaskEvent<K, T>>,
    ) {
        loop {
            tokio::select! {
                action = actions.recv() => match action {
                    Some(action) => self.handle_action(action),
                    None => break,
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
        }

        // Owner dropped the handle: cancel all in-flight work
        self.reset();
    }

    // ========================================================================
    // Action dispatch
    // ========================================================================

    fn handle_action(&mut self, action: BatchAction<K, P, U>) {
        match action {
            BatchAction::Reload { request } => self.handle_reload(request),
            BatchAction::LoadMore { request } => self.handle_load_more(request),
            BatchAction::UpdateBatches {
                keys,
                request,
                mode,
                operation_id,
            } => self.handle_update(keys, request, mode, operation_id),
            BatchAction::CancelBatchLoading => self.handle_cancel_loading(),
            BatchAction::CancelAllUpdates => {
                self.cancel_all_updates();
                self.publish();
            }
            BatchAction::CancelUpdates { predicate } => self.handle_cancel_updates(&predicate),
            BatchAction::Reset => self.reset(),
        }
    }

    fn handle_event(&mut self, event: TaskEvent<K, T>) {
        match event {
            TaskEvent::LoadFinished {
                generation,
                kind,
                result,
            } => self.handle_load_finished(generation, kind, result),
            TaskEvent::SyncUpdateFinished {
                operation_id,
                token,
                result,
            } => self.handle_sync_update_finished(&operation_id, token, result),
            TaskEvent::AsyncUpdateItem {
                operation_id,
                token,
                key,
                result,
            } => self.handle_async_update_item(&operation_id, token, key, result),
            TaskEvent::AsyncUpdateFinished {
                operation_id,
                token,
                error,
            } => self.handle_async_update_finished(&operation_id, token, error),
        }
    }

    // ========================================================================
    // Loading
    // ========================================================================

    fn handle_reload(&mut self, request: P) {
        self.cancel_load();

        // The pre-load stable status survives a reload-over-reload
        if self.state.status.is_stable() {
            self.prior_status = self.state.status.clone();
        }

        self.state.status = PaginationStatus::Loading;

        let generation = self.next_load_generation();
        let fetcher = Arc::clone(&self.fetcher);
        let events = self.events_tx.clone();
        let params = request.clone();
        debug!(generation, "starting reload");
        let handle = tokio::spawn(async move {
            let result = fetcher.fetch(&request, &[]).await;
            let _ = events.send(TaskEvent::LoadFinished {
                generation,
                kind: LoadKind::Reload,
                result,
            });
        });

        self.load = Some(LoadTask {
            kind: LoadKind::Reload,
            generation,
            params: Some(params),
            handle,
        });
        self.publish();
    }

    fn handle_load_more(&mut self, request: Option<P>) {
        if let Some(load) = &self.load {
            debug!(kind = ?load.kind, "load already in flight; LoadMore coalesced");
            return;
        }

        match &self.state.status {
            PaginationStatus::None => {
                warn!("LoadMore rejected: nothing has been loaded yet");
                return;
            }
            PaginationStatus::Content { has_more: false } if request.is_none() => {
                warn!("LoadMore rejected: end of pagination reached");
                return;
            }
            _ => {}
        }

        let Some(params) = request
            .clone()
            .or_else(|| self.state.last_request_params.clone())
        else {
            warn!("LoadMore rejected: no request parameters available");
            return;
        };

        if request.is_some() {
            self.state.last_request_params = Some(params.clone());
        }

        self.prior_status = self.state.status.clone();
        self.state.status = PaginationStatus::LoadingMore;

        let generation = self.next_load_generation();
        let fetcher = Arc::clone(&self.fetcher);
        let events = self.events_tx.clone();
        let current = self.state.batches.clone();
        debug!(generation, loaded = current.len(), "starting load-more");
        let handle = tokio::spawn(async move {
            let result = fetcher.fetch(&params, &current).await;
            let _ = events.send(TaskEvent::LoadFinished {
                generation,
                kind: LoadKind::LoadMore,
                result,
            });
        });

        self.load = Some(LoadTask {
            kind: LoadKind::LoadMore,
            generation,
            params: None,
            handle,
        });
        self.publish();
    }

    fn handle_cancel_loading(&mut self) {
        if self.cancel_load() {
            self.state.status = self.prior_status.clone();
            self.publish();
        }
    }

    fn handle_load_finished(
        &mut self,
        generation: u64,
        kind: LoadKind,
        result: Result<FetchedPage<K, T>, FetchError>,
    ) {
        let current = self
            .load
            .as_ref()
            .is_some_and(|l| l.generation == generation);
        if !current {
            debug!(generation, "discarding stale load result");
            return;
        }
        let params = self.load.take().and_then(|task| task.params);

        match kind {
            LoadKind::Reload => self.apply_reload(result, params),
            LoadKind::LoadMore => self.apply_load_more(result),
        }

        self.prior_status = self.state.status.clone();
        self.publish();
    }

    fn apply_reload(
        &mut self,
        result: Result<FetchedPage<K, T>, FetchError>,
        params: Option<P>,
    ) {
        match result {
            Ok(page) => {
                self.state.batches = page.batch.map_or_else(Vec::new, |batch| vec![batch]);
                self.state.status = PaginationStatus::Content {
                    has_more: page.has_more,
                };
                // Only a reload that actually replaced the list redirects
                // subsequent parameter-less LoadMore calls
                self.state.last_request_params = params;
            }
            Err(cause) => {
                // Nothing successfully replaced the list
                self.state.batches.clear();
                self.state.status = PaginationStatus::Error(cause);
            }
        }

        // The reload's full replacement takes precedence over any update
        // still in flight on the old list: supersede, not fail.
        self.supersede_sync_updates();
    }

    fn apply_load_more(&mut self, result: Result<FetchedPage<K, T>, FetchError>) {
        match result {
            Ok(page) => {
                if let Some(batch) = page.batch {
                    if self.state.contains_key(&batch.key) {
                        warn!(key = ?batch.key, "fetcher returned duplicate key on LoadMore");
                        self.state.status =
                            PaginationStatus::Error(FetchError::duplicate_key(format!(
                                "{:?}",
                                batch.key
                            )));
                        return;
                    }
                    self.state.batches.push(batch);
                }
                self.state.status = PaginationStatus::Content {
                    has_more: page.has_more,
                };
            }
            Err(cause) => {
                // Existing batches stay visible next to the error
                self.state.status = PaginationStatus::Error(cause);
            }
        }
    }

    /// Abort the in-flight load task, if any. Late results are rejected by
    /// the generation check even if the task already sent one.
    fn cancel_load(&mut self) -> bool {
        if let Some(task) = self.load.take() {
            debug!(kind = ?task.kind, generation = task.generation, "cancelling in-flight load");
            task.handle.abort();
            true
        } else {
            false
        }
    }

    fn next_load_generation(&mut self) -> u64 {
        self.load_generation += 1;
        self.load_generation
    }

    // ========================================================================
    // Updates
    // ========================================================================

    fn handle_update(
        &mut self,
        keys: HashSet<K>,
        request: U,
        mode: UpdateMode,
        operation_id: Option<OperationId>,
    ) {
        if self.update_fetcher.is_none() {
            warn!("UpdateBatches dropped: no update fetcher configured");
            return;
        }

        let operation_id = operation_id.unwrap_or_else(|| self.id_generator.next_id());

        if self.update_in_flight(&operation_id) {
            debug!(%operation_id, "duplicate operation id; update dropped");
            self.emit_update_event(UpdateEvent {
                operation_id: operation_id.clone(),
                request,
                result: Err(UpdateError::operation_in_flight(operation_id.as_str())),
            });
            return;
        }

        let existing: HashSet<K> = keys
            .into_iter()
            .filter(|key| self.state.contains_key(key))
            .collect();
        if existing.is_empty() {
            debug!(%operation_id, "update targets no loaded keys; dropped");
            self.emit_update_event(UpdateEvent {
                operation_id,
                request,
                result: Err(UpdateError::NoMatchingKeys),
            });
            return;
        }

        let params = UpdateParams {
            operation_id,
            keys: existing,
            request,
            mode,
        };

        match mode {
            UpdateMode::Async => self.start_async_update(params),
            UpdateMode::Sync => {
                if params.keys.is_disjoint(&self.locked_keys) {
                    self.start_sync_update(params);
                } else {
                    debug!(operation_id = %params.operation_id, "keys locked; update queued");
                    self.waiting.push_back(PendingUpdate { params });
                }
            }
        }
        self.publish();
    }

    fn start_sync_update(&mut self, params: UpdateParams<K, U>) {
        let Some(fetcher) = self.update_fetcher.clone() else {
            return;
        };

        let token = self.next_update_token();
        let events = self.events_tx.clone();
        let operation_id = params.operation_id.clone();
        let request = params.request.clone();
        let batches: Vec<Batch<K, T>> = self
            .state
            .batches
            .iter()
            .filter(|b| params.keys.contains(&b.key))
            .cloned()
            .collect();

        debug!(%operation_id, keys = batches.len(), "starting sync update");
        let handle = tokio::spawn(async move {
            let result = fetcher.fetch_sync(&batches, &request).await;
            let _ = events.send(TaskEvent::SyncUpdateFinished {
                operation_id,
                token,
                result,
            });
        });

        self.locked_keys.extend(params.keys.iter().cloned());
        self.updates.insert(
            params.operation_id.clone(),
            UpdateEntry {
                params,
                token,
                handle,
            },
        );
    }

    fn start_async_update(&mut self, params: UpdateParams<K, U>) {
        let Some(fetcher) = self.update_fetcher.clone() else {
            return;
        };

        let token = self.next_update_token();
        let events = self.events_tx.clone();
        let operation_id = params.operation_id.clone();
        let request = params.request.clone();
        let batches: Vec<Batch<K, T>> = self
            .state
            .batches
            .iter()
            .filter(|b| params.keys.contains(&b.key))
            .cloned()
            .collect();

        debug!(%operation_id, keys = batches.len(), "starting async update");
        let handle = tokio::spawn(async move {
            match fetcher.fetch_async(&batches, &request).await {
                Ok(mut stream) => {
                    while let Some((key, result)) = stream.next().await {
                        let _ = events.send(TaskEvent::AsyncUpdateItem {
                            operation_id: operation_id.clone(),
                            token,
                            key,
                            result,
                        });
                    }
                    let _ = events.send(TaskEvent::AsyncUpdateFinished {
                        operation_id,
                        token,
                        error: None,
                    });
                }
                Err(cause) => {
                    let _ = events.send(TaskEvent::AsyncUpdateFinished {
                        operation_id,
                        token,
                        error: Some(cause),
                    });
                }
            }
        });

        self.updates.insert(
            params.operation_id.clone(),
            UpdateEntry {
                params,
                token,
                handle,
            },
        );
    }

    fn handle_sync_update_finished(
        &mut self,
        operation_id: &OperationId,
        token: u64,
        result: Result<HashMap<K, T>, UpdateError>,
    ) {
        let current = self
            .updates
            .get(operation_id)
            .is_some_and(|e| e.token == token);
        if !current {
            debug!(%operation_id, "discarding result of cancelled update");
            return;
        }
        let Some(entry) = self.updates.remove(operation_id) else {
            return;
        };
        self.release_locks(&entry.params);

        let result = match result {
            Ok(data) => {
                let mut applied = Vec::new();
                for batch in &mut self.state.batches {
                    if let Some(fresh) = data.get(&batch.key) {
                        // Replace the batch wholesale; a key gone from the
                        // list by now is skipped silently
                        *batch = Batch::new(batch.key.clone(), fresh.clone());
                        applied.push(batch.key.clone());
                    }
                }
                Ok(applied)
            }
            Err(cause) => {
                debug!(%operation_id, %cause, "sync update failed; batches unchanged");
                Err(cause)
            }
        };

        self.emit_update_event(UpdateEvent {
            operation_id: entry.params.operation_id.clone(),
            request: entry.params.request.clone(),
            result,
        });

        self.drain_waiting();
        self.publish();
    }

    fn handle_async_update_item(
        &mut self,
        operation_id: &OperationId,
        token: u64,
        key: K,
        result: Result<T, UpdateError>,
    ) {
        let Some(entry) = self.updates.get(operation_id) else {
            debug!(%operation_id, "discarding item of cancelled async update");
            return;
        };
        if entry.token != token {
            return;
        }
        let request = entry.params.request.clone();

        match result {
            Ok(fresh) => {
                let Some(batch) = self.state.batches.iter_mut().find(|b| b.key == key) else {
                    // The list may have been reloaded in the meantime
                    debug!(%operation_id, key = ?key, "async update key no longer present; discarded");
                    return;
                };
                *batch = Batch::new(key.clone(), fresh);
                self.emit_update_event(UpdateEvent {
                    operation_id: operation_id.clone(),
                    request,
                    result: Ok(vec![key]),
                });
                self.publish();
            }
            Err(cause) => {
                self.emit_update_event(UpdateEvent {
                    operation_id: operation_id.clone(),
                    request,
                    result: Err(cause),
                });
            }
        }
    }

    fn handle_async_update_finished(
        &mut self,
        operation_id: &OperationId,
        token: u64,
        error: Option<UpdateError>,
    ) {
        let current = self
            .updates
            .get(operation_id)
            .is_some_and(|e| e.token == token);
        if !current {
            return;
        }
        let Some(entry) = self.updates.remove(operation_id) else {
            return;
        };

        if let Some(cause) = error {
            self.emit_update_event(UpdateEvent {
                operation_id: entry.params.operation_id.clone(),
                request: entry.params.request.clone(),
                result: Err(cause),
            });
        }
        self.publish();
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    fn handle_cancel_updates(&mut self, predicate: &UpdatePredicate<K, U>) {
        let selected: Vec<OperationId> = self
            .updates
            .values()
            .filter(|e| predicate(&e.params))
            .map(|e| e.params.operation_id.clone())
            .collect();

        for operation_id in selected {
            if let Some(entry) = self.updates.remove(&operation_id) {
                debug!(%operation_id, "cancelling update");
                entry.handle.abort();
                self.release_locks(&entry.params);
            }
        }
        self.waiting.retain(|p| !predicate(&p.params));

        self.drain_waiting();
        self.publish();
    }

    fn cancel_all_updates(&mut self) {
        for entry in self.updates.values() {
            entry.handle.abort();
        }
        self.updates.clear();
        self.waiting.clear();
        self.locked_keys.clear();
    }

    /// Discard running and queued synchronous updates after a reload result
    /// replaced the list they targeted. Not reported as failures.
    fn supersede_sync_updates(&mut self) {
        let superseded: Vec<OperationId> = self
            .updates
            .values()
            .filter(|e| e.params.mode == UpdateMode::Sync)
            .map(|e| e.params.operation_id.clone())
            .collect();

        for operation_id in superseded {
            if let Some(entry) = self.updates.remove(&operation_id) {
                debug!(%operation_id, "sync update superseded by reload");
                entry.handle.abort();
                self.release_locks(&entry.params);
            }
        }
        self.waiting.clear();
    }

    fn release_locks(&mut self, params: &UpdateParams<K, U>) {
        if params.mode.locks_keys() {
            for key in &params.keys {
                self.locked_keys.remove(key);
            }
        }
    }

    /// Start queued synchronous updates whose keys are all unlocked, in
    /// submission order. An earlier queued operation keeps its place ahead
    /// of a later one touching the same keys.
    fn drain_waiting(&mut self) {
        let mut still_waiting = VecDeque::new();
        while let Some(pending) = self.waiting.pop_front() {
            if pending.params.keys.is_disjoint(&self.locked_keys) {
                self.start_sync_update(pending.params);
            } else {
                still_waiting.push_back(pending);
            }
        }
        self.waiting = still_waiting;
    }

    // ========================================================================
    // Reset and publishing
    // ========================================================================

    fn reset(&mut self) {
        self.cancel_load();
        self.cancel_all_updates();
        self.state = BatchListState::new();
        self.prior_status = PaginationStatus::None;
        self.publish();
    }

    fn update_in_flight(&self, operation_id: &OperationId) -> bool {
        self.updates.contains_key(operation_id)
            || self
                .waiting
                .iter()
                .any(|p| &p.params.operation_id == operation_id)
    }

    fn next_update_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn emit_update_event(&self, event: UpdateEvent<K, U>) {
        // No subscribers is fine; results are advisory
        let _ = self.update_results.send(event);
    }

    /// Publish a fresh, fully consistent snapshot
    fn publish(&mut self) {
        self.state.in_flight_updates = self
            .updates
            .values()
            .map(|e| (e.params.operation_id.clone(), e.params.keys.clone()))
            .chain(
                self.waiting
                    .iter()
                    .map(|p| (p.params.operation_id.clone(), p.params.keys.clone())),
            )
            .collect();
        self.state_tx.send_replace(self.state.clone());
    }
}
