//! # Batchflow
//!
//! A generic, data-agnostic batch pagination and incremental-update engine.
//!
//! Batchflow manages an ordered collection of fetched batches (pages) keyed
//! by an opaque key type, coordinates loading more batches, and supports
//! targeted key-scoped updates to already-loaded batches without disturbing
//! the rest of the list.
//!
//! ## Features
//!
//! - **Single-writer orchestration**: all state transitions are serialized
//!   through one actor, so every observed snapshot is fully consistent
//! - **Cancellable background work**: loads and updates run off the actor
//!   and can be cancelled race-free at any time
//! - **Request de-duplication**: concurrent updates with the same operation
//!   identifier collapse to a single in-flight fetch
//! - **Partial-failure isolation**: a failed update for one key never
//!   disturbs the rest of the list or the pagination status
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use batchflow::{BatchAction, BatchListSource};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> batchflow::Result<()> {
//!     let source = BatchListSource::new(Arc::new(my_fetcher), None);
//!
//!     let mut states = source.observe();
//!     source.dispatch(BatchAction::reload(first_page_params))?;
//!
//!     while states.changed().await.is_ok() {
//!         // React to each consistent snapshot
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      BatchListSource                         │
//! │  dispatch(BatchAction)        observe() → BatchListState     │
//! │                               update_results() → UpdateEvent │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ serialized action queue
//! ┌──────────────────────────────┴───────────────────────────────┐
//! │                     single-writer actor                      │
//! │  reducer │ load tasks │ key locks │ wait queue │ dedup table │
//! └─────────┬──────────────────────────────────────────┬─────────┘
//!           │ BatchFetcher                              │ BatchUpdateFetcher
//!      Reload / LoadMore                         fetch_sync / fetch_async
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the engine and its collaborators
pub mod error;

/// Common leaf types: batches, pages, operation identifiers
pub mod types;

/// Immutable list snapshots and the pagination status machine
pub mod state;

/// Fetcher collaborator traits
pub mod fetcher;

/// The batch list source: actions, orchestrator, and side channels
pub mod source;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, FetchError, Result, UpdateError};
pub use fetcher::{BatchFetcher, BatchUpdateFetcher, UpdateStream};
pub use source::{BatchAction, BatchListSource, UpdateEvent, UpdateMode, UpdateParams};
pub use state::{BatchListState, PaginationStatus};
pub use types::{Batch, FetchedPage, OperationId, OperationIdGenerator, RandomIds, SequentialIds};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
