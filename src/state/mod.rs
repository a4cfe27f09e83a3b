//! Batch list snapshots and the pagination status machine
//!
//! # Overview
//!
//! The state module provides:
//! - `BatchListState` - the aggregate, immutable snapshot emitted to observers
//! - `PaginationStatus` - the engine's overall state-machine value
//!
//! Snapshots are copy-on-write: the orchestrator owns one mutable value and
//! publishes a fresh clone per transition, so observers never see a
//! partially-applied state.

mod types;

pub use types::{BatchListState, PaginationStatus};
