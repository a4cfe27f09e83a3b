//! Common leaf types
//!
//! Batches, fetched pages, and operation identifiers. These are the values
//! that cross the boundary between the engine and its fetcher collaborators.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

// ============================================================================
// Batch
// ============================================================================

/// One loaded chunk of paginated data, identified by a key.
///
/// A batch is immutable once created: updates replace the whole batch,
/// never mutate it in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch<K, T> {
    /// Key identifying this batch; unique within a list
    pub key: K,
    /// Opaque payload, typically a page of items
    pub data: T,
}

impl<K, T> Batch<K, T> {
    /// Create a new batch
    pub fn new(key: K, data: T) -> Self {
        Self { key, data }
    }
}

// ============================================================================
// FetchedPage
// ============================================================================

/// Successful result of a batch fetch.
///
/// `batch` is `None` for an empty page; `has_more` is the fetcher's
/// end-of-data signal and drives whether further `LoadMore` calls are
/// accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage<K, T> {
    /// The fetched batch, if the page was non-empty
    pub batch: Option<Batch<K, T>>,
    /// Whether more pages are available after this one
    pub has_more: bool,
}

impl<K, T> FetchedPage<K, T> {
    /// A non-empty page with more data behind it
    pub fn page(key: K, data: T) -> Self {
        Self {
            batch: Some(Batch::new(key, data)),
            has_more: true,
        }
    }

    /// A non-empty page that ends pagination
    pub fn last_page(key: K, data: T) -> Self {
        Self {
            batch: Some(Batch::new(key, data)),
            has_more: false,
        }
    }

    /// An empty page; ends pagination unless overridden
    pub fn empty() -> Self {
        Self {
            batch: None,
            has_more: false,
        }
    }

    /// Override the end-of-data signal
    #[must_use]
    pub fn with_has_more(mut self, has_more: bool) -> Self {
        self.has_more = has_more;
        self
    }
}

// ============================================================================
// Operation identifiers
// ============================================================================

/// Token identifying one update operation, used to deduplicate concurrent
/// update requests. Callers performing idempotent updates should supply a
/// stable identifier; otherwise the engine assigns a fresh random one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(String);

impl OperationId {
    /// Create an operation id from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for OperationId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Source of default operation identifiers.
///
/// Injectable so tests can assert deduplication deterministically instead of
/// depending on ambient randomness.
pub trait OperationIdGenerator: Send + Sync {
    /// Produce the next identifier
    fn next_id(&self) -> OperationId;
}

/// Production generator: fresh random UUID v4 per operation
#[derive(Debug, Default)]
pub struct RandomIds;

impl OperationIdGenerator for RandomIds {
    fn next_id(&self) -> OperationId {
        OperationId::new(Uuid::new_v4().to_string())
    }
}

/// Deterministic generator: `op-0`, `op-1`, ... in submission order
#[derive(Debug, Default)]
pub struct SequentialIds {
    counter: AtomicU64,
}

impl SequentialIds {
    /// Create a generator starting at `op-0`
    pub fn new() -> Self {
        Self::default()
    }
}

impl OperationIdGenerator for SequentialIds {
    fn next_id(&self) -> OperationId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        OperationId::new(format!("op-{n}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetched_page_constructors() {
        let page = FetchedPage::page("k1", vec![1, 2]);
        assert!(page.has_more);
        assert_eq!(page.batch, Some(Batch::new("k1", vec![1, 2])));

        let page = FetchedPage::last_page("k2", vec![3]);
        assert!(!page.has_more);

        let page: FetchedPage<&str, Vec<i32>> = FetchedPage::empty();
        assert!(page.batch.is_none());
        assert!(!page.has_more);

        let page: FetchedPage<&str, Vec<i32>> = FetchedPage::empty().with_has_more(true);
        assert!(page.has_more);
    }

    #[test]
    fn test_operation_id_equality() {
        let a = OperationId::from("op1");
        let b = OperationId::new("op1".to_string());
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "op1");
        assert_eq!(a.to_string(), "op1");
    }

    #[test]
    fn test_random_ids_are_unique() {
        let generator = RandomIds;
        assert_ne!(generator.next_id(), generator.next_id());
    }

    #[test]
    fn test_sequential_ids() {
        let generator = SequentialIds::new();
        assert_eq!(generator.next_id(), OperationId::from("op-0"));
        assert_eq!(generator.next_id(), OperationId::from("op-1"));
    }

    #[test]
    fn test_batch_serialization() {
        let batch = Batch::new("k1".to_string(), vec![1, 2, 3]);
        let json = serde_json::to_string(&batch).unwrap();
        let restored: Batch<String, Vec<i32>> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, batch);
    }
}
