//! Error types for Batchflow
//!
//! Three layers: `Error` for the engine's own surface (dispatch
//! preconditions, lifecycle), `FetchError` for load-level failures reported
//! by a [`BatchFetcher`](crate::fetcher::BatchFetcher), and `UpdateError` for
//! key-level failures reported by a
//! [`BatchUpdateFetcher`](crate::fetcher::BatchUpdateFetcher) or by the
//! engine's own update bookkeeping. Nothing here is fatal: every failure is
//! recoverable by resubmitting an appropriate action.

use thiserror::Error;

/// The main error type for the Batchflow engine surface
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Dispatch preconditions
    // ============================================================================
    /// An `UpdateBatches` action was dispatched with no target keys
    #[error("Update action requires a non-empty key set")]
    EmptyKeySet,

    /// The source's actor is gone; the handle can no longer accept actions
    #[error("Source has been shut down; action dropped")]
    SourceClosed,

    // ============================================================================
    // Collaborator failures
    // ============================================================================
    /// A load-level failure surfaced through the engine
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// A key-level failure surfaced through the engine
    #[error("Update failed: {0}")]
    Update(#[from] UpdateError),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    /// Anything else, as a message
    #[error("{0}")]
    Other(String),

    /// Escape hatch for wrapped third-party errors
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Create a generic error from a message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Load-level failure produced by a batch fetcher or the load pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The fetcher could not reach its backend
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The fetcher could not make sense of what the backend returned
    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    /// A `LoadMore` result would have violated key uniqueness
    #[error("Fetcher returned a batch with an already-loaded key: {key}")]
    DuplicateKey { key: String },

    /// The load was cancelled before it resolved
    #[error("Load was cancelled")]
    Cancelled,

    /// Anything else, as a message
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a duplicate key error
    pub fn duplicate_key(key: impl Into<String>) -> Self {
        Self::DuplicateKey { key: key.into() }
    }

    /// Create a generic fetch error from a message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Key-level failure produced by an update fetcher or the update pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// The update fetcher failed for the whole call
    #[error("Update fetch failed: {message}")]
    Fetch { message: String },

    /// The action was dropped by the deduplication rule
    #[error("An update with operation id '{operation_id}' is already in flight")]
    OperationInFlight { operation_id: String },

    /// Every requested key was missing from the loaded list
    #[error("None of the requested keys are present in the list")]
    NoMatchingKeys,

    /// Anything else, as a message
    #[error("{0}")]
    Other(String),
}

impl UpdateError {
    /// Create an update fetch error
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
        }
    }

    /// Create an operation-in-flight error
    pub fn operation_in_flight(operation_id: impl Into<String>) -> Self {
        Self::OperationInFlight {
            operation_id: operation_id.into(),
        }
    }

    /// Create a generic update error from a message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Result type alias for Batchflow
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::EmptyKeySet;
        assert_eq!(err.to_string(), "Update action requires a non-empty key set");

        let err = FetchError::transport("connection refused");
        assert_eq!(err.to_string(), "Transport error: connection refused");

        let err = FetchError::duplicate_key("k1");
        assert_eq!(
            err.to_string(),
            "Fetcher returned a batch with an already-loaded key: k1"
        );

        let err = UpdateError::operation_in_flight("op1");
        assert_eq!(
            err.to_string(),
            "An update with operation id 'op1' is already in flight"
        );
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = FetchError::transport("timeout").into();
        assert!(matches!(err, Error::Fetch(_)));

        let err: Error = UpdateError::NoMatchingKeys.into();
        assert!(matches!(err, Error::Update(_)));
    }

    #[test]
    fn test_collaborator_errors_clone_and_compare() {
        let err = UpdateError::fetch("500");
        assert_eq!(err.clone(), err);

        let err = FetchError::Cancelled;
        assert_eq!(err.clone(), FetchError::Cancelled);
    }
}
