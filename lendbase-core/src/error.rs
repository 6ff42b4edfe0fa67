//! Error taxonomy for Lendbase operations
//!
//! Every repository operation returns either a value or a single
//! `StoreError`. Variants carry string reasons (never wrapped driver
//! errors) so that errors stay `Clone`: single-flight waiters share one
//! result, success or failure, by cloning it.

use thiserror::Error;

/// Errors surfaced by repository, translator and cache operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Identity or predicate match does not exist (live rows only).
    #[error("not found")]
    NotFound,

    /// Caller-supplied argument is unusable: identity 0, empty id list,
    /// unparseable sort clause, empty patch.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// Structured predicate violated the descriptor: non-whitelisted
    /// column, forbidden operator, excessive OR nesting.
    #[error("invalid query: {reason}")]
    InvalidQuery { reason: String },

    /// Unique or check constraint violation on insert/update.
    #[error("conflict: {reason}")]
    Conflict { reason: String },

    /// The ambient deadline fired before the operation finished.
    #[error("operation cancelled")]
    Cancelled,

    /// Backend I/O failure (pool exhaustion, connection loss, statement
    /// failure other than a constraint violation).
    #[error("backend unavailable: {reason}")]
    BackendUnavailable { reason: String },

    /// Cache I/O or encoding failure. Never surfaced from a public
    /// operation: write-path failures are logged and swallowed, read-path
    /// failures degrade to a backend fetch.
    #[error("cache failure: {reason}")]
    CacheFailure { reason: String },
}

impl StoreError {
    /// Create an InvalidArgument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create an InvalidQuery error.
    pub fn invalid_query(reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            reason: reason.into(),
        }
    }

    /// Create a Conflict error.
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }

    /// Create a BackendUnavailable error.
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a CacheFailure error.
    pub fn cache(reason: impl Into<String>) -> Self {
        Self::CacheFailure {
            reason: reason.into(),
        }
    }

    /// InvalidArgument for the reserved identity `0`.
    pub fn unset_id() -> Self {
        Self::invalid_argument("identity 0 is reserved as unset")
    }

    /// InvalidQuery naming a column outside the descriptor whitelist.
    pub fn column_not_allowed(column: &str) -> Self {
        Self::invalid_query(format!("column '{column}' is not filterable"))
    }

    /// Whether this error denotes a missing entity.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Result type alias used throughout Lendbase.
pub type StoreResult<T> = Result<T, StoreError>;
