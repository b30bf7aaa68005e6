//! Storage-side slice of the error taxonomy.

use thiserror::Error;

/// Failures a persistent store can report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The underlying store file/connection could not be opened. Fatal to
    /// the caller; bubbled.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    /// A protocol-supplied schema was malformed. Fatal to the caller.
    #[error("schema error: {0}")]
    SchemaError(String),
    /// An optimistic transaction observed a conflicting concurrent write.
    /// Retried by `with_retry`; bubbled if retries are exhausted.
    #[error("transaction conflict")]
    Conflict,
    /// A transaction was used after it had already been committed or rolled
    /// back, or a second transaction was opened while one was already
    /// active on the same handle. Nested opens are forbidden.
    #[error("transaction already finished")]
    TransactionFinished,
    /// A lower-level (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// A backend-specific I/O failure not covered by the above.
    #[error("backend error: {0}")]
    Backend(String),
}
