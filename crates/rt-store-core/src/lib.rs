//! **rt-store-core** – the persistent-store abstraction:
//! key-value, ordered-list, event-store, recheck-queue and lease
//! operations, all reached through an explicit [`Transaction`] rather than
//! an implicit "current transaction". No concrete backend lives
//! here; see `rt-store-memory` and `rt-store-sqlite`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod model;
mod schema;
mod store;
mod transaction;

pub use error::StorageError;
pub use model::{RecheckMarker, StoredEvent};
pub use schema::split_schema_statements;
pub use store::{update_nested, with_retry, PersistentStore, RetryPolicy, TxBody};
pub use transaction::Transaction;

/// Reserved top-level store keys.
pub mod reserved_keys {
    /// Raw blobs awaiting decryption.
    pub const INCOMING: &str = "incoming";
    /// Records awaiting delivery by the transport.
    pub const OUTGOING: &str = "outgoing";
    /// The append-only event log, when modeled as a top-level list.
    pub const EVENT_STORE: &str = "eventStore";
    /// The root of all domain projections.
    pub const STATE: &str = "state";
}

/// Re-exports convenient for downstream crates.
pub mod prelude {
    pub use crate::{
        reserved_keys, update_nested, with_retry, PersistentStore, RecheckMarker, RetryPolicy,
        StorageError, StoredEvent, Transaction, TxBody,
    };
}
