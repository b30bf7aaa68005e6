//! The transaction handle. Every
//! mutation goes through an open `Transaction`; there is no implicit
//! "current transaction" thread-local, so nesting is a compile-time
//! impossibility rather than a runtime flag check.

use async_trait::async_trait;
use rt_types::EventId;
use serde_json::Value;

use crate::error::StorageError;
use crate::model::{RecheckMarker, StoredEvent};

/// An open transaction against a [`crate::PersistentStore`]. All reads and
/// writes — key-value, ordered-list, event-store, recheck-queue, lease —
/// flow through one of these, and become durable together on [`commit`] or
/// vanish together on [`rollback`].
///
/// [`commit`]: Transaction::commit
/// [`rollback`]: Transaction::rollback
#[async_trait]
pub trait Transaction: Send {
    // ---- key-value view ----

    /// Read a top-level key (`incoming`, `outgoing`, `eventStore`, `state`,
    /// or any protocol-defined key nested under `state`).
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    /// Write a top-level key.
    async fn set(&mut self, key: &str, value: Value) -> Result<(), StorageError>;
    /// Remove a top-level key.
    async fn delete(&mut self, key: &str) -> Result<(), StorageError>;
    /// True if `key` currently has a value.
    async fn contains(&self, key: &str) -> Result<bool, StorageError>;
    /// All currently-set top-level keys.
    async fn iter_keys(&self) -> Result<Vec<String>, StorageError>;

    // ---- ordered-list view ----

    /// Read the named list in insertion order.
    async fn list_get(&self, name: &str) -> Result<Vec<Value>, StorageError>;
    /// Append a value to the named list.
    async fn list_append(&mut self, name: &str, value: Value) -> Result<(), StorageError>;

    // ---- event store ----

    /// Insert an event keyed by its event ID. `INSERT OR IGNORE` semantics:
    /// returns `Ok(true)` if this call inserted a new row, `Ok(false)` if
    /// `event_id` was already present (idempotent no-op).
    async fn event_store_append(&mut self, event: StoredEvent) -> Result<bool, StorageError>;
    /// All events, in insertion order.
    async fn event_store_list(&self) -> Result<Vec<StoredEvent>, StorageError>;
    /// True if `event_id` has already been appended.
    async fn event_store_contains(&self, event_id: &EventId) -> Result<bool, StorageError>;

    // ---- recheck queue ----

    /// Insert a recheck marker.
    async fn recheck_insert(&mut self, marker: RecheckMarker) -> Result<(), StorageError>;
    /// Select up to `limit` markers ordered by `available_at_ms`.
    async fn recheck_select(&self, limit: usize) -> Result<Vec<RecheckMarker>, StorageError>;
    /// Delete the named markers.
    async fn recheck_delete(&mut self, event_ids: &[EventId]) -> Result<(), StorageError>;

    // ---- lease helper ----

    /// Attempt to acquire (or renew, if already held by `holder`) the named
    /// lease. Succeeds only if no unexpired lease exists under another
    /// holder.
    async fn acquire_lease(
        &mut self,
        name: &str,
        holder: &str,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<bool, StorageError>;

    /// Commit every write made on this transaction, consuming it.
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;
    /// Discard every write made on this transaction, consuming it.
    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}
