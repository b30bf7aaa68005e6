//! **rt-store-memory** – an in-memory [`PersistentStore`], used by default
//! in tests and examples. Not durable: all data is lost when the process
//! exits. Grounded on the `Arc<RwLock<...>>`-wrapped-`HashMap` shape used
//! throughout the corpus for in-memory backends; transactions here are
//! snapshot-and-swap rather than a real MVCC engine, which is sufficient
//! for a single-process, single-writer runtime.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rt_store_core::{PersistentStore, RecheckMarker, StorageError, StoredEvent, Transaction};
use rt_types::EventId;
use serde_json::{json, Value};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct Lease {
    holder: String,
    expires_at_ms: i64,
}

#[derive(Debug, Clone, Default)]
struct StoreData {
    kv: HashMap<String, Value>,
    lists: HashMap<String, Vec<Value>>,
    events: Vec<StoredEvent>,
    recheck: Vec<RecheckMarker>,
    leases: HashMap<String, Lease>,
}

impl StoreData {
    fn with_defaults() -> Self {
        let mut kv = HashMap::new();
        kv.insert(
            rt_store_core::reserved_keys::INCOMING.to_string(),
            json!([]),
        );
        kv.insert(
            rt_store_core::reserved_keys::OUTGOING.to_string(),
            json!([]),
        );
        kv.insert(rt_store_core::reserved_keys::STATE.to_string(), json!({}));
        kv.insert(
            rt_store_core::reserved_keys::EVENT_STORE.to_string(),
            json!([]),
        );
        Self {
            kv,
            ..Default::default()
        }
    }
}

/// An in-memory [`PersistentStore`]. Cloning shares the underlying data.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreData>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Construct an empty store with the reserved top-level keys already
    /// initialized.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreData::with_defaults())),
        }
    }

    /// Snapshot the current `state` subtree. Test-only convenience; not
    /// part of [`PersistentStore`].
    pub async fn state_snapshot(&self) -> Value {
        self.inner
            .lock()
            .await
            .kv
            .get(rt_store_core::reserved_keys::STATE)
            .cloned()
            .unwrap_or(json!({}))
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, StorageError> {
        let snapshot = self.inner.lock().await.clone();
        Ok(Box::new(MemoryTransaction {
            shared: self.inner.clone(),
            snapshot,
            finished: false,
        }))
    }

    async fn apply_schema(&self, sql: &str) -> Result<(), StorageError> {
        // The in-memory backend has no SQL engine; protocol schemas only
        // matter to the SQL view, which this backend does not expose.
        // Validate the statements parse, so schema errors surface the same
        // way they would against `rt-store-sqlite`.
        if rt_store_core::split_schema_statements(sql).is_empty() && !sql.trim().is_empty() {
            return Err(StorageError::SchemaError(
                "schema produced no statements".into(),
            ));
        }
        Ok(())
    }
}

struct MemoryTransaction {
    shared: Arc<Mutex<StoreData>>,
    snapshot: StoreData,
    finished: bool,
}

impl MemoryTransaction {
    fn guard_open(&self) -> Result<(), StorageError> {
        if self.finished {
            return Err(StorageError::TransactionFinished);
        }
        Ok(())
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.guard_open()?;
        Ok(self.snapshot.kv.get(key).cloned())
    }

    async fn set(&mut self, key: &str, value: Value) -> Result<(), StorageError> {
        self.guard_open()?;
        self.snapshot.kv.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> Result<(), StorageError> {
        self.guard_open()?;
        self.snapshot.kv.remove(key);
        Ok(())
    }

    async fn contains(&self, key: &str) -> Result<bool, StorageError> {
        self.guard_open()?;
        Ok(self.snapshot.kv.contains_key(key))
    }

    async fn iter_keys(&self) -> Result<Vec<String>, StorageError> {
        self.guard_open()?;
        Ok(self.snapshot.kv.keys().cloned().collect())
    }

    async fn list_get(&self, name: &str) -> Result<Vec<Value>, StorageError> {
        self.guard_open()?;
        Ok(self.snapshot.lists.get(name).cloned().unwrap_or_default())
    }

    async fn list_append(&mut self, name: &str, value: Value) -> Result<(), StorageError> {
        self.guard_open()?;
        self.snapshot
            .lists
            .entry(name.to_string())
            .or_default()
            .push(value);
        Ok(())
    }

    async fn event_store_append(&mut self, event: StoredEvent) -> Result<bool, StorageError> {
        self.guard_open()?;
        if self
            .snapshot
            .events
            .iter()
            .any(|e| e.event_id == event.event_id)
        {
            return Ok(false);
        }
        let mirror = serde_json::to_value(&event)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.snapshot.events.push(event);
        if let Some(Value::Array(list)) = self
            .snapshot
            .kv
            .get_mut(rt_store_core::reserved_keys::EVENT_STORE)
        {
            list.push(mirror);
        }
        Ok(true)
    }

    async fn event_store_list(&self) -> Result<Vec<StoredEvent>, StorageError> {
        self.guard_open()?;
        Ok(self.snapshot.events.clone())
    }

    async fn event_store_contains(&self, event_id: &EventId) -> Result<bool, StorageError> {
        self.guard_open()?;
        Ok(self.snapshot.events.iter().any(|e| &e.event_id == event_id))
    }

    async fn recheck_insert(&mut self, marker: RecheckMarker) -> Result<(), StorageError> {
        self.guard_open()?;
        self.snapshot.recheck.retain(|m| m.event_id != marker.event_id);
        self.snapshot.recheck.push(marker);
        Ok(())
    }

    async fn recheck_select(&self, limit: usize) -> Result<Vec<RecheckMarker>, StorageError> {
        self.guard_open()?;
        let mut markers = self.snapshot.recheck.clone();
        markers.sort_by_key(|m| m.available_at_ms);
        markers.truncate(limit);
        Ok(markers)
    }

    async fn recheck_delete(&mut self, event_ids: &[EventId]) -> Result<(), StorageError> {
        self.guard_open()?;
        self.snapshot
            .recheck
            .retain(|m| !event_ids.contains(&m.event_id));
        Ok(())
    }

    async fn acquire_lease(
        &mut self,
        name: &str,
        holder: &str,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<bool, StorageError> {
        self.guard_open()?;
        let expired_or_same = match self.snapshot.leases.get(name) {
            None => true,
            Some(existing) => existing.holder == holder || existing.expires_at_ms <= now_ms,
        };
        if !expired_or_same {
            return Ok(false);
        }
        self.snapshot.leases.insert(
            name.to_string(),
            Lease {
                holder: holder.to_string(),
                expires_at_ms: now_ms + ttl_ms,
            },
        );
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let mut shared = self.shared.lock().await;
        *shared = self.snapshot;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        Ok(())
    }
}
