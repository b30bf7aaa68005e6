//! **rt-store-sqlite** – a SQLite-backed [`PersistentStore`], for when the
//! runtime needs durability across process restarts. Transactions are plain
//! `BEGIN`/`COMMIT`/`ROLLBACK` over a connection checked out of the pool for
//! the transaction's lifetime, rather than `sqlx`'s borrowed
//! `Transaction<'_, Sqlite>` type — that type's lifetime does not fit
//! cleanly behind the `Box<dyn Transaction>` the rest of the runtime holds.
//! The checked-out connection lives behind a `tokio::sync::Mutex` so that
//! [`Transaction`]'s read methods (which take `&self`, to let callers read
//! without declaring mutability) can still drive the connection.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use rt_store_core::{PersistentStore, RecheckMarker, StorageError, StoredEvent, Transaction};
use rt_types::EventId;
use serde_json::{json, Value};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, Sqlite, SqlitePool};
use tokio::sync::Mutex;

const MIGRATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS _kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS _list_store (
    list_name TEXT NOT NULL,
    item_order INTEGER NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (list_name, item_order)
);
CREATE TABLE IF NOT EXISTS _event_store (
    event_id TEXT PRIMARY KEY,
    event_type TEXT NOT NULL,
    data TEXT NOT NULL,
    metadata TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL,
    insertion_order INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS recheck_queue (
    event_id TEXT PRIMARY KEY,
    reason_type TEXT NOT NULL,
    available_at_ms INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS _lease (
    name TEXT PRIMARY KEY,
    holder TEXT NOT NULL,
    expires_at_ms INTEGER NOT NULL
);
"#;

fn err(e: sqlx::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// A SQLite-backed persistent store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if absent) a SQLite database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}", path.as_ref().display()))
                .map_err(err)?
                .create_if_missing(true);
        Self::from_options(options).await
    }

    /// An ephemeral, in-process database. Equivalent in durability to
    /// `rt-store-memory`, but exercises the real SQL code path.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(err)?;
        Self::from_options(options).await
    }

    async fn from_options(options: SqliteConnectOptions) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::StorageUnavailable(e.to_string()))?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(MIGRATIONS)
            .execute(&self.pool)
            .await
            .map_err(err)?;
        let mut conn = self.pool.acquire().await.map_err(err)?;
        for (key, default) in [
            (rt_store_core::reserved_keys::INCOMING, json!([])),
            (rt_store_core::reserved_keys::OUTGOING, json!([])),
            (rt_store_core::reserved_keys::STATE, json!({})),
        ] {
            sqlx::query("INSERT OR IGNORE INTO _kv_store (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default.to_string())
                .execute(&mut *conn)
                .await
                .map_err(err)?;
        }
        Ok(())
    }
}

#[async_trait]
impl PersistentStore for SqliteStore {
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(err)?;
        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(err)?;
        Ok(Box::new(SqliteTransaction {
            conn: Mutex::new(Some(conn)),
        }))
    }

    async fn apply_schema(&self, sql: &str) -> Result<(), StorageError> {
        let statements = rt_store_core::split_schema_statements(sql);
        let mut conn = self.pool.acquire().await.map_err(err)?;
        for stmt in statements {
            sqlx::query(&stmt)
                .execute(&mut *conn)
                .await
                .map_err(|e| StorageError::SchemaError(e.to_string()))?;
        }
        Ok(())
    }
}

struct SqliteTransaction {
    conn: Mutex<Option<PoolConnection<Sqlite>>>,
}

fn row_to_stored_event(row: sqlx::sqlite::SqliteRow) -> Result<StoredEvent, StorageError> {
    let event_id: String = row.try_get("event_id").map_err(err)?;
    let event_type: String = row.try_get("event_type").map_err(err)?;
    let data: String = row.try_get("data").map_err(err)?;
    let metadata: String = row.try_get("metadata").map_err(err)?;
    let created_at_ms: i64 = row.try_get("created_at_ms").map_err(err)?;
    Ok(StoredEvent {
        event_id: EventId(event_id),
        event_type,
        data: serde_json::from_str(&data)
            .map_err(|e| StorageError::Serialization(e.to_string()))?,
        metadata: serde_json::from_str(&metadata)
            .map_err(|e| StorageError::Serialization(e.to_string()))?,
        created_at_ms,
    })
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::TransactionFinished)?;

        if key == rt_store_core::reserved_keys::EVENT_STORE {
            let rows = sqlx::query(
                "SELECT event_id, event_type, data, metadata, created_at_ms FROM _event_store \
                 ORDER BY insertion_order ASC",
            )
            .fetch_all(&mut **conn)
            .await
            .map_err(err)?;
            let events = rows
                .into_iter()
                .map(row_to_stored_event)
                .collect::<Result<Vec<_>, _>>()?;
            let mirrored = serde_json::to_value(events)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            return Ok(Some(mirrored));
        }

        let row = sqlx::query("SELECT value FROM _kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&mut **conn)
            .await
            .map_err(err)?;
        match row {
            None => Ok(None),
            Some(row) => {
                let raw: String = row.try_get("value").map_err(err)?;
                Ok(Some(serde_json::from_str(&raw).map_err(|e| {
                    StorageError::Serialization(e.to_string())
                })?))
            }
        }
    }

    async fn set(&mut self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::TransactionFinished)?;
        sqlx::query(
            "INSERT INTO _kv_store (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value.to_string())
        .execute(&mut **conn)
        .await
        .map_err(err)?;
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> Result<(), StorageError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::TransactionFinished)?;
        sqlx::query("DELETE FROM _kv_store WHERE key = ?")
            .bind(key)
            .execute(&mut **conn)
            .await
            .map_err(err)?;
        Ok(())
    }

    async fn contains(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn iter_keys(&self) -> Result<Vec<String>, StorageError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::TransactionFinished)?;
        let rows = sqlx::query("SELECT key FROM _kv_store")
            .fetch_all(&mut **conn)
            .await
            .map_err(err)?;
        let mut keys: Vec<String> = rows
            .into_iter()
            .map(|r| r.try_get::<String, _>("key").map_err(err))
            .collect::<Result<_, _>>()?;
        keys.push(rt_store_core::reserved_keys::EVENT_STORE.to_string());
        Ok(keys)
    }

    async fn list_get(&self, name: &str) -> Result<Vec<Value>, StorageError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::TransactionFinished)?;
        let rows = sqlx::query(
            "SELECT data FROM _list_store WHERE list_name = ? ORDER BY item_order ASC",
        )
        .bind(name)
        .fetch_all(&mut **conn)
        .await
        .map_err(err)?;
        rows.into_iter()
            .map(|r| {
                let raw: String = r.try_get("data").map_err(err)?;
                serde_json::from_str(&raw).map_err(|e| StorageError::Serialization(e.to_string()))
            })
            .collect()
    }

    async fn list_append(&mut self, name: &str, value: Value) -> Result<(), StorageError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::TransactionFinished)?;
        let next_order: i64 = sqlx::query(
            "SELECT COALESCE(MAX(item_order), -1) + 1 AS next FROM _list_store \
             WHERE list_name = ?",
        )
        .bind(name)
        .fetch_one(&mut **conn)
        .await
        .map_err(err)?
        .try_get("next")
        .map_err(err)?;
        sqlx::query("INSERT INTO _list_store (list_name, item_order, data) VALUES (?, ?, ?)")
            .bind(name)
            .bind(next_order)
            .bind(value.to_string())
            .execute(&mut **conn)
            .await
            .map_err(err)?;
        Ok(())
    }

    async fn event_store_append(&mut self, event: StoredEvent) -> Result<bool, StorageError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::TransactionFinished)?;
        let next_order: i64 =
            sqlx::query("SELECT COALESCE(MAX(insertion_order), -1) + 1 AS next FROM _event_store")
                .fetch_one(&mut **conn)
                .await
                .map_err(err)?
                .try_get("next")
                .map_err(err)?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO _event_store \
             (event_id, event_type, data, metadata, created_at_ms, insertion_order) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.event_id.0)
        .bind(&event.event_type)
        .bind(event.data.to_string())
        .bind(event.metadata.to_string())
        .bind(event.created_at_ms)
        .bind(next_order)
        .execute(&mut **conn)
        .await
        .map_err(err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn event_store_list(&self) -> Result<Vec<StoredEvent>, StorageError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::TransactionFinished)?;
        let rows = sqlx::query(
            "SELECT event_id, event_type, data, metadata, created_at_ms FROM _event_store \
             ORDER BY insertion_order ASC",
        )
        .fetch_all(&mut **conn)
        .await
        .map_err(err)?;
        rows.into_iter().map(row_to_stored_event).collect()
    }

    async fn event_store_contains(&self, event_id: &EventId) -> Result<bool, StorageError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::TransactionFinished)?;
        let row = sqlx::query("SELECT 1 AS present FROM _event_store WHERE event_id = ?")
            .bind(&event_id.0)
            .fetch_optional(&mut **conn)
            .await
            .map_err(err)?;
        Ok(row.is_some())
    }

    async fn recheck_insert(&mut self, marker: RecheckMarker) -> Result<(), StorageError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::TransactionFinished)?;
        sqlx::query(
            "INSERT OR REPLACE INTO recheck_queue (event_id, reason_type, available_at_ms) \
             VALUES (?, ?, ?)",
        )
        .bind(&marker.event_id.0)
        .bind(&marker.reason_type)
        .bind(marker.available_at_ms)
        .execute(&mut **conn)
        .await
        .map_err(err)?;
        Ok(())
    }

    async fn recheck_select(&self, limit: usize) -> Result<Vec<RecheckMarker>, StorageError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::TransactionFinished)?;
        let rows = sqlx::query(
            "SELECT event_id, reason_type, available_at_ms FROM recheck_queue \
             ORDER BY available_at_ms ASC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&mut **conn)
        .await
        .map_err(err)?;
        rows.into_iter()
            .map(|r| {
                Ok(RecheckMarker {
                    event_id: EventId(r.try_get("event_id").map_err(err)?),
                    reason_type: r.try_get("reason_type").map_err(err)?,
                    available_at_ms: r.try_get("available_at_ms").map_err(err)?,
                })
            })
            .collect()
    }

    async fn recheck_delete(&mut self, event_ids: &[EventId]) -> Result<(), StorageError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::TransactionFinished)?;
        for id in event_ids {
            sqlx::query("DELETE FROM recheck_queue WHERE event_id = ?")
                .bind(&id.0)
                .execute(&mut **conn)
                .await
                .map_err(err)?;
        }
        Ok(())
    }

    async fn acquire_lease(
        &mut self,
        name: &str,
        holder: &str,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<bool, StorageError> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(StorageError::TransactionFinished)?;
        let existing = sqlx::query("SELECT holder, expires_at_ms FROM _lease WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut **conn)
            .await
            .map_err(err)?;
        let may_acquire = match existing {
            None => true,
            Some(row) => {
                let existing_holder: String = row.try_get("holder").map_err(err)?;
                let expires_at_ms: i64 = row.try_get("expires_at_ms").map_err(err)?;
                existing_holder == holder || expires_at_ms <= now_ms
            }
        };
        if !may_acquire {
            return Ok(false);
        }
        sqlx::query(
            "INSERT INTO _lease (name, holder, expires_at_ms) VALUES (?, ?, ?) \
             ON CONFLICT(name) DO UPDATE SET holder = excluded.holder, \
             expires_at_ms = excluded.expires_at_ms",
        )
        .bind(name)
        .bind(holder)
        .bind(now_ms + ttl_ms)
        .execute(&mut **conn)
        .await
        .map_err(err)?;
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let mut conn = self
            .conn
            .into_inner()
            .ok_or(StorageError::TransactionFinished)?;
        sqlx::query("COMMIT")
            .execute(&mut *conn)
            .await
            .map_err(err)?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        let mut conn = self
            .conn
            .into_inner()
            .ok_or(StorageError::TransactionFinished)?;
        sqlx::query("ROLLBACK")
            .execute(&mut *conn)
            .await
            .map_err(err)?;
        Ok(())
    }
}
