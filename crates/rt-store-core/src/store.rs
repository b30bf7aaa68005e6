//! The top-level store handle and the retry discipline around
//! it.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;
use crate::transaction::Transaction;

/// A persistent store: the single source of truth behind `incoming`,
/// `outgoing`, `eventStore`, `state` and any protocol-defined SQL tables.
/// All reads and writes happen through a [`Transaction`] opened here.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Open a new transaction. Reserved top-level keys are guaranteed
    /// present once the store has been initialized.
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, StorageError>;

    /// Apply a protocol-supplied schema once, idempotently. Safe to call more than once; index-create statements use `IF
    /// NOT EXISTS`.
    async fn apply_schema(&self, sql: &str) -> Result<(), StorageError>;
}

/// `with_retry`'s backoff policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: usize,
    /// Delay before each retry, indexed by retry number (0-based). The last
    /// entry is reused if `max_retries` exceeds the list length.
    pub backoff: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: vec![
                Duration::from_millis(50),
                Duration::from_millis(100),
                Duration::from_millis(150),
            ],
        }
    }
}

impl RetryPolicy {
    /// The backoff delay before retry number `retry_index` (0-based),
    /// clamped to the last configured entry once the schedule is exhausted.
    pub fn delay_for(&self, retry_index: usize) -> Duration {
        self.backoff
            .get(retry_index)
            .copied()
            .unwrap_or_else(|| *self.backoff.last().expect("non-empty backoff schedule"))
    }
}

/// A unit of work run against an open transaction, boxed so its lifetime can
/// be tied to the borrow of that transaction. `body` in [`with_retry`] takes
/// this shape rather than a plain `async fn` because a bare `FnMut(&mut dyn
/// Transaction) -> impl Future` cannot express "the future borrows its
/// argument" without higher-ranked trait bounds over an associated type.
pub type TxBody<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Run `body` against a fresh transaction, retrying on [`StorageError::Conflict`]
/// under `policy`, committing on success and rolling back on every failure
/// (including an exhausted retry budget).
pub async fn with_retry<T, F>(
    store: &dyn PersistentStore,
    policy: &RetryPolicy,
    mut body: F,
) -> Result<T, StorageError>
where
    F: for<'a> FnMut(&'a mut dyn Transaction) -> TxBody<'a, T>,
{
    let mut retry = 0;
    loop {
        let mut tx = store.begin_transaction().await?;
        match body(tx.as_mut()).await {
            Ok(value) => {
                tx.commit().await?;
                return Ok(value);
            }
            Err(StorageError::Conflict) if retry < policy.max_retries => {
                let _ = tx.rollback().await;
                tokio::time::sleep(policy.delay_for(retry)).await;
                retry += 1;
            }
            Err(err) => {
                let _ = tx.rollback().await;
                return Err(err);
            }
        }
    }
}

/// Read-modify-write helper for the key-value view, grounded on `core/db.py`'s
/// `update_nested`.
pub async fn update_nested<F>(
    tx: &mut dyn Transaction,
    key: &str,
    f: F,
) -> Result<(), StorageError>
where
    F: FnOnce(Value) -> Value,
{
    let current = tx.get(key).await?.unwrap_or(Value::Null);
    tx.set(key, f(current)).await
}
