//! The Dependency/Recheck Subsystem: drains markers left by
//! projectors that deferred on a missing dependency, then replays the whole
//! event store so newly-satisfiable projections catch up. A single-drainer
//! lease keeps concurrent ticks from racing.

use std::sync::Arc;

use rt_store_core::{PersistentStore, Transaction};
use rt_types::Envelope;

use crate::dispatch::Dispatcher;
use crate::error::DispatchError;
use crate::registry::Registry;

const LEASE_NAME: &str = "recheck.blocked.process_unblocked";
const LEASE_TTL_MS: i64 = 30_000;
const DEFAULT_BATCH_LIMIT: usize = 1000;

/// Outcome of one [`RecheckDrainer::process_unblocked`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecheckReport {
    /// False if another holder already held the lease; nothing ran.
    pub drained: bool,
    /// Number of events successfully replayed.
    pub replayed: usize,
    /// Number of events whose replay failed (logged, not bubbled).
    pub failed: usize,
}

/// Drains the recheck queue and replays the event store under a lease.
pub struct RecheckDrainer {
    store: Arc<dyn PersistentStore>,
    dispatcher: Dispatcher,
    batch_limit: usize,
}

impl RecheckDrainer {
    /// Build a drainer over `store`, routing replayed envelopes through
    /// `registry`.
    pub fn new(store: Arc<dyn PersistentStore>, registry: Arc<Registry>) -> Self {
        Self {
            dispatcher: Dispatcher::new(store.clone(), registry),
            store,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    /// Run the `blocked.process_unblocked` system job once, identifying this
    /// caller as `holder` for lease purposes.
    pub async fn process_unblocked(
        &self,
        holder: &str,
        time_now_ms: i64,
    ) -> Result<RecheckReport, DispatchError> {
        let mut tx = self.store.begin_transaction().await?;

        let acquired = tx
            .acquire_lease(LEASE_NAME, holder, time_now_ms, LEASE_TTL_MS)
            .await?;
        if !acquired {
            tx.rollback().await?;
            return Ok(RecheckReport {
                drained: false,
                replayed: 0,
                failed: 0,
            });
        }

        let markers = tx.recheck_select(self.batch_limit).await?;
        let marker_ids: Vec<_> = markers.iter().map(|m| m.event_id.clone()).collect();
        tx.recheck_delete(&marker_ids).await?;

        let events = tx.event_store_list().await?;
        let mut report = RecheckReport {
            drained: true,
            replayed: 0,
            failed: 0,
        };
        for event in events {
            let mut envelope = Envelope::new(event.data);
            envelope.metadata =
                serde_json::from_value(event.metadata).unwrap_or_default();
            envelope.metadata.event_id = Some(event.event_id);
            match self
                .dispatcher
                .dispatch_in_tx(tx.as_mut(), envelope, time_now_ms)
                .await
            {
                Ok(()) => report.replayed += 1,
                Err(err) => {
                    tracing::warn!(error = %err, "recheck replay failed for one event");
                    report.failed += 1;
                }
            }
        }

        tx.commit().await?;
        Ok(report)
    }
}
