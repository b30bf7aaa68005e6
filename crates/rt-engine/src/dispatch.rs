//! The Projection Dispatcher: routes one envelope to exactly one
//! projector and applies its effects transactionally.

use std::sync::Arc;

use rt_store_core::{PersistentStore, StoredEvent, Transaction};
use rt_types::{Envelope, EventId};

use crate::error::DispatchError;
use crate::registry::{self, Registry};

/// Routes envelopes to registered projectors and appends them to the event
/// store.
pub struct Dispatcher {
    store: Arc<dyn PersistentStore>,
    registry: Arc<Registry>,
}

/// Outcome of running a batch of envelopes through [`Dispatcher::dispatch_batch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Total envelopes attempted.
    pub attempted: usize,
    /// Envelopes whose projection failed (logged, not bubbled).
    pub failed: usize,
}

impl Dispatcher {
    /// Build a dispatcher over `store`, routing by `registry`'s type map.
    pub fn new(store: Arc<dyn PersistentStore>, registry: Arc<Registry>) -> Self {
        Self { store, registry }
    }

    /// Route `envelope` in its own fresh transaction.
    pub async fn dispatch(&self, envelope: Envelope, time_now_ms: i64) -> Result<(), DispatchError> {
        let mut tx = self.store.begin_transaction().await?;
        match self.dispatch_in_tx(tx.as_mut(), envelope, time_now_ms).await {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(err) => {
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }

    /// Route `envelope` inside an already-open transaction.
    pub async fn dispatch_in_tx(
        &self,
        tx: &mut dyn Transaction,
        envelope: Envelope,
        time_now_ms: i64,
    ) -> Result<(), DispatchError> {
        let event_type = envelope.event_type().to_string();

        // An event type with no declared handler falls back to whichever
        // handler declares the catch-all "unknown" type, preserving the
        // original type in the stored event rather than rewriting it. Only
        // drops the envelope if no handler declares "unknown" either.
        let handler = match self
            .registry
            .handler_for_type(&event_type)
            .or_else(|| self.registry.handler_for_type("unknown"))
        {
            Some(h) => h.to_string(),
            None => {
                tracing::error!(event_type = %event_type, "no handler for event type, dropping envelope");
                return Err(DispatchError::HandlerNotFound(event_type));
            }
        };

        if let Some(projector) = registry::projector_for(&handler).await {
            projector
                .project(tx, &envelope, time_now_ms)
                .await
                .map_err(|reason| DispatchError::Projector {
                    handler: handler.clone(),
                    reason,
                })?;
        }

        let event_id = envelope.metadata.event_id.clone().unwrap_or_else(|| {
            EventId::derive(None, envelope.data.as_ref().unwrap_or(&serde_json::Value::Null))
        });
        let metadata =
            serde_json::to_value(&envelope.metadata).unwrap_or_else(|_| serde_json::json!({}));
        let stored = StoredEvent {
            event_id,
            event_type,
            data: envelope.data.unwrap_or(serde_json::Value::Null),
            metadata,
            created_at_ms: time_now_ms,
        };
        tx.event_store_append(stored).await?;
        Ok(())
    }

    /// Run every envelope in `envelopes` through [`dispatch`](Self::dispatch),
    /// each in its own transaction; a per-envelope failure is logged and
    /// counted but does not abort the batch.
    pub async fn dispatch_batch(&self, envelopes: Vec<Envelope>, time_now_ms: i64) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for envelope in envelopes {
            outcome.attempted += 1;
            if let Err(err) = self.dispatch(envelope, time_now_ms).await {
                tracing::warn!(error = %err, "envelope dropped from batch");
                outcome.failed += 1;
            }
        }
        outcome
    }
}
