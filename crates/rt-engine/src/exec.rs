//! The Command Executor: runs a named command inside a
//! transaction, applies its direct infrastructure writes, and projects any
//! events it emits.

use std::sync::Arc;

use rt_store_core::{PersistentStore, RetryPolicy, StorageError, StoredEvent, Transaction};
use rt_types::{CommandResult, Envelope, EventId, InfraUpdate};
use serde_json::{json, Value};

use crate::dispatch::Dispatcher;
use crate::error::ExecError;
use crate::registry::{self, Registry};

/// Runs registered commands against the store.
pub struct Executor {
    store: Arc<dyn PersistentStore>,
    registry: Arc<Registry>,
    retry_policy: RetryPolicy,
}

impl Executor {
    /// Build an executor over `store`, routing emitted envelopes through
    /// `registry`'s type map, with the default retry policy.
    pub fn new(store: Arc<dyn PersistentStore>, registry: Arc<Registry>) -> Self {
        Self {
            store,
            registry,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Use a non-default retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Run `handler.command` with `input`, retrying transient storage
    /// conflicts, committing on success.
    pub async fn run_command(
        &self,
        handler: &str,
        command: &str,
        input: Value,
        time_now_ms: i64,
    ) -> Result<CommandResult, ExecError> {
        let implementation = registry::command_for(handler, command)
            .await
            .ok_or_else(|| ExecError::CommandNotFound {
                handler: handler.to_string(),
                command: command.to_string(),
            })?;
        let dispatcher = Dispatcher::new(self.store.clone(), self.registry.clone());

        let mut retry = 0;
        loop {
            let mut tx = self.store.begin_transaction().await?;
            let attempt = self
                .run_once(
                    tx.as_mut(),
                    implementation.as_ref(),
                    input.clone(),
                    &dispatcher,
                    time_now_ms,
                )
                .await;
            match attempt {
                Ok(result) => {
                    tx.commit().await?;
                    return Ok(result);
                }
                Err(ExecError::Storage(StorageError::Conflict)) if retry < self.retry_policy.max_retries => {
                    let _ = tx.rollback().await;
                    tokio::time::sleep(self.retry_policy.delay_for(retry)).await;
                    retry += 1;
                }
                Err(err) => {
                    let _ = tx.rollback().await;
                    return Err(err);
                }
            }
        }
    }

    async fn run_once(
        &self,
        tx: &mut dyn Transaction,
        command: &(dyn crate::handler::Command),
        input: Value,
        dispatcher: &Dispatcher,
        time_now_ms: i64,
    ) -> Result<CommandResult, ExecError> {
        let result = command
            .execute(input, tx)
            .await
            .map_err(|reason| ExecError::Command {
                command: "execute".to_string(),
                reason,
            })?;

        for update in result.direct_updates.clone() {
            apply_direct_update(tx, update, time_now_ms).await?;
        }

        for new_envelope in result.new_envelopes.clone() {
            let mut envelope = Envelope::new(new_envelope.data);
            envelope.metadata.self_generated = Some(true);
            if envelope.metadata.received_by.is_none() {
                if let Some(pubkey) = envelope
                    .data
                    .as_ref()
                    .and_then(|d| d.get("pubkey"))
                    .and_then(Value::as_str)
                {
                    envelope.metadata.received_by = Some(pubkey.to_string());
                }
            }
            envelope.metadata.event_id = Some(EventId(random_event_id()));
            envelope.metadata.timestamp = Some(time_now_ms);
            dispatcher.dispatch_in_tx(tx, envelope, time_now_ms).await?;
        }

        Ok(result)
    }
}

fn random_event_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Apply one direct infrastructure write. `InfraUpdate`'s
/// three variants already are the whitelist, so there is no "else reject"
/// branch here: anything a command can construct is, by the type, legal.
async fn apply_direct_update(
    tx: &mut dyn Transaction,
    update: InfraUpdate,
    time_now_ms: i64,
) -> Result<(), ExecError> {
    match update {
        InfraUpdate::Incoming(item) => {
            rt_store_core::update_nested(tx, rt_store_core::reserved_keys::INCOMING, |current| {
                append(current, item)
            })
            .await?;
        }
        InfraUpdate::Outgoing(item) => {
            rt_store_core::update_nested(tx, rt_store_core::reserved_keys::STATE, |state| {
                append_outgoing(state, item)
            })
            .await?;
        }
        InfraUpdate::EventStore(raw_envelope) => {
            let mut envelope: Envelope = serde_json::from_value(raw_envelope).map_err(|e| {
                ExecError::Command {
                    command: "direct-event-store-write".to_string(),
                    reason: e.to_string(),
                }
            })?;
            envelope.assign_event_id();
            let event_type = envelope.event_type().to_string();
            let event_id = envelope.metadata.event_id.clone().expect("assigned above");
            let metadata =
                serde_json::to_value(&envelope.metadata).unwrap_or_else(|_| json!({}));
            tx.event_store_append(StoredEvent {
                event_id,
                event_type,
                data: envelope.data.unwrap_or(Value::Null),
                metadata,
                created_at_ms: time_now_ms,
            })
            .await?;
        }
    }
    Ok(())
}

fn append(current: Value, item: Value) -> Value {
    match current {
        Value::Array(mut items) => {
            items.push(item);
            Value::Array(items)
        }
        _ => Value::Array(vec![item]),
    }
}

fn append_outgoing(mut state: Value, item: Value) -> Value {
    if !state.is_object() {
        state = json!({});
    }
    let outgoing = state
        .as_object_mut()
        .expect("forced to an object above")
        .entry("outgoing")
        .or_insert_with(|| json!([]));
    if let Some(list) = outgoing.as_array_mut() {
        list.push(item);
    } else {
        *outgoing = json!([item]);
    }
    state
}
