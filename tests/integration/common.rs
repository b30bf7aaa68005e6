//! Shared fixtures: a tiny three-handler protocol (message, group, add) used
//! to drive the runtime through realistic command/projection/recheck paths
//! without depending on any concrete production protocol.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rt_engine::{registry::HandlerManifest, Command, Projector, Registry};
use rt_store_core::{PersistentStore, Transaction};
use rt_store_memory::MemoryStore;
use rt_types::{CommandResult, NewEnvelope};
use serde_json::{json, Value};

/// `message.create` appends a `message` event and its projector files the
/// message under `state.messages`.
pub struct CreateMessage;

#[async_trait]
impl Command for CreateMessage {
    async fn execute(&self, input: Value, _tx: &mut dyn Transaction) -> Result<CommandResult, String> {
        let text = input
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing text".to_string())?;
        let message_id = format!("msg-{}", text.len());
        Ok(CommandResult {
            api_response: Some(json!({ "messageId": message_id })),
            new_envelopes: vec![NewEnvelope::new(
                json!({"type": "message", "text": text, "sender": "alice"}),
            )],
            direct_updates: vec![],
        })
    }
}

pub struct MessageProjector;

#[async_trait]
impl Projector for MessageProjector {
    async fn project(
        &self,
        tx: &mut dyn Transaction,
        envelope: &rt_types::Envelope,
        _time_now_ms: i64,
    ) -> Result<(), String> {
        let data = envelope.data.as_ref().ok_or("no data")?;
        let mut state = tx.get("state").await.map_err(|e| e.to_string())?.unwrap_or(json!({}));
        let mut messages = state["messages"].as_array().cloned().unwrap_or_default();
        messages.push(data.clone());
        state["messages"] = json!(messages);
        tx.set("state", state).await.map_err(|e| e.to_string())
    }
}

/// `group` projector files a group's existence so that membership adds can
/// find it.
pub struct GroupProjector;

#[async_trait]
impl Projector for GroupProjector {
    async fn project(
        &self,
        tx: &mut dyn Transaction,
        envelope: &rt_types::Envelope,
        _time_now_ms: i64,
    ) -> Result<(), String> {
        let id = envelope.data.as_ref().unwrap()["id"].as_str().unwrap().to_string();
        let mut state = tx.get("state").await.map_err(|e| e.to_string())?.unwrap_or(json!({}));
        let mut groups = state["groups"].as_array().cloned().unwrap_or_default();
        if !groups.iter().any(|g| g == &json!(id)) {
            groups.push(json!(id));
            state["groups"] = json!(groups);
            tx.set("state", state).await.map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

/// `user` projector files a user's existence, mirroring [`GroupProjector`].
pub struct UserProjector;

#[async_trait]
impl Projector for UserProjector {
    async fn project(
        &self,
        tx: &mut dyn Transaction,
        envelope: &rt_types::Envelope,
        _time_now_ms: i64,
    ) -> Result<(), String> {
        let id = envelope.data.as_ref().unwrap()["id"].as_str().unwrap().to_string();
        let mut state = tx.get("state").await.map_err(|e| e.to_string())?.unwrap_or(json!({}));
        let mut users = state["users"].as_array().cloned().unwrap_or_default();
        if !users.iter().any(|u| u == &json!(id)) {
            users.push(json!(id));
            state["users"] = json!(users);
            tx.set("state", state).await.map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

/// `add` projector requires both the named group and user to already be
/// filed; otherwise it defers via the recheck queue.
pub struct AddProjector;

#[async_trait]
impl Projector for AddProjector {
    async fn project(
        &self,
        tx: &mut dyn Transaction,
        envelope: &rt_types::Envelope,
        _time_now_ms: i64,
    ) -> Result<(), String> {
        let data = envelope.data.as_ref().unwrap();
        let group = data["group"].as_str().unwrap();
        let user = data["user"].as_str().unwrap();
        let state = tx.get("state").await.map_err(|e| e.to_string())?.unwrap_or(json!({}));
        let groups = state["groups"].as_array().cloned().unwrap_or_default();
        let users = state["users"].as_array().cloned().unwrap_or_default();
        if !groups.iter().any(|g| g == &json!(group)) || !users.iter().any(|u| u == &json!(user)) {
            let event_id = envelope
                .metadata
                .event_id
                .clone()
                .expect("event already has an id by the time a projector runs");
            tx.recheck_insert(rt_store_core::RecheckMarker {
                event_id,
                reason_type: "missing_dep".into(),
                available_at_ms: 0,
            })
            .await
            .map_err(|e| e.to_string())?;
            return Ok(());
        }
        let mut state = state;
        let mut adds = state["adds"].as_array().cloned().unwrap_or_default();
        let entry = json!({"group": group, "user": user});
        if !adds.iter().any(|a| a == &entry) {
            adds.push(entry);
            state["adds"] = json!(adds);
            tx.set("state", state).await.map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

/// Catch-all projector for event types no other handler declares; files the
/// envelope under `state.unknown_events`.
pub struct UnknownProjector;

#[async_trait]
impl Projector for UnknownProjector {
    async fn project(
        &self,
        tx: &mut dyn Transaction,
        envelope: &rt_types::Envelope,
        _time_now_ms: i64,
    ) -> Result<(), String> {
        let data = envelope.data.as_ref().ok_or("no data")?;
        let mut state = tx.get("state").await.map_err(|e| e.to_string())?.unwrap_or(json!({}));
        let mut unknown = state["unknown_events"].as_array().cloned().unwrap_or_default();
        unknown.push(data.clone());
        state["unknown_events"] = json!(unknown);
        tx.set("state", state).await.map_err(|e| e.to_string())
    }
}

/// `missing_key` projector files a partially-decrypted envelope under
/// `state.pending_missing_key` instead of dropping it, so a later key
/// delivery can replay it.
pub struct MissingKeyProjector;

#[async_trait]
impl Projector for MissingKeyProjector {
    async fn project(
        &self,
        tx: &mut dyn Transaction,
        envelope: &rt_types::Envelope,
        _time_now_ms: i64,
    ) -> Result<(), String> {
        let mut state = tx.get("state").await.map_err(|e| e.to_string())?.unwrap_or(json!({}));
        let mut pending = state["pending_missing_key"].as_array().cloned().unwrap_or_default();
        pending.push(json!({
            "envelope": envelope,
            "missingHash": envelope.metadata.missing_hash,
            "inNetwork": envelope.metadata.in_network.unwrap_or(false),
            "timestamp": envelope.metadata.received_at.unwrap_or(_time_now_ms),
        }));
        state["pending_missing_key"] = json!(pending);
        tx.set("state", state).await.map_err(|e| e.to_string())
    }
}

/// A job handler whose command always fails, used to exercise per-job tick
/// isolation.
pub struct FailingJob;

#[async_trait]
impl Command for FailingJob {
    async fn execute(&self, _input: Value, _tx: &mut dyn Transaction) -> Result<CommandResult, String> {
        Err("job A always fails".to_string())
    }
}

/// A job handler that records how many times it ran and always succeeds.
pub struct CountingJob {
    pub runs: Arc<AtomicUsize>,
}

#[async_trait]
impl Command for CountingJob {
    async fn execute(&self, _input: Value, tx: &mut dyn Transaction) -> Result<CommandResult, String> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let mut state = tx.get("state").await.map_err(|e| e.to_string())?.unwrap_or(json!({}));
        state["job_b_ran"] = json!(true);
        tx.set("state", state).await.map_err(|e| e.to_string())?;
        Ok(CommandResult::default())
    }
}

/// Build the registry + bind every handler above at runtime. Tests share no
/// state between them because `register_*` overwrites by `(handler,
/// command)` key and each test builds its own [`MemoryStore`].
pub async fn messaging_registry() -> Arc<Registry> {
    let manifests = vec![
        HandlerManifest {
            name: "message".into(),
            types: vec!["message".into()],
            commands: [("create".to_string(), None)].into_iter().collect(),
            job: None,
            projector: Some("message".into()),
        },
        HandlerManifest {
            name: "group".into(),
            types: vec!["group".into()],
            commands: Default::default(),
            job: None,
            projector: Some("group".into()),
        },
        HandlerManifest {
            name: "user".into(),
            types: vec!["user".into()],
            commands: Default::default(),
            job: None,
            projector: Some("user".into()),
        },
        HandlerManifest {
            name: "add".into(),
            types: vec!["add".into()],
            commands: Default::default(),
            job: None,
            projector: Some("add".into()),
        },
        HandlerManifest {
            name: "unknown_catcher".into(),
            types: vec!["unknown".into()],
            commands: Default::default(),
            job: None,
            projector: Some("unknown_catcher".into()),
        },
        HandlerManifest {
            name: "missing_key".into(),
            types: vec!["missing_key".into()],
            commands: Default::default(),
            job: None,
            projector: Some("missing_key".into()),
        },
    ];

    rt_engine::registry::register_command("message", "create", Arc::new(CreateMessage)).await;
    rt_engine::registry::register_projector("message", Arc::new(MessageProjector)).await;
    rt_engine::registry::register_projector("group", Arc::new(GroupProjector)).await;
    rt_engine::registry::register_projector("user", Arc::new(UserProjector)).await;
    rt_engine::registry::register_projector("add", Arc::new(AddProjector)).await;
    rt_engine::registry::register_projector("unknown_catcher", Arc::new(UnknownProjector)).await;
    rt_engine::registry::register_projector("missing_key", Arc::new(MissingKeyProjector)).await;

    Arc::new(Registry::from_manifests(manifests).expect("no handler declares overlapping types"))
}

/// Build a registry with two jobs: `job_a` always fails, `job_b` always
/// succeeds and increments `runs`.
pub async fn jobs_registry(runs: Arc<AtomicUsize>) -> Arc<Registry> {
    let manifests = vec![
        HandlerManifest {
            name: "job_a".into(),
            types: vec![],
            commands: [("tick".to_string(), None)].into_iter().collect(),
            job: Some("tick".into()),
            projector: None,
        },
        HandlerManifest {
            name: "job_b".into(),
            types: vec![],
            commands: [("tick".to_string(), None)].into_iter().collect(),
            job: Some("tick".into()),
            projector: None,
        },
    ];
    rt_engine::registry::register_command("job_a", "tick", Arc::new(FailingJob)).await;
    rt_engine::registry::register_command("job_b", "tick", Arc::new(CountingJob { runs })).await;
    Arc::new(Registry::from_manifests(manifests).unwrap())
}

pub fn fresh_store() -> Arc<dyn PersistentStore> {
    Arc::new(MemoryStore::new())
}

/// Serializes access to the process-global registration tables across test
/// binaries run in the same process, since `rt_engine::registry` keeps its
/// bindings in a `once_cell` static shared by every test in this crate.
pub static REGISTRATION_LOCK: Mutex<()> = Mutex::new(());
