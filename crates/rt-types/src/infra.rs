//! A single command-result struct whose `direct_updates` field is
//! restricted, by construction, to the only infrastructure keys a command
//! may touch (`incoming`, `eventStore`, `state.outgoing`). There is no
//! variant that can express a forbidden write: a disallowed direct state
//! write becomes an unrepresentable-illegal-state property of the type
//! instead of a runtime check against a string whitelist.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A direct infrastructure mutation a command is allowed to request. Every
/// other key under `state` must flow through a projector instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InfraUpdate {
    /// Append a raw blob to the `incoming` queue (used by tests and by
    /// commands that synthesize network traffic for themselves).
    Incoming(Value),
    /// Append an envelope directly to the event store, bypassing the
    /// dispatcher. Rare; most commands project via `new_envelopes` instead.
    EventStore(Value),
    /// Append an outgoing record (`{recipient, data}`) to `state.outgoing`
    /// for the transport to drain.
    Outgoing(Value),
}

/// An event a command wants projected once its transaction commits. The
/// executor fills in `selfGenerated`, `receivedBy` and `eventId` before
/// handing this to the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEnvelope {
    /// The event payload (must eventually carry a `type` field).
    pub data: Value,
}

impl NewEnvelope {
    /// Wrap a bare payload value.
    pub fn new(data: Value) -> Self {
        Self { data }
    }
}

/// The result of running a command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Value handed back to whatever invoked the command (API/CLI/job).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_response: Option<Value>,
    /// Events the command wants the dispatcher to project.
    #[serde(default)]
    pub new_envelopes: Vec<NewEnvelope>,
    /// Direct infrastructure writes, restricted to the allowed keys.
    #[serde(default)]
    pub direct_updates: Vec<InfraUpdate>,
}

impl CommandResult {
    /// A result carrying only an API response, no side effects.
    pub fn with_response(value: Value) -> Self {
        Self {
            api_response: Some(value),
            ..Default::default()
        }
    }
}
