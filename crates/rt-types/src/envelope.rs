//! The envelope model and event-id derivation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::canonical::canonical_hash;

/// A stable identifier for an accepted envelope. Event IDs uniquely key the
/// append-only event store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    /// Derive the event ID for `data` given an optional explicit
    /// `metadata.eventId` and an optional explicit `data.id`. Priority
    /// order: explicit `metadata.eventId`, then `data.id`, then the
    /// canonical BLAKE2b hash of `data` with keys sorted.
    pub fn derive(metadata_event_id: Option<&str>, data: &Value) -> Self {
        if let Some(id) = metadata_event_id {
            return Self(id.to_string());
        }
        if let Some(id) = data.get("id").and_then(Value::as_str) {
            return Self(id.to_string());
        }
        Self(canonical_hash(data))
    }

    /// Borrow the inner string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Recognized envelope metadata fields, plus a small extensions
/// map for protocol-specific annotations the runtime itself never inspects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    /// Stable hash or explicit identifier naming this envelope in the event
    /// store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,
    /// Milliseconds since epoch when the event was assigned an ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Free-form string naming where the blob came from (peer id, "local").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Milliseconds since epoch when the runtime received the raw blob.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<i64>,
    /// True when this envelope was produced by a local command rather than
    /// received over the wire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_generated: Option<bool>,
    /// Which local identity received this envelope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_by: Option<String>,
    /// Set when decryption only partially succeeded; routes the envelope to
    /// the `missing_key` handler.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Key hash that was missing, set alongside `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_hash: Option<String>,
    /// True if the missing key was the *inner* layer key (meaning the outer
    /// layer at least decrypted, so the sender is known to be "in network").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_network: Option<bool>,
    /// Hash of the outer-layer key used during decryption.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outer_key_hash: Option<String>,
    /// Hash of the inner-layer key used during decryption.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inner_key_hash: Option<String>,
    /// Signature over the canonical `data` subobject, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Public identity of the sender, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Protocol-specific annotations the runtime does not interpret.
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

impl EnvelopeMetadata {
    /// True when this metadata carries a decrypt error (routes to the
    /// `missing_key` handler).
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

/// The unit flowing through the runtime after decryption.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The event payload. `None` for partial envelopes produced by a failed
    /// key lookup during decryption.
    pub data: Option<Value>,
    /// Envelope metadata (see [`EnvelopeMetadata`]).
    pub metadata: EnvelopeMetadata,
}

impl Envelope {
    /// Construct a well-formed envelope carrying `data` and no metadata
    /// beyond what the caller fills in afterward.
    pub fn new(data: Value) -> Self {
        Self {
            data: Some(data),
            metadata: EnvelopeMetadata::default(),
        }
    }

    /// The event-type string used to route this envelope: `missing_key` if `metadata.error` is set, else `data.type`, else
    /// `unknown`.
    pub fn event_type(&self) -> &str {
        if self.metadata.has_error() {
            return "missing_key";
        }
        self.data
            .as_ref()
            .and_then(|d| d.get("type"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
    }

    /// Derive and fill in this envelope's `metadata.event_id` from its
    /// current `data`, following [`EventId::derive`]'s priority order.
    pub fn assign_event_id(&mut self) {
        let explicit = self.metadata.event_id.clone();
        let data = self.data.clone().unwrap_or(Value::Null);
        self.metadata.event_id = Some(EventId::derive(
            explicit.as_ref().map(|id| id.as_str()),
            &data,
        ));
    }
}
