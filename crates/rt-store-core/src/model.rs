//! Shapes stored by the event store and the recheck queue.

use rt_types::EventId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row of the append-only event store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// The event's stable identifier.
    pub event_id: EventId,
    /// The event-type string it was filed under.
    pub event_type: String,
    /// The envelope's `data`.
    pub data: Value,
    /// The envelope's `metadata`, serialized as a JSON object.
    pub metadata: Value,
    /// Milliseconds since epoch when this row was inserted.
    pub created_at_ms: i64,
}

/// A marker in `recheck_queue`: the identified event should be
/// re-projected because a dependency may now exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecheckMarker {
    /// The event awaiting re-projection.
    pub event_id: EventId,
    /// Free-form tag describing why the event was deferred.
    pub reason_type: String,
    /// Earliest time (ms since epoch) at which this marker may be drained.
    pub available_at_ms: i64,
}
