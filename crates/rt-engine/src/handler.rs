//! The Handler Contract Surface: the two interfaces a handler
//! implements. Neither type appears in the manifest itself — a manifest only
//! *names* a projector/command; something must separately register the code
//! behind that name (see [`crate::registry::register_projector`] and
//! [`crate::registry::register_command`]).

use async_trait::async_trait;
use rt_store_core::Transaction;
use rt_types::{CommandResult, Envelope};
use serde_json::Value;

/// A deterministic fold from `(store snapshot, envelope, time_now_ms)` to a
/// state mutation. Idempotent for the same envelope; MUST NOT perform I/O
/// beyond the transaction; MUST NOT fail for expected conditions (missing
/// dependency — use the recheck queue instead). An `Err` here rolls back the
/// enclosing transaction.
#[async_trait]
pub trait Projector: Send + Sync {
    /// Apply `envelope`'s effects to `tx`.
    async fn project(
        &self,
        tx: &mut dyn Transaction,
        envelope: &Envelope,
        time_now_ms: i64,
    ) -> Result<(), String>;
}

/// A named, invocable unit of external intent. Unlike a
/// projector, a command may emit new envelopes and request a bounded set of
/// direct infrastructure writes.
#[async_trait]
pub trait Command: Send + Sync {
    /// Run this command against `input` inside `tx`.
    async fn execute(&self, input: Value, tx: &mut dyn Transaction) -> Result<CommandResult, String>;
}
