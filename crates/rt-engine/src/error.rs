//! Error taxonomy for the engine crate. Each enum covers the
//! `kind`s that originate in its component; `RuntimeError` in `rt-runtime`
//! aggregates all of them behind one `#[from]`-driven conversion.

use rt_store_core::StorageError;

/// Failures loading or building the handler registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Two handlers declared the same event type.
    #[error("handler conflict: '{event_type}' claimed by both '{first}' and '{second}'")]
    HandlerConflict {
        /// The event type both handlers declared.
        event_type: String,
        /// The handler that claimed it first.
        first: String,
        /// The handler that claimed it second.
        second: String,
    },
    /// A manifest file existed but could not be parsed.
    #[error("malformed manifest for handler '{handler}': {reason}")]
    MalformedManifest {
        /// The handler whose manifest failed to parse.
        handler: String,
        /// Why parsing failed.
        reason: String,
    },
    /// The handler base path could not be read.
    #[error("cannot read handler directory '{path}': {reason}")]
    BasePathUnreadable {
        /// The path that could not be read.
        path: String,
        /// The underlying I/O error text.
        reason: String,
    },
}

/// Failures routing an envelope to its projector.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No handler claims this event type and neither `unknown` nor
    /// `missing_key` is declared.
    #[error("no handler for event type '{0}'")]
    HandlerNotFound(String),
    /// The projector raised on this specific envelope.
    #[error("projector for '{handler}' failed: {reason}")]
    Projector {
        /// The handler whose projector failed.
        handler: String,
        /// The failure reason.
        reason: String,
    },
    /// A storage operation inside the dispatch transaction failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Failures executing a named command.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// No such `(handler, command)` pair is registered.
    #[error("no command '{command}' registered for handler '{handler}'")]
    CommandNotFound {
        /// The handler name looked up.
        handler: String,
        /// The command name looked up.
        command: String,
    },
    /// The command tried to write an infrastructure key outside the
    /// allowed whitelist.
    #[error("command wrote a forbidden key: {0}")]
    DomainStateViolation(String),
    /// The command's own logic failed.
    #[error("command '{command}' failed: {reason}")]
    Command {
        /// The command that failed.
        command: String,
        /// The failure reason.
        reason: String,
    },
    /// Projecting one of the command's emitted envelopes failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// A storage operation inside the command transaction failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Failures running the tick scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A storage operation at the top of the tick failed; this is fatal to
    /// the whole tick. Individual job failures are not fatal — they are
    /// recorded in the returned report instead.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Failures draining and decoding the `incoming` queue. Per-blob decode
/// failures are never represented here — they are logged and the blob is
/// dropped.
#[derive(Debug, thiserror::Error)]
pub enum DecryptError {
    /// A storage operation around the drain failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
