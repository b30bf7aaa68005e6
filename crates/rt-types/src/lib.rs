//! Envelope, event-id, and canonical-JSON primitives shared by every other
//! crate in the runtime. Dependency-light by design: no crypto, no storage,
//! no async runtime. Sits at the bottom of the crate graph.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod canonical;
pub mod envelope;
pub mod infra;

pub use canonical::{canonical_hash, to_canonical_json};
pub use envelope::{Envelope, EnvelopeMetadata, EventId};
pub use infra::{CommandResult, InfraUpdate, NewEnvelope};

use thiserror::Error;

/// Shared error vocabulary. Individual crates define their own richer error
/// enums (see `rt-store-core::StorageError`, `rt-crypto::CryptoError`,
/// `rt-engine`'s per-component errors); this type covers failures that can
/// originate from envelope/canonicalization logic alone.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    /// `data` is missing the required `type` field and the envelope carries
    /// no `metadata.error` either.
    #[error("envelope has neither data.type nor metadata.error")]
    MissingEventType,
    /// A value could not be serialized to canonical JSON (non-finite float,
    /// non-string object key, etc).
    #[error("value is not canonicalizable: {0}")]
    NotCanonicalizable(String),
}
