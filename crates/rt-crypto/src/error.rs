//! Error taxonomy for crypto primitives.

use thiserror::Error;

/// Failures a crypto primitive can report. `verify`/`decrypt`/`unseal`
/// return `bool`/`Option` rather than this type for expected failure; this
/// type covers malformed inputs (wrong key length, unsupported algorithm
/// name) instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// A key was the wrong length or otherwise malformed for the requested
    /// operation.
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    /// `hash()` was asked for an algorithm other than BLAKE2b.
    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// Signing failed (real mode only; dummy mode never fails to sign).
    #[error("signing failed: {0}")]
    SignFailed(String),
    /// Encryption failed (real mode only).
    #[error("encryption failed: {0}")]
    EncryptFailed(String),
    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    KdfFailed(String),
}
