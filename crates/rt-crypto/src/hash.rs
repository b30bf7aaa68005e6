//! BLAKE2b-256 hashing. Not mode-dependent: both real and dummy crypto use
//! the same hash, since hashing has no
//! secret key material to stand in for.

use crate::error::CryptoError;

/// Hash `data` with the named algorithm, hex-encoded. Only `"blake2b"` is
/// supported; anything else fails with `UnsupportedAlgorithm`.
pub fn hash_named(data: &[u8], algorithm: &str) -> Result<String, CryptoError> {
    if !algorithm.eq_ignore_ascii_case("blake2b") {
        return Err(CryptoError::UnsupportedAlgorithm(algorithm.to_string()));
    }
    Ok(hash(data))
}

/// BLAKE2b-256 digest of `data`, hex-encoded. Delegates to
/// [`rt_types::canonical::hash_bytes`] so the event-id derivation path and
/// this crate's real-mode hashing stay byte-for-byte identical.
pub fn hash(data: &[u8]) -> String {
    rt_types::canonical::hash_bytes(data)
}
