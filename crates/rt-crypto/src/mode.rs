//! The two crypto modes every primitive in this crate is parameterized by.

/// Selects between real cryptography and the deterministic stand-ins used
/// for reproducible tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CryptoMode {
    /// Ed25519 / authenticated symmetric encryption / BLAKE2b / SealedBox /
    /// Argon2id.
    Real,
    /// Deterministic string-prefixed stand-ins. No key material is ever
    /// actually used; any string can act as a "key".
    #[default]
    Dummy,
}

impl CryptoMode {
    /// Read the mode from the `CRYPTO_MODE` environment variable. Any value
    /// other than `"real"` (case-insensitive) is treated as `Dummy`.
    pub fn from_env() -> Self {
        match std::env::var("CRYPTO_MODE") {
            Ok(v) if v.eq_ignore_ascii_case("real") => CryptoMode::Real,
            _ => CryptoMode::Dummy,
        }
    }
}
