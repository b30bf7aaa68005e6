//! Authenticated symmetric encrypt/decrypt with 24-byte nonces.
//! Real mode uses XChaCha20-Poly1305; dummy mode prepends a recognizable
//! prefix and performs no actual transformation, matching the Python
//! original's `encrypt()`/`decrypt()`.

use chacha20poly1305::aead::{Aead, KeyInit, OsRng};
use chacha20poly1305::{AeadCore, XChaCha20Poly1305, XNonce};

use crate::error::CryptoError;
use crate::mode::CryptoMode;

const DUMMY_PREFIX: &[u8] = b"dummy_encrypted_";
const DUMMY_NONCE: &[u8] = b"dummy_nonce";

/// Output of [`encrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptOutput {
    /// The ciphertext bytes.
    pub ciphertext: Vec<u8>,
    /// The nonce used (24 bytes in real mode; a fixed placeholder in dummy
    /// mode).
    pub nonce: Vec<u8>,
    /// Name of the algorithm used (`"xchacha20poly1305"` or `"dummy"`).
    pub algorithm: String,
}

/// Encrypt `data` under `key`. Real mode: XChaCha20-Poly1305 with a fresh
/// random 24-byte nonce. Dummy mode: ciphertext is `data` with
/// `"dummy_encrypted_"` prepended; nonce is the fixed string
/// `"dummy_nonce"`.
pub fn encrypt(mode: CryptoMode, data: &[u8], key: &[u8]) -> Result<EncryptOutput, CryptoError> {
    match mode {
        CryptoMode::Real => {
            let key_bytes: [u8; 32] = key
                .try_into()
                .map_err(|_| CryptoError::InvalidKey("expected 32-byte symmetric key".into()))?;
            let cipher = XChaCha20Poly1305::new(&key_bytes.into());
            let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
            let ciphertext = cipher
                .encrypt(&nonce, data)
                .map_err(|e| CryptoError::EncryptFailed(e.to_string()))?;
            Ok(EncryptOutput {
                ciphertext,
                nonce: nonce.to_vec(),
                algorithm: "xchacha20poly1305".to_string(),
            })
        }
        CryptoMode::Dummy => {
            let mut ciphertext = DUMMY_PREFIX.to_vec();
            ciphertext.extend_from_slice(data);
            Ok(EncryptOutput {
                ciphertext,
                nonce: DUMMY_NONCE.to_vec(),
                algorithm: "dummy".to_string(),
            })
        }
    }
}

/// Decrypt `ciphertext` under `key`/`nonce`. Returns `None` on any failure
/// (wrong key, tampered ciphertext, malformed dummy prefix) rather than an
/// error, since a failed decrypt is an expected, routine outcome here.
pub fn decrypt(mode: CryptoMode, ciphertext: &[u8], nonce: &[u8], key: &[u8]) -> Option<Vec<u8>> {
    match mode {
        CryptoMode::Real => {
            let key_bytes: [u8; 32] = key.try_into().ok()?;
            let cipher = XChaCha20Poly1305::new(&key_bytes.into());
            let nonce = XNonce::from_slice(nonce);
            cipher.decrypt(nonce, ciphertext).ok()
        }
        CryptoMode::Dummy => ciphertext
            .strip_prefix(DUMMY_PREFIX)
            .map(|rest| rest.to_vec()),
    }
}
