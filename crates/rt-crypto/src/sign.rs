//! Sign/verify.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::error::CryptoError;
use crate::hash::hash;
use crate::mode::CryptoMode;

const DUMMY_SIG_PREFIX: &str = "dummy_sig_";

/// Sign `data` with `private_key`. Real mode: Ed25519 signature, hex-encoded.
/// Dummy mode: `"dummy_sig_" + first16(blake2b(data))` —
/// `private_key` is not consulted, since dummy signatures carry no secret.
pub fn sign(mode: CryptoMode, data: &[u8], private_key: &[u8]) -> Result<String, CryptoError> {
    match mode {
        CryptoMode::Real => {
            let key_bytes: [u8; 32] = private_key
                .try_into()
                .map_err(|_| CryptoError::InvalidKey("expected 32-byte Ed25519 seed".into()))?;
            let signing_key = SigningKey::from_bytes(&key_bytes);
            let signature: Signature = signing_key.sign(data);
            Ok(hex::encode(signature.to_bytes()))
        }
        CryptoMode::Dummy => {
            let digest = hash(data);
            Ok(format!("{DUMMY_SIG_PREFIX}{}", &digest[..16]))
        }
    }
}

/// Verify `signature` over `data` against `public_key`. Real mode performs
/// an actual Ed25519 verification. Dummy mode accepts any signature string
/// that carries the dummy prefix, matching the Python original's
/// `verify()`.
pub fn verify(mode: CryptoMode, data: &[u8], signature: &str, public_key: &[u8]) -> bool {
    match mode {
        CryptoMode::Real => {
            let Ok(key_bytes): Result<[u8; 32], _> = public_key.try_into() else {
                return false;
            };
            let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
                return false;
            };
            let Ok(sig_bytes) = hex::decode(signature) else {
                return false;
            };
            let Ok(sig_array): Result<[u8; 64], _> = sig_bytes.as_slice().try_into() else {
                return false;
            };
            verifying_key
                .verify(data, &Signature::from_bytes(&sig_array))
                .is_ok()
        }
        CryptoMode::Dummy => signature.starts_with(DUMMY_SIG_PREFIX),
    }
}
