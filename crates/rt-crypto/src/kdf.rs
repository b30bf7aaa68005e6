//! Password-based key derivation. Real mode: Argon2id. Dummy
//! mode: BLAKE2b over `password || salt`, matching the Python original.

use argon2::Argon2;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use rand::RngCore;

use crate::error::CryptoError;
use crate::mode::CryptoMode;

const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Output of [`kdf`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfOutput {
    /// The derived key bytes.
    pub derived_key: Vec<u8>,
    /// The salt used (generated if the caller did not supply one).
    pub salt: Vec<u8>,
    /// Name of the algorithm used (`"argon2id"` or `"dummy_kdf"`).
    pub algorithm: String,
}

/// Derive a key from `password`, using `salt` if given or generating a fresh
/// random one otherwise.
pub fn kdf(mode: CryptoMode, password: &[u8], salt: Option<&[u8]>) -> Result<KdfOutput, CryptoError> {
    let salt = match salt {
        Some(s) => s.to_vec(),
        None => {
            let mut buf = vec![0u8; SALT_LEN];
            rand::thread_rng().fill_bytes(&mut buf);
            buf
        }
    };

    match mode {
        CryptoMode::Real => {
            let mut derived_key = vec![0u8; KEY_LEN];
            Argon2::default()
                .hash_password_into(password, &salt, &mut derived_key)
                .map_err(|e| CryptoError::KdfFailed(e.to_string()))?;
            Ok(KdfOutput {
                derived_key,
                salt,
                algorithm: "argon2id".to_string(),
            })
        }
        CryptoMode::Dummy => {
            let mut hasher = Blake2b::<U32>::new();
            hasher.update(password);
            hasher.update(&salt);
            Ok(KdfOutput {
                derived_key: hasher.finalize().to_vec(),
                salt,
                algorithm: "dummy_kdf".to_string(),
            })
        }
    }
}
