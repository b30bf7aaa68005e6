//! Anonymous public-key encryption ("sealed box"). Real mode uses
//! `crypto_box`'s sealed-box construction; dummy mode uses a plain,
//! reversible string format for tests that don't need real secrecy.

use crypto_box::{PublicKey, SecretKey};

use crate::mode::CryptoMode;

const DUMMY_PREFIX: &str = "dummy_sealed_";
const DUMMY_SEP: &str = "_for_";

/// Encrypt `data` so that only the holder of `recipient_public_key` can
/// decrypt it, without authenticating the sender. Dummy mode:
/// `"dummy_sealed_{data}_for_{recipient_public_key[:8]}"`.
pub fn seal(mode: CryptoMode, data: &[u8], recipient_public_key: &[u8]) -> Vec<u8> {
    match mode {
        CryptoMode::Real => {
            let key_bytes: [u8; 32] = recipient_public_key
                .try_into()
                .expect("sealed-box recipient key must be 32 bytes");
            let public_key = PublicKey::from(key_bytes);
            public_key
                .seal(&mut rand::thread_rng(), data)
                .expect("sealed-box encryption is infallible for well-formed inputs")
        }
        CryptoMode::Dummy => {
            let data_str = String::from_utf8_lossy(data);
            let key_str = String::from_utf8_lossy(recipient_public_key);
            let prefix: String = key_str.chars().take(8).collect();
            format!("{DUMMY_PREFIX}{data_str}{DUMMY_SEP}{prefix}").into_bytes()
        }
    }
}

/// Decrypt a sealed box with `recipient_private_key`. Returns `None` on any
/// failure.
pub fn unseal(mode: CryptoMode, sealed: &[u8], recipient_private_key: &[u8]) -> Option<Vec<u8>> {
    match mode {
        CryptoMode::Real => {
            let key_bytes: [u8; 32] = recipient_private_key.try_into().ok()?;
            let secret_key = SecretKey::from(key_bytes);
            secret_key.unseal(sealed).ok()
        }
        CryptoMode::Dummy => {
            let s = std::str::from_utf8(sealed).ok()?;
            let rest = s.strip_prefix(DUMMY_PREFIX)?;
            let (data, _recipient_prefix) = rest.rsplit_once(DUMMY_SEP)?;
            Some(data.as_bytes().to_vec())
        }
    }
}
