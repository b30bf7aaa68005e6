//! Keypair generation. Real mode produces actual Ed25519 key bytes; dummy
//! mode produces the same recognizable strings as the Python original's
//! `get_keypair()` (`core/crypto.py`), so that fixtures built in either
//! language agree.

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;

use crate::mode::CryptoMode;

/// A public/secret key pair. In dummy mode the "bytes" are just the UTF-8
/// encoding of a recognizable placeholder string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    /// Public key bytes.
    pub public: Vec<u8>,
    /// Secret key bytes.
    pub secret: Vec<u8>,
}

/// Generate a keypair for `identity`. In real mode `identity` is ignored and
/// a fresh random Ed25519 keypair is generated; in dummy mode the keys are
/// `"dummy_pubkey_{identity}"` / `"dummy_privkey_{identity}"`.
pub fn generate_keypair(mode: CryptoMode, identity: &str) -> KeyPair {
    match mode {
        CryptoMode::Real => {
            let signing_key = SigningKey::generate(&mut OsRng);
            KeyPair {
                public: signing_key.verifying_key().to_bytes().to_vec(),
                secret: signing_key.to_bytes().to_vec(),
            }
        }
        CryptoMode::Dummy => KeyPair {
            public: format!("dummy_pubkey_{identity}").into_bytes(),
            secret: format!("dummy_privkey_{identity}").into_bytes(),
        },
    }
}
