//! **rt-crypto** – sign/verify, authenticated encrypt/decrypt, hash,
//! seal/unseal and KDF, each available in a `Real` mode backed by real
//! cryptography and a `Dummy` mode that produces deterministic,
//! structurally recognizable output for byte-exact tests.
//!
//! Every function takes a [`CryptoMode`] explicitly rather than reading a
//! global — see the runtime-config design note for why.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod hash;
mod kdf;
mod keys;
mod mode;
mod seal;
mod sign;
mod symmetric;

pub use error::CryptoError;
pub use hash::{hash, hash_named};
pub use kdf::{kdf, KdfOutput};
pub use keys::{generate_keypair, KeyPair};
pub use mode::CryptoMode;
pub use seal::{seal, unseal};
pub use sign::{sign, verify};
pub use symmetric::{decrypt, encrypt, EncryptOutput};
