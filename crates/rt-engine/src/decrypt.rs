//! The Incoming Decryptor: drains `incoming`, attempts two-layer
//! greedy decryption keyed by `state.key_map`, and hands each result to the
//! [`Dispatcher`]. Grounded on the two-layer walk in the original greedy
//! decrypt job: try the outer key hash, decrypt one layer, recurse into the
//! result looking for an inner key hash, decrypt again.

use std::collections::HashMap;
use std::sync::Arc;

use rt_store_core::{reserved_keys, PersistentStore};
use rt_types::{Envelope, EnvelopeMetadata};
use serde_json::{json, Value};

use crate::dispatch::Dispatcher;
use crate::error::DecryptError;
use crate::registry::Registry;

const HASH_HEX_LEN: usize = 64;
const NONCE_HEX_LEN: usize = 48;

/// Drains `incoming` once per call, forwarding every decodable result to the
/// dispatcher.
pub struct IncomingDecryptor {
    store: Arc<dyn PersistentStore>,
    dispatcher: Dispatcher,
    crypto_mode: rt_crypto::CryptoMode,
}

impl IncomingDecryptor {
    /// Build a decryptor over `store`, routing decoded envelopes through
    /// `registry`, interpreting the wire format under `crypto_mode`.
    pub fn new(
        store: Arc<dyn PersistentStore>,
        registry: Arc<Registry>,
        crypto_mode: rt_crypto::CryptoMode,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(store.clone(), registry),
            store,
            crypto_mode,
        }
    }

    /// Drain every blob currently in `incoming`, decode what can be decoded,
    /// and dispatch each result. `incoming` is empty when this returns.
    pub async fn drain(&self, time_now_ms: i64) -> Result<usize, DecryptError> {
        let mut tx = self.store.begin_transaction().await?;
        let incoming = tx
            .get(reserved_keys::INCOMING)
            .await?
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default();
        let key_map = tx
            .get(reserved_keys::STATE)
            .await?
            .and_then(|state| extract_key_map(&state))
            .unwrap_or_default();
        tx.set(reserved_keys::INCOMING, json!([])).await?;
        tx.commit().await?;

        let mut processed = 0usize;
        for blob in incoming {
            processed += 1;
            if let Some(envelope) = decode_blob(blob, &key_map, self.crypto_mode) {
                if let Err(err) = self.dispatcher.dispatch(envelope, time_now_ms).await {
                    tracing::warn!(error = %err, "decoded envelope failed to dispatch");
                }
            }
        }
        Ok(processed)
    }
}

fn extract_key_map(state: &Value) -> Option<HashMap<String, Vec<u8>>> {
    let object = state.get("key_map")?.as_object()?;
    Some(
        object
            .iter()
            .filter_map(|(hash, key)| {
                let key_bytes = hex::decode(key.as_str()?).ok()?;
                Some((hash.clone(), key_bytes))
            })
            .collect(),
    )
}

/// Step 1-7 of the per-blob algorithm. Returns `None` for a silent drop
/// (malformed blob, failed decrypt at either layer); returns `Some` for
/// every other outcome, including partial `missing_key` envelopes.
fn decode_blob(
    blob: Value,
    key_map: &HashMap<String, Vec<u8>>,
    crypto_mode: rt_crypto::CryptoMode,
) -> Option<Envelope> {
    // Step 1: a preformed envelope (local fast path) passes through as-is.
    if blob.get("metadata").map(Value::is_object).unwrap_or(false) {
        return serde_json::from_value(blob).ok();
    }

    let origin = blob.get("origin").and_then(Value::as_str).map(String::from);
    let received_at = blob.get("received_at").and_then(Value::as_i64);
    let hex_data = blob.get("data").and_then(Value::as_str)?;
    let raw = hex::decode(hex_data).ok()?;
    if raw.len() * 2 < HASH_HEX_LEN {
        tracing::info!("dropping incoming blob: shorter than a key hash");
        return None;
    }

    let (hash_bytes, rest) = raw.split_at(HASH_HEX_LEN / 2);
    let outer_hash = hex::encode(hash_bytes);

    let Some(outer_key) = key_map.get(&outer_hash) else {
        return Some(missing_key_envelope(None, &outer_hash, false, origin, received_at));
    };

    let (outer_nonce, outer_ciphertext): (&[u8], &[u8]) = match crypto_mode {
        rt_crypto::CryptoMode::Real => {
            if rest.len() * 2 < NONCE_HEX_LEN {
                tracing::info!("dropping incoming blob: shorter than outer nonce");
                return None;
            }
            rest.split_at(NONCE_HEX_LEN / 2)
        }
        rt_crypto::CryptoMode::Dummy => (&[], rest),
    };

    let outer_plain = match rt_crypto::decrypt(crypto_mode, outer_ciphertext, outer_nonce, outer_key) {
        Some(bytes) => bytes,
        None => {
            tracing::warn!("dropping incoming blob: outer layer failed to decrypt");
            return None;
        }
    };
    let outer_json: Value = match serde_json::from_slice(&outer_plain) {
        Ok(v) => v,
        Err(_) => {
            tracing::warn!("dropping incoming blob: outer layer not valid JSON");
            return None;
        }
    };

    let inner_hash = outer_json
        .get("innerHash")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| outer_hash.clone());

    let Some(inner_key) = key_map.get(&inner_hash) else {
        return Some(missing_key_envelope(
            Some(outer_json),
            &inner_hash,
            true,
            origin,
            received_at,
        ));
    };

    let inner_ciphertext_hex = outer_json.get("data").and_then(Value::as_str)?;
    let inner_ciphertext = hex::decode(inner_ciphertext_hex).ok()?;
    let inner_nonce = outer_json
        .get("nonce")
        .and_then(Value::as_str)
        .and_then(|s| hex::decode(s).ok())
        .unwrap_or_default();

    let inner_plain = match rt_crypto::decrypt(crypto_mode, &inner_ciphertext, &inner_nonce, inner_key) {
        Some(bytes) => bytes,
        None => {
            tracing::warn!("dropping incoming blob: inner layer failed to decrypt");
            return None;
        }
    };
    let data: Value = match serde_json::from_slice(&inner_plain) {
        Ok(v) => v,
        Err(_) => {
            tracing::warn!("dropping incoming blob: inner layer not valid JSON");
            return None;
        }
    };

    let mut envelope = Envelope::new(data);
    envelope.metadata.origin = origin;
    envelope.metadata.received_at = received_at;
    envelope.metadata.outer_key_hash = Some(outer_hash);
    envelope.metadata.inner_key_hash = Some(inner_hash);
    envelope.assign_event_id();
    Some(envelope)
}

fn missing_key_envelope(
    data: Option<Value>,
    missing_hash: &str,
    in_network: bool,
    origin: Option<String>,
    received_at: Option<i64>,
) -> Envelope {
    Envelope {
        data,
        metadata: EnvelopeMetadata {
            error: Some("missing_key".to_string()),
            missing_hash: Some(missing_hash.to_string()),
            in_network: Some(in_network),
            origin,
            received_at,
            ..Default::default()
        },
    }
}
