//! Property-style checks for the universal invariants every envelope
//! history must satisfy, run against the fixture protocol in `common.rs`.

#[path = "common.rs"]
mod common;

use std::sync::Arc;

use rt_store_core::{reserved_keys, StoredEvent, Transaction};
use rt_types::{Envelope, EventId};
use serde_json::json;

#[tokio::test]
async fn projecting_the_same_envelope_twice_is_idempotent() {
    let _guard = common::REGISTRATION_LOCK.lock().unwrap();
    let registry = common::messaging_registry().await;
    let store = common::fresh_store();
    let runtime = rt_runtime::Runtime::from_parts(store.clone(), registry, rt_crypto::CryptoMode::Dummy);
    let dispatcher = runtime.dispatcher();

    let envelope = Envelope::new(json!({"type": "group", "id": "friends"}));
    dispatcher.dispatch(envelope.clone(), 1000).await.unwrap();
    let after_first = {
        let tx = store.begin_transaction().await.unwrap();
        tx.get(reserved_keys::STATE).await.unwrap().unwrap()
    };

    dispatcher.dispatch(envelope, 1000).await.unwrap();
    let after_second = {
        let tx = store.begin_transaction().await.unwrap();
        tx.get(reserved_keys::STATE).await.unwrap().unwrap()
    };

    assert_eq!(after_first["groups"], after_second["groups"]);
    assert_eq!(after_second["groups"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn event_store_accepts_at_most_one_insert_per_event_id() {
    let store = common::fresh_store();
    let event = StoredEvent {
        event_id: EventId("same-id".into()),
        event_type: "message".into(),
        data: json!({"type": "message", "text": "hi"}),
        metadata: json!({}),
        created_at_ms: 1000,
    };

    let mut tx = store.begin_transaction().await.unwrap();
    tx.event_store_append(event.clone()).await.unwrap();
    tx.event_store_append(event).await.unwrap();
    tx.commit().await.unwrap();

    let tx = store.begin_transaction().await.unwrap();
    assert_eq!(tx.event_store_list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn independent_group_registrations_commute() {
    let _guard = common::REGISTRATION_LOCK.lock().unwrap();

    async fn run_order(order: [&str; 2]) -> serde_json::Value {
        let registry = common::messaging_registry().await;
        let store = common::fresh_store();
        let runtime = rt_runtime::Runtime::from_parts(store.clone(), registry, rt_crypto::CryptoMode::Dummy);
        let dispatcher = runtime.dispatcher();
        for id in order {
            dispatcher
                .dispatch(Envelope::new(json!({"type": "group", "id": id})), 1000)
                .await
                .unwrap();
        }
        let tx = store.begin_transaction().await.unwrap();
        let state = tx.get(reserved_keys::STATE).await.unwrap().unwrap();
        let mut groups: Vec<String> = state["groups"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        groups.sort();
        json!(groups)
    }

    let forward = run_order(["friends", "coworkers"]).await;
    let backward = run_order(["coworkers", "friends"]).await;
    assert_eq!(forward, backward);
}

#[tokio::test]
async fn incoming_decryptor_empties_the_queue_even_on_malformed_input() {
    let _guard = common::REGISTRATION_LOCK.lock().unwrap();
    let store = common::fresh_store();
    let runtime = rt_runtime::Runtime::from_parts(
        store.clone(),
        Arc::new(rt_engine::Registry::empty()),
        rt_crypto::CryptoMode::Dummy,
    );
    for blob in [json!({"data": "zz"}), json!({"nothing": true}), json!("just a string")] {
        runtime.enqueue_incoming(blob).await.unwrap();
    }
    runtime.tick(1000).await.unwrap();

    let tx = store.begin_transaction().await.unwrap();
    assert_eq!(tx.get(reserved_keys::INCOMING).await.unwrap(), Some(json!([])));
}

#[tokio::test]
async fn a_second_concurrent_recheck_drain_is_excluded_by_the_lease() {
    let _guard = common::REGISTRATION_LOCK.lock().unwrap();
    let store = common::fresh_store();
    let registry = Arc::new(rt_engine::Registry::empty());
    let runtime_a = rt_runtime::Runtime::from_parts(store.clone(), registry.clone(), rt_crypto::CryptoMode::Dummy);
    let runtime_b = rt_runtime::Runtime::from_parts(store, registry, rt_crypto::CryptoMode::Dummy);

    let first = runtime_a.tick(1000).await.unwrap();
    let second = runtime_b.tick(1000).await.unwrap();
    assert!(first.recheck.drained);
    assert!(!second.recheck.drained);
}
