//! Stream dedup, bond-set shutdown, and the "distinct update" wait contract:
//! three `create` calls that all resolve to `stream_id = 123` share one
//! consumer, and `RemoveStream` fires exactly once, after the third `remove`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rpc_link::connection::StreamOptions;
use rpc_link::{codec::ProcedureCallSpec, codec::TypeDescriptor, codec::Value, connect};
use rpc_link_test_utils::protocol::{ProcedureCall, ProcedureResult, StreamResult, StreamUpdate};
use rpc_link_test_utils::ScriptedServer;

mod support;
use support::test_config;

fn dummy_call() -> ProcedureCallSpec {
    ProcedureCallSpec {
        service: "Test".to_owned(),
        procedure: "Tick".to_owned(),
        arguments: vec![],
    }
}

#[tokio::test]
async fn dedup_shares_one_consumer_and_bond_set_drives_removal() {
    let remove_calls = Arc::new(AtomicU64::new(0));
    let remove_calls_handler = Arc::clone(&remove_calls);

    let server = ScriptedServer::start(move |call: ProcedureCall| match call.procedure.as_str() {
        "AddStream" => ProcedureResult {
            error: None,
            value: (rpc_link_protocol::scalar::encode_uint64(123).to_vec()).into(),
        },
        "RemoveStream" => {
            remove_calls_handler.fetch_add(1, Ordering::SeqCst);
            ProcedureResult {
                error: None,
                value: (Vec::new()).into(),
            }
        }
        other => panic!("unexpected procedure call: {other}"),
    })
    .await;

    let connection = connect(test_config(&server)).await.expect("connect");

    let s1 = connection
        .create_stream(dummy_call(), TypeDescriptor::UInt64, StreamOptions::default())
        .await
        .expect("create s1");
    let s2 = connection
        .create_stream(dummy_call(), TypeDescriptor::UInt64, StreamOptions::default())
        .await
        .expect("create s2");
    let s3 = connection
        .create_stream(dummy_call(), TypeDescriptor::UInt64, StreamOptions::default())
        .await
        .expect("create s3");

    assert_eq!(s1.id(), 123);
    assert_eq!(s2.id(), 123);
    assert_eq!(s3.id(), 123);

    s1.remove();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(remove_calls.load(Ordering::SeqCst), 0, "two owners remain");

    s2.remove();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(remove_calls.load(Ordering::SeqCst), 0, "one owner remains");

    s3.remove();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(remove_calls.load(Ordering::SeqCst), 1, "last owner triggers removal");
}

#[tokio::test]
async fn get_returns_cached_value_and_wait_blocks_for_a_distinct_update() {
    let server = ScriptedServer::start(|call: ProcedureCall| match call.procedure.as_str() {
        "AddStream" => ProcedureResult {
            error: None,
            value: (rpc_link_protocol::scalar::encode_uint64(7).to_vec()).into(),
        },
        other => panic!("unexpected procedure call: {other}"),
    })
    .await;

    let connection = connect(test_config(&server)).await.expect("connect");
    let stream = connection
        .create_stream(dummy_call(), TypeDescriptor::UInt64, StreamOptions::default())
        .await
        .expect("create stream");

    server.push_stream_update(StreamUpdate {
        results: vec![StreamResult {
            id: 7,
            result: Some(ProcedureResult {
                error: None,
                value: (rpc_link_protocol::scalar::encode_uint64(1).to_vec()).into(),
            }),
        }],
    });

    let first = stream.get(Duration::from_secs(1)).await.expect("first get");
    assert!(matches!(first, Value::UInt64(1)));

    let waiter = tokio::spawn(async move { stream.wait(Duration::from_secs(1)).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    server.push_stream_update(StreamUpdate {
        results: vec![StreamResult {
            id: 7,
            result: Some(ProcedureResult {
                error: None,
                value: (rpc_link_protocol::scalar::encode_uint64(2).to_vec()).into(),
            }),
        }],
    });

    let second = waiter.await.expect("wait task panicked").expect("wait failed");
    assert!(matches!(second, Value::UInt64(2)));
}

#[tokio::test]
async fn subscribe_delivers_every_update_and_immediate_replays_the_cache() {
    let server = ScriptedServer::start(|call: ProcedureCall| match call.procedure.as_str() {
        "AddStream" => ProcedureResult {
            error: None,
            value: (rpc_link_protocol::scalar::encode_uint64(55).to_vec()).into(),
        },
        other => panic!("unexpected procedure call: {other}"),
    })
    .await;

    let connection = connect(test_config(&server)).await.expect("connect");
    let stream = connection
        .create_stream(dummy_call(), TypeDescriptor::UInt64, StreamOptions::default())
        .await
        .expect("create stream");

    server.push_stream_update(StreamUpdate {
        results: vec![StreamResult {
            id: 55,
            result: Some(ProcedureResult {
                error: None,
                value: (rpc_link_protocol::scalar::encode_uint64(10).to_vec()).into(),
            }),
        }],
    });
    stream.get(Duration::from_secs(1)).await.expect("warm the cache");

    let mut sub = stream.subscribe(rpc_link::SubscribeOptions {
        immediate: true,
        remove: false,
    });

    let immediate = sub.next().await.expect("immediate delivery");
    assert_eq!(immediate.expect("ok result").as_ref(), &rpc_link_protocol::scalar::encode_uint64(10)[..]);

    server.push_stream_update(StreamUpdate {
        results: vec![StreamResult {
            id: 55,
            result: Some(ProcedureResult {
                error: None,
                value: (rpc_link_protocol::scalar::encode_uint64(20).to_vec()).into(),
            }),
        }],
    });

    let pushed = sub.next().await.expect("pushed delivery");
    assert_eq!(pushed.expect("ok result").as_ref(), &rpc_link_protocol::scalar::encode_uint64(20)[..]);
}

#[tokio::test]
async fn unsubscribe_stops_further_deliveries_to_that_subscriber() {
    let server = ScriptedServer::start(|call: ProcedureCall| match call.procedure.as_str() {
        "AddStream" => ProcedureResult {
            error: None,
            value: (rpc_link_protocol::scalar::encode_uint64(9).to_vec()).into(),
        },
        other => panic!("unexpected procedure call: {other}"),
    })
    .await;

    let connection = connect(test_config(&server)).await.expect("connect");
    let stream = connection
        .create_stream(dummy_call(), TypeDescriptor::UInt64, StreamOptions::default())
        .await
        .expect("create stream");

    let mut survivor = stream.subscribe(rpc_link::SubscribeOptions::default());
    let departing = stream.subscribe(rpc_link::SubscribeOptions::default());
    departing.unsubscribe();

    server.push_stream_update(StreamUpdate {
        results: vec![StreamResult {
            id: 9,
            result: Some(ProcedureResult {
                error: None,
                value: (rpc_link_protocol::scalar::encode_uint64(1).to_vec()).into(),
            }),
        }],
    });

    let delivered = survivor.next().await.expect("survivor still subscribed");
    assert_eq!(delivered.expect("ok result").as_ref(), &rpc_link_protocol::scalar::encode_uint64(1)[..]);
}
