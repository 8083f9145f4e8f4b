//! Event first-true semantics: once the server delivers the first `true`,
//! every subsequent `Event::wait` returns immediately with `true` for a
//! boolean stream update on `id = 66`.

use std::time::Duration;

use bytes::Bytes;
use rpc_link::{connect, Event, EventOptions};
use rpc_link_test_utils::protocol::{ProcedureCall, ProcedureResult, StreamResult, StreamUpdate};
use rpc_link_test_utils::ScriptedServer;

mod support;
use support::test_config;

#[tokio::test]
async fn event_wait_returns_true_immediately_after_the_first_delivery() {
    let server = ScriptedServer::start(|call: ProcedureCall| match call.procedure.as_str() {
        "AddEvent" => {
            use prost::Message;
            ProcedureResult {
                error: None,
                value: (rpc_link_test_utils::protocol::EventData { stream_id: 66 }.encode_to_vec()).into(),
            }
        }
        // `Event::create` starts the underlying stream (default `opts.start
        // = true`) the same way `Connection::create_stream` does, so the
        // scripted server needs to answer both administrative calls.
        "StartStream" | "SetStreamRate" => ProcedureResult {
            error: None,
            value: (Vec::new()).into(),
        },
        other => panic!("unexpected procedure call: {other}"),
    })
    .await;

    let connection = connect(test_config(&server)).await.expect("connect");
    let event = Event::create(&connection, Bytes::from_static(b"expr-id"), EventOptions::default())
        .await
        .expect("create event");

    server.push_stream_update(StreamUpdate {
        results: vec![StreamResult {
            id: 66,
            result: Some(ProcedureResult {
                error: None,
                value: (rpc_link_protocol::scalar::encode_bool(true).to_vec()).into(),
            }),
        }],
    });

    assert!(event.wait(Duration::from_secs(1)).await.expect("first wait"));
    assert!(event.wait(Duration::from_secs(1)).await.expect("second wait"));
    assert!(event.wait(Duration::from_secs(1)).await.expect("third wait"));
}
