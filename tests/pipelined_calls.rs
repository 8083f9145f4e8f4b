//! Pipelined call ordering: three concurrent callers submit calls and must
//! each receive the response matching their own request, even though
//! responses carry no correlation id and rely solely on FIFO ordering.

use std::time::Duration;

use bytes::Bytes;
use rpc_link::connect;
use rpc_link_test_utils::protocol::{ProcedureCall, ProcedureResult};
use rpc_link_test_utils::ScriptedServer;

mod support;
use support::test_config;

#[tokio::test]
async fn three_concurrent_calls_receive_their_own_responses_in_order() {
    let server = ScriptedServer::start(|call: ProcedureCall| {
        // Echo back a value derived from the call's single argument so the
        // test can tell which request produced which response.
        let seed = call.arguments[0].value[0];
        ProcedureResult {
            error: None,
            value: (vec![seed, seed + 1, seed + 2]).into(),
        }
    })
    .await;

    let connection = connect(test_config(&server)).await.expect("connect");

    let a = connection.call_rpc("Test", "Echo", vec![(0, Bytes::from_static(&[11]))]);
    let b = connection.call_rpc("Test", "Echo", vec![(0, Bytes::from_static(&[21]))]);
    let c = connection.call_rpc("Test", "Echo", vec![(0, Bytes::from_static(&[31]))]);

    let (a, b, c) = tokio::join!(a, b, c);

    assert_eq!(a.unwrap().as_ref(), &[11, 12, 13]);
    assert_eq!(b.unwrap().as_ref(), &[21, 22, 23]);
    assert_eq!(c.unwrap().as_ref(), &[31, 32, 33]);
}

#[tokio::test]
async fn remote_error_is_surfaced_only_to_the_caller_that_triggered_it() {
    let server = ScriptedServer::start(|call: ProcedureCall| {
        if call.procedure == "Fail" {
            ProcedureResult {
                error: Some(rpc_link_test_utils::protocol::WireError {
                    service: "Test".to_owned(),
                    name: "BadThing".to_owned(),
                    description: "something went wrong".to_owned(),
                    stack_trace: String::new(),
                }),
                value: (Vec::new()).into(),
            }
        } else {
            ProcedureResult {
                error: None,
                value: (vec![0x2a]).into(),
            }
        }
    })
    .await;

    let connection = connect(test_config(&server)).await.expect("connect");

    let ok = connection.call_rpc("Test", "Ok", vec![]);
    let fail = connection.call_rpc("Test", "Fail", vec![]);
    let (ok, fail) = tokio::join!(ok, fail);

    assert_eq!(ok.unwrap().as_ref(), &[0x2a]);
    match fail {
        Err(rpc_link::Error::Remote { name, .. }) => assert_eq!(name, "BadThing"),
        other => panic!("expected Remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn call_times_out_when_no_response_ever_arrives() {
    // A handler that never runs: the server accepts the handshake but the
    // scripted responder only fires per-call, so we instead drop the
    // connection's socket write path by using a call_timeout much shorter
    // than the server would ever reply within a manual MockServer scenario.
    let server = rpc_link_test_utils::MockServer::start().await.expect("start");
    let mut config = test_config_manual(&server);
    config.call_timeout = Duration::from_millis(50);

    let client = tokio::spawn(rpc_link::connect(config));
    let mut rpc_conn = server.accept_rpc().await;
    rpc_conn.recv_connection_request().await;
    rpc_conn
        .send_connection_response(rpc_link_test_utils::protocol::ConnectionResponse {
            status: rpc_link_test_utils::protocol::connection_response::Status::Ok as i32,
            client_identifier: Some(vec![0u8; 16].into()),
            message: None,
        })
        .await;
    let mut stream_conn = server.accept_stream().await;
    stream_conn.recv_connection_request().await;
    stream_conn
        .send_connection_response(rpc_link_test_utils::protocol::ConnectionResponse {
            status: rpc_link_test_utils::protocol::connection_response::Status::Ok as i32,
            client_identifier: None,
            message: None,
        })
        .await;

    let connection = client.await.expect("connect task panicked").expect("connect failed");

    // The mock server never answers this request.
    let _ = rpc_conn.recv_request().await;
    let result = connection.call_rpc("Test", "NeverReplies", vec![]).await;
    assert!(matches!(result, Err(rpc_link::Error::RpcTimeout)));
}

fn test_config_manual(server: &rpc_link_test_utils::MockServer) -> rpc_link::Config {
    rpc_link::Config::new("127.0.0.1")
        .with_rpc_port(server.rpc_addr().port())
        .with_stream_port(server.stream_addr().port())
}
