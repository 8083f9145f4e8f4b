//! Expression builder: every node issues exactly one `Expression_*` RPC and
//! returns a fresh opaque id; building a small tree costs one round trip per
//! node, and operators only compose over already-built `Expr` handles.

use rpc_link::{connect, Expr};
use rpc_link_test_utils::protocol::{ProcedureCall, ProcedureResult};
use rpc_link_test_utils::ScriptedServer;

mod support;
use support::test_config;

#[tokio::test]
async fn building_a_comparison_tree_issues_one_call_per_node() {
    let server = ScriptedServer::start(|call: ProcedureCall| {
        // Every Expression_* node gets a fresh id derived from the call
        // count via the procedure name's byte length, just so each node in
        // the tree below has a distinguishable id to assert against.
        let id = format!("id:{}", call.procedure);
        ProcedureResult {
            error: None,
            value: (id.into_bytes()).into(),
        }
    })
    .await;

    let connection = connect(test_config(&server)).await.expect("connect");

    let altitude = Expr::double(&connection, 100.0).await.expect("const double");
    let threshold = Expr::double(&connection, 50.0).await.expect("const double");
    let comparison = altitude
        .greater_than(&threshold)
        .await
        .expect("greater_than node");

    assert_eq!(comparison.id().as_ref(), b"id:Expression_GreaterThan");
}

#[tokio::test]
async fn and_of_two_comparisons_composes_over_built_nodes() {
    let server = ScriptedServer::start(|call: ProcedureCall| {
        let id = format!("id:{}", call.procedure);
        ProcedureResult {
            error: None,
            value: (id.into_bytes()).into(),
        }
    })
    .await;

    let connection = connect(test_config(&server)).await.expect("connect");

    let paused = Expr::bool(&connection, true).await.expect("const bool");
    let altitude = Expr::double(&connection, 1000.0).await.expect("const double");
    let zero = Expr::double(&connection, 0.0).await.expect("const double");
    let descending = altitude.greater_than(&zero).await.expect("greater_than");
    let combined = paused.and(&descending).await.expect("and node");

    assert_eq!(combined.id().as_ref(), b"id:Expression_And");
}

#[tokio::test]
async fn cast_rejects_non_scalar_targets() {
    let server = ScriptedServer::start(|call: ProcedureCall| ProcedureResult {
        error: None,
        value: (format!("id:{}", call.procedure).into_bytes()).into(),
    })
    .await;

    let connection = connect(test_config(&server)).await.expect("connect");
    let value = Expr::int(&connection, 42).await.expect("const int");

    let bad_target = rpc_link::TypeDescriptor::List(Box::new(rpc_link::TypeDescriptor::SInt32));
    let err = value.cast(&bad_target).await.expect_err("list is not castable");
    assert!(matches!(err, rpc_link::Error::Builder(_)));

    let good_target = rpc_link::TypeDescriptor::Double;
    let casted = value.cast(&good_target).await.expect("cast to double");
    assert_eq!(casted.id().as_ref(), b"id:Expression_Cast");
}
