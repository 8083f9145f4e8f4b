//! A fully automatic mock server: performs both handshakes, answers every
//! RPC call with a caller-supplied handler (in arrival order, matching the
//! real server's FIFO contract), and lets the test push stream updates at
//! will.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use rpc_link_protocol::{
    connection_request, connection_response, ConnectionResponse, ProcedureCall, ProcedureResult,
    Response, StreamUpdate,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::conn::MockConn;

pub struct ScriptedServer {
    rpc_addr: SocketAddr,
    stream_addr: SocketAddr,
    client_identifier: Vec<u8>,
    stream_tx: mpsc::UnboundedSender<StreamUpdate>,
    _rpc_task: JoinHandle<()>,
    _stream_task: JoinHandle<()>,
}

impl ScriptedServer {
    /// Starts the server with a fixed 16-byte client identifier and the
    /// given per-call handler. `handler` is invoked once per `ProcedureCall`
    /// in the exact order frames arrive on the RPC socket.
    pub async fn start<H>(handler: H) -> Self
    where
        H: Fn(ProcedureCall) -> ProcedureResult + Send + Sync + 'static,
    {
        let rpc_listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind rpc listener");
        let stream_listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stream listener");
        let rpc_addr = rpc_listener.local_addr().expect("rpc local addr");
        let stream_addr = stream_listener.local_addr().expect("stream local addr");

        let client_identifier = vec![0xAB_u8; 16];
        let handler = Arc::new(handler);
        let (stream_tx, mut stream_rx) = mpsc::unbounded_channel::<StreamUpdate>();

        let rpc_task = tokio::spawn({
            let client_identifier = client_identifier.clone();
            let handler = Arc::clone(&handler);
            async move {
                let (tcp, _) = rpc_listener.accept().await.expect("rpc accept");
                let mut conn = MockConn::new(tcp);

                let hello = conn.recv_connection_request().await;
                assert_eq!(
                    hello.r#type(),
                    connection_request::Type::Rpc,
                    "first message on the RPC socket must be a RPC ConnectionRequest"
                );
                conn.send_connection_response(ConnectionResponse {
                    status: connection_response::Status::Ok as i32,
                    client_identifier: Some(Bytes::from(client_identifier.clone())),
                    message: None,
                })
                .await;

                while let Some(request) = conn.recv_request_opt().await {
                    let call = request
                        .calls
                        .into_iter()
                        .next()
                        .expect("Request must carry exactly one call");
                    let result = handler(call);
                    conn.send_response(Response {
                        error: None,
                        results: vec![result],
                    })
                    .await;
                }
            }
        });

        let stream_task = tokio::spawn({
            let client_identifier = client_identifier.clone();
            async move {
                let (tcp, _) = stream_listener.accept().await.expect("stream accept");
                let mut conn = MockConn::new(tcp);

                let hello = conn.recv_connection_request().await;
                assert_eq!(
                    hello.r#type(),
                    connection_request::Type::Stream,
                    "first message on the stream socket must be a STREAM ConnectionRequest"
                );
                assert_eq!(
                    hello.client_identifier.as_deref(),
                    Some(&client_identifier[..]),
                    "stream handshake must echo the RPC client_identifier"
                );
                conn.send_connection_response(ConnectionResponse {
                    status: connection_response::Status::Ok as i32,
                    client_identifier: None,
                    message: None,
                })
                .await;

                while let Some(update) = stream_rx.recv().await {
                    conn.send_stream_update(update).await;
                }
            }
        });

        ScriptedServer {
            rpc_addr,
            stream_addr,
            client_identifier,
            stream_tx,
            _rpc_task: rpc_task,
            _stream_task: stream_task,
        }
    }

    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc_addr
    }

    pub fn stream_addr(&self) -> SocketAddr {
        self.stream_addr
    }

    pub fn client_identifier(&self) -> &[u8] {
        &self.client_identifier
    }

    /// Pushes a `StreamUpdate` frame to the (already connected) stream
    /// socket. Panics if the stream socket hasn't connected yet and the
    /// handler task already exited.
    pub fn push_stream_update(&self, update: StreamUpdate) {
        self.stream_tx
            .send(update)
            .expect("stream task exited before the update could be delivered");
    }
}
