//! A single accepted socket, framed for length-prefixed protobuf traffic.
//! Thin enough that tests can script exact byte-level scenarios (see the
//! concrete end-to-end examples in the top-level crate's integration
//! tests), while still hiding the varint bookkeeping.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use prost::Message;
use rpc_link_protocol::{ConnectionRequest, ConnectionResponse, Framer, Request, Response};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

pub struct MockConn {
    framed: Framed<TcpStream, Framer>,
}

impl MockConn {
    pub(crate) fn new(stream: TcpStream) -> Self {
        MockConn {
            framed: Framed::new(stream, Framer::default()),
        }
    }

    pub async fn recv_raw(&mut self) -> Bytes {
        self.framed
            .next()
            .await
            .expect("connection closed before a frame arrived")
            .expect("framing error")
    }

    /// Like [`Self::recv_raw`] but returns `None` on a clean EOF instead of
    /// panicking, for loops that should exit when the client disconnects.
    pub async fn recv_raw_opt(&mut self) -> Option<Bytes> {
        match self.framed.next().await {
            None => None,
            Some(frame) => Some(frame.expect("framing error")),
        }
    }

    pub async fn recv_request_opt(&mut self) -> Option<Request> {
        let raw = self.recv_raw_opt().await?;
        Some(Request::decode(raw).expect("malformed Request"))
    }

    pub async fn send_raw(&mut self, payload: Bytes) {
        self.framed.send(payload).await.expect("write failed");
    }

    pub async fn recv_connection_request(&mut self) -> ConnectionRequest {
        let raw = self.recv_raw().await;
        ConnectionRequest::decode(raw).expect("malformed ConnectionRequest")
    }

    pub async fn send_connection_response(&mut self, resp: ConnectionResponse) {
        self.send_raw(resp.encode_to_vec().into()).await;
    }

    pub async fn recv_request(&mut self) -> Request {
        let raw = self.recv_raw().await;
        Request::decode(raw).expect("malformed Request")
    }

    pub async fn send_response(&mut self, resp: Response) {
        self.send_raw(resp.encode_to_vec().into()).await;
    }

    pub async fn send_stream_update(&mut self, update: rpc_link_protocol::StreamUpdate) {
        self.send_raw(update.encode_to_vec().into()).await;
    }
}
