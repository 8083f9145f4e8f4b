//! A bare two-port listener: binds the RPC and stream sockets a real
//! `rpc-link` client would connect to, and hands back raw, framed
//! connections for the test to drive by hand.

use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::conn::MockConn;

pub struct MockServer {
    rpc_listener: TcpListener,
    stream_listener: TcpListener,
}

impl MockServer {
    pub async fn start() -> std::io::Result<Self> {
        let rpc_listener = TcpListener::bind("127.0.0.1:0").await?;
        let stream_listener = TcpListener::bind("127.0.0.1:0").await?;
        Ok(MockServer {
            rpc_listener,
            stream_listener,
        })
    }

    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc_listener.local_addr().expect("bound listener has a local addr")
    }

    pub fn stream_addr(&self) -> SocketAddr {
        self.stream_listener.local_addr().expect("bound listener has a local addr")
    }

    /// Accepts the next connection on the RPC port.
    pub async fn accept_rpc(&self) -> MockConn {
        let (stream, _) = self.rpc_listener.accept().await.expect("rpc accept failed");
        MockConn::new(stream)
    }

    /// Accepts the next connection on the stream port.
    pub async fn accept_stream(&self) -> MockConn {
        let (stream, _) = self
            .stream_listener
            .accept()
            .await
            .expect("stream accept failed");
        MockConn::new(stream)
    }
}
