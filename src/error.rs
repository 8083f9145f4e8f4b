//! Error taxonomy for the client connection and everything built on top of
//! it. Transport/protocol failures are fatal to the whole connection group;
//! remote errors and timeouts are returned to the specific caller only.

use rpc_link_protocol::{FramerError, ScalarError};

/// The error type returned by every fallible operation in this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to connect: {0}")]
    Connect(#[from] std::io::Error),

    #[error("server rejected the connection: {0}")]
    HandshakeRejected(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("remote error in {service}.{name}: {description}")]
    Remote {
        service: String,
        name: String,
        description: String,
        stack_trace: String,
    },

    #[error("RPC call timed out")]
    RpcTimeout,

    #[error("stream wait timed out")]
    StreamTimeout,

    #[error("connection is closed")]
    ConnectionClosed,

    #[error("invalid expression: {0}")]
    Builder(String),
}

impl From<FramerError> for Error {
    fn from(e: FramerError) -> Self {
        Error::Protocol(e.to_string())
    }
}

impl From<ScalarError> for Error {
    fn from(e: ScalarError) -> Self {
        Error::Protocol(e.to_string())
    }
}

impl From<prost::DecodeError> for Error {
    fn from(e: prost::DecodeError) -> Self {
        Error::Protocol(format!("malformed message: {e}"))
    }
}
