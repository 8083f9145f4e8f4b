//! Client runtime for a remote game server that exposes a large, dynamically
//! described API (services, classes, procedures, enumerations) over two TCP
//! sockets using length-prefixed protobuf messages.
//!
//! This crate covers the connection and streaming runtime only: a pipelined
//! request/response multiplexer over the RPC socket ([`rpc`]), a stream
//! demultiplexer over the companion socket ([`stream_conn`]), per-stream
//! consumer lifecycle with reference-counted bonds ([`stream`]), boolean
//! events built on top of streams ([`event`]), and a builder for server-side
//! expression trees ([`expr`]). Generated per-procedure bindings, built on
//! top of [`codec`] and [`Connection::call_rpc`], are a separate concern and
//! do not live here.

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod expr;
pub mod object;
mod rpc;
pub mod stream;
mod stream_conn;

pub use codec::{ProcedureCallSpec, TypeDescriptor, Value};
pub use config::{load_config_from_path, load_config_from_str, Config};
pub use connection::{connect, Connection, StreamOptions};
pub use error::Error;
pub use event::{Event, EventOptions};
pub use expr::Expr;
pub use object::ObjectReference;
pub use stream::{Stream, SubscribeOptions, Subscription};
