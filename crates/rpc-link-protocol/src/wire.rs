//! Generated protobuf message types for the handshake, call, and streaming
//! envelopes. See `proto/rpclink.proto` for the source of truth; this module
//! just pulls in what `prost-build` produced in `OUT_DIR` at compile time.

include!(concat!(env!("OUT_DIR"), "/rpclink.rs"));
