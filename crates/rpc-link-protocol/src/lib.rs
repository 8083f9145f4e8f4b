//! Wire-level building blocks for the rpc-link client: the envelope
//! messages exchanged over the two sockets, varint length-prefixed framing,
//! and raw scalar encoding. Nothing in this crate knows about connections,
//! streams, or the API surface the generated bindings expose -- it only
//! speaks bytes.

pub mod framer;
pub mod scalar;
pub mod wire;

pub use framer::{Extracted, Framer, FramerError, DEFAULT_MAX_MESSAGE_SIZE};
pub use wire::{
    connection_request, connection_response, Argument, CollectionValue, ConnectionRequest,
    ConnectionResponse, DictionaryEntry, DictionaryValue, Error as WireError, EventData,
    ProcedureCall, ProcedureResult, Request, Response, StreamResult, StreamUpdate,
};
