//! Test doubles for exercising `rpc-link` end to end without a real game
//! server: a bare two-port listener for byte-level scenarios, and a
//! `ScriptedServer` that performs both handshakes automatically and answers
//! calls through a caller-supplied handler.

mod conn;
mod scripted;
mod server;

pub use conn::MockConn;
pub use scripted::ScriptedServer;
pub use server::MockServer;

pub use rpc_link_protocol as protocol;
