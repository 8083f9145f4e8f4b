//! Shared helpers for the integration tests in this directory.

use rpc_link::Config;
use rpc_link_test_utils::ScriptedServer;

/// A [`Config`] pointed at an already-running [`ScriptedServer`], with a
/// short call timeout so tests that exercise `RpcTimeout` don't hang.
pub fn test_config(server: &ScriptedServer) -> Config {
    Config::new("127.0.0.1")
        .with_rpc_port(server.rpc_addr().port())
        .with_stream_port(server.stream_addr().port())
        .with_call_timeout(std::time::Duration::from_secs(5))
}
