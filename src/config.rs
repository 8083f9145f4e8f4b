//! Connection configuration.
//!
//! Most callers build a [`Config`] directly with [`Config::new`] and the
//! builder-style `with_*` methods. Deployments that prefer a config file
//! over a hardcoded call site can load one from TOML instead; as elsewhere
//! in this codebase, TOML is the only file format supported and there is no
//! environment variable layer.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::Error;

/// Everything [`crate::connect`] needs to know to reach a server.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub rpc_port: u16,
    pub stream_port: u16,
    pub client_name: Option<String>,
    pub connect_timeout: Duration,
    pub call_timeout: Duration,
    pub max_message_size: usize,
}

impl Config {
    /// A config pointing at `host` using the default kRPC-style ports
    /// (50000 for RPC, 50001 for streams) and a 16 MiB message cap.
    pub fn new(host: impl Into<String>) -> Self {
        Config {
            host: host.into(),
            rpc_port: 50000,
            stream_port: 50001,
            client_name: None,
            connect_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(30),
            max_message_size: rpc_link_protocol::DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    pub fn with_rpc_port(mut self, port: u16) -> Self {
        self.rpc_port = port;
        self
    }

    pub fn with_stream_port(mut self, port: u16) -> Self {
        self.stream_port = port;
        self
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".to_owned()));
        }
        if self.rpc_port == self.stream_port {
            return Err(Error::Config(
                "rpc_port and stream_port must differ".to_owned(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types (with Option for optional fields)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    host: Option<String>,
    rpc_port: Option<u16>,
    stream_port: Option<u16>,
    client_name: Option<String>,
    connect_timeout_ms: Option<u64>,
    call_timeout_ms: Option<u64>,
    max_message_size: Option<usize>,
}

/// Load a [`Config`] from a TOML file on disk.
pub fn load_config_from_path(path: &Path) -> Result<Config, Error> {
    let toml_str = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("reading config file '{}': {e}", path.display()))
    })?;
    load_config_from_str(&toml_str)
}

/// Load a [`Config`] from a TOML string.
pub fn load_config_from_str(toml_str: &str) -> Result<Config, Error> {
    let raw: RawConfig =
        toml::from_str(toml_str).map_err(|e| Error::Config(format!("parsing config: {e}")))?;

    let host = raw
        .host
        .ok_or_else(|| Error::Config("missing required field: host".to_owned()))?;

    let mut config = Config::new(host);
    if let Some(port) = raw.rpc_port {
        config.rpc_port = port;
    }
    if let Some(port) = raw.stream_port {
        config.stream_port = port;
    }
    config.client_name = raw.client_name;
    if let Some(ms) = raw.connect_timeout_ms {
        config.connect_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = raw.call_timeout_ms {
        config.call_timeout = Duration::from_millis(ms);
    }
    if let Some(size) = raw.max_message_size {
        config.max_message_size = size;
    }

    config.validate()?;
    Ok(config)
}
