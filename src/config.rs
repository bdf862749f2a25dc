//! # Server Configuration
//!
//! Recognized options, per the protocol's external-interfaces section:
//! `address` (listen host:port), `key_file`/`cert_file` (TLS material), and
//! an optional config file read with `toml`/`serde` before CLI flags are
//! layered on top — CLI always wins. `end_signal` is not user-configurable;
//! it's constructed in-process (see [`crate::server::Server`]).

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ServerError;

/// Server configuration as recognized by both the config file and the CLI.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// `host:port` the listener binds to.
    #[serde(default = "default_address")]
    pub address: String,

    /// PEM-encoded private key for the TLS listener.
    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,

    /// PEM-encoded certificate chain for the TLS listener.
    #[serde(default = "default_cert_file")]
    pub cert_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            address: default_address(),
            key_file: default_key_file(),
            cert_file: default_cert_file(),
        }
    }
}

fn default_address() -> String {
    "localhost:42424".to_string()
}

fn default_key_file() -> PathBuf {
    PathBuf::from("server.key")
}

fn default_cert_file() -> PathBuf {
    PathBuf::from("server.crt")
}

impl Config {
    /// Load a config file (if given) and resolve `address` into a concrete
    /// socket address, erroring out eagerly rather than deferring to a
    /// failed bind later.
    pub fn load(config_path: Option<&std::path::Path>) -> Result<Self, ServerError> {
        let config = match config_path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(ServerError::Io)?;
                toml::from_str(&text)
                    .map_err(|e| ServerError::Config(format!("invalid config file: {}", e)))?
            }
            None => Config::default(),
        };
        Ok(config)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        use std::net::ToSocketAddrs;
        self.address
            .to_socket_addrs()
            .map_err(|e| ServerError::Config(format!("invalid address {}: {}", self.address, e)))?
            .next()
            .ok_or_else(|| ServerError::Config(format!("address resolved to nothing: {}", self.address)))
    }
}
