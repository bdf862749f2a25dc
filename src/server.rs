//! # Server / Listener
//!
//! Owns the QUIC endpoint, the command registry, and the shutdown signal.
//! The accept loop spawns one task per incoming bidirectional stream; a
//! QUIC connection may carry more than one stream, and each stream is its
//! own independent session (see [`crate::session`]).
//!
//! A server-wide shutdown closes the listener so no new connections form,
//! but in-flight sessions are never aborted — they run to their own
//! natural end (stream EOF, a terminating VM error, or the peer closing
//! the connection).

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use quinn::{Endpoint, ServerConfig};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::ServerError;
use crate::registry::Registry;
use crate::session;

/// Global session counter so log correlation ids stay unique across every
/// connection the listener has ever accepted, not just within one.
static NEXT_SESSION_ID: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(0));

/// A running (or not-yet-started) server instance.
pub struct Server {
    config: Config,
    registry: Arc<Registry>,
    end_signal: Option<oneshot::Receiver<()>>,
}

impl Server {
    /// Build a server with the given configuration and command registry.
    /// Defaults match the reference implementation: `localhost:42424`,
    /// `server.key`/`server.crt`.
    pub fn new(config: Config, registry: Registry) -> Self {
        Server {
            config,
            registry: Arc::new(registry),
            end_signal: None,
        }
    }

    /// Install a one-shot shutdown signal; its arrival stops the accept
    /// loop without pre-empting sessions already in flight.
    pub fn with_end_signal(mut self, end_signal: oneshot::Receiver<()>) -> Self {
        self.end_signal = Some(end_signal);
        self
    }

    /// Bind the listener and run the accept loop until the end signal
    /// fires or the socket itself fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let addr = self.config.socket_addr()?;
        let server_config = build_server_config(&self.config)?;
        let endpoint = Endpoint::server(server_config, addr).map_err(|e| ServerError::Bind {
            addr,
            source: e,
        })?;

        info!(%addr, "listening for QUIC connections");

        let mut end_signal = self.end_signal;
        let registry = self.registry;

        loop {
            let incoming = match end_signal.as_mut() {
                Some(signal) => {
                    tokio::select! {
                        conn = endpoint.accept() => conn,
                        _ = signal => {
                            info!("shutdown signal received, closing listener");
                            break;
                        }
                    }
                }
                None => endpoint.accept().await,
            };

            let Some(connecting) = incoming else {
                info!("endpoint closed, accept loop exiting");
                break;
            };

            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                match connecting.await {
                    Ok(connection) => accept_streams(connection, registry).await,
                    Err(e) => warn!(error = %e, "connection handshake failed"),
                }
            });
        }

        endpoint.wait_idle().await;
        Ok(())
    }
}

/// Each QUIC connection may carry multiple bidirectional streams; every
/// stream becomes its own independent session with a monotonically
/// increasing id for log correlation, scoped to this one connection.
async fn accept_streams(connection: quinn::Connection, registry: Arc<Registry>) {
    loop {
        match connection.accept_bi().await {
            Ok((send, recv)) => {
                let registry = Arc::clone(&registry);
                let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
                tokio::spawn(async move {
                    session::handle_stream(id, send, recv, registry).await;
                });
            }
            Err(quinn::ConnectionError::ApplicationClosed(_)) => break,
            Err(e) => {
                warn!(error = %e, "connection ended");
                break;
            }
        }
    }
}

fn build_server_config(config: &Config) -> Result<ServerConfig, ServerError> {
    let certs = load_certs(&config.cert_file)?;
    let key = load_key(&config.key_file)?;

    let server_crypto = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Tls(e.to_string()))?;

    Ok(ServerConfig::with_crypto(Arc::new(server_crypto)))
}

fn load_certs(path: &Path) -> Result<Vec<rustls::Certificate>, ServerError> {
    let file = File::open(path).map_err(ServerError::Io)?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .map_err(|e| ServerError::Tls(format!("failed to parse {}: {}", path.display(), e)))?;
    Ok(certs.into_iter().map(rustls::Certificate).collect())
}

fn load_key(path: &Path) -> Result<rustls::PrivateKey, ServerError> {
    let file = File::open(path).map_err(ServerError::Io)?;
    let mut reader = BufReader::new(file);
    let keys = rustls_pemfile::pkcs8_private_keys(&mut reader)
        .map_err(|e| ServerError::Tls(format!("failed to parse {}: {}", path.display(), e)))?;
    let key = keys
        .into_iter()
        .next()
        .ok_or_else(|| ServerError::Tls(format!("no private key found in {}", path.display())))?;
    Ok(rustls::PrivateKey(key))
}
