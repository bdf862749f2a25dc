//! Command-line entry point for the wire VM server.

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::oneshot;
use tracing::{error, info};

use wirevm::commands::demo_registry;
use wirevm::config::Config;
use wirevm::server::Server;

/// Serve the remote command execution protocol over QUIC.
#[derive(Debug, Parser)]
#[command(name = "wirevmd", version, about)]
struct Cli {
    /// Optional TOML config file; CLI flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. `localhost:42424`.
    #[arg(long)]
    address: Option<String>,

    /// PEM-encoded TLS certificate.
    #[arg(long)]
    cert_file: Option<PathBuf>,

    /// PEM-encoded TLS private key.
    #[arg(long)]
    key_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    if let Some(address) = cli.address {
        config.address = address;
    }
    if let Some(cert_file) = cli.cert_file {
        config.cert_file = cert_file;
    }
    if let Some(key_file) = cli.key_file {
        config.key_file = key_file;
    }

    let (end_tx, end_rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received");
            let _ = end_tx.send(());
        }
    });

    let server = Server::new(config, demo_registry()).with_end_signal(end_rx);
    if let Err(e) = server.serve().await {
        error!(error = %e, "server exited with an error");
        std::process::exit(1);
    }
}
