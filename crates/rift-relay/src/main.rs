//! rift-relay binary: loads config, installs logging, serves until killed.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use rift_config::RiftConfig;
use rift_relay::{RelayError, RelayHub, RelayServer};
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "rift-relay", about = "WebSocket relay between mobile peers and desktop conduits")]
struct Args {
    /// Path to a config file. Defaults to the platform config directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interface to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on.
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    let args = Args::parse();

    let loaded = match &args.config {
        Some(path) => rift_config::toml_loader::load_from_path(path),
        None => rift_config::toml_loader::load_default(),
    };
    let default_level = loaded
        .as_ref()
        .map(|c| c.logging.level)
        .unwrap_or_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("rift_relay={}", default_level.as_filter()).into()),
        )
        .init();

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) if args.config.is_some() => return Err(e.into()),
        Err(e) => {
            tracing::warn!(error = %e, "Falling back to default config");
            RiftConfig::default()
        }
    };
    if let Some(host) = args.host {
        config.relay.host = host;
    }
    if let Some(port) = args.port {
        config.relay.port = port;
    }
    rift_config::validation::validate(&config)?;

    let addr = config.relay.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("rift-relay listening on {}", addr);

    let server = RelayServer::new(
        RelayHub::new(),
        Duration::from_millis(config.relay.heartbeat_interval_ms),
    );
    server.serve(listener).await
}
