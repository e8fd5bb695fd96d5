//! Standalone Salvo server.

use std::time::Duration;

use clap::Parser;
use salvo::prelude::*;
use tracing_subscriber::EnvFilter;

/// Realtime two-player battleship server.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to listen on
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    bind: String,
    /// Name of the matchmaking queue
    #[clap(short, long, default_value = "matchmaking:queue")]
    queue: String,
    /// Seconds a disconnected player is advertised as able to rejoin
    #[clap(long, default_value = "300")]
    reconnect_window_secs: u64,
    /// Close connections silent for this many seconds
    #[clap(long, default_value = "600")]
    idle_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), SalvoError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let server = SalvoServer::builder()
        .bind(&args.bind)
        .game_config(GameConfig {
            queue_name: args.queue,
            reconnect_window: Duration::from_secs(args.reconnect_window_secs),
        })
        .idle_timeout(Duration::from_secs(args.idle_timeout_secs))
        .build()
        .await?;

    if let Ok(addr) = server.local_addr() {
        tracing::info!(%addr, "listening");
    }
    server.run().await
}
