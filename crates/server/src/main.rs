//! notara-server entry point.

use anyhow::Context;
use clap::Parser;
use notara_ledger::{Ledger, LedgerConfig};
use std::net::SocketAddr;
use std::sync::Arc;

mod api;

#[derive(Parser)]
#[command(name = "notara-server")]
#[command(about = "JSON API server for the notara notarization ledger", long_about = None)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8545")]
    listen: SocketAddr,

    /// Mempool capacity; oldest pending entries are evicted beyond this.
    #[arg(long, default_value_t = 1024)]
    capacity: usize,

    /// Maximum transactions per block.
    #[arg(long, default_value_t = 5)]
    batch: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let ledger = Arc::new(
        Ledger::new(LedgerConfig {
            capacity: args.capacity,
            batch: args.batch,
        })
        .context("failed to initialize ledger")?,
    );
    tracing::info!(
        proposer = %ledger.proposer_public_key()?.to_hex(),
        capacity = args.capacity,
        batch = args.batch,
        "ledger initialized"
    );

    let app = api::router(ledger);
    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    tracing::info!(listen = %args.listen, "notara-server listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
