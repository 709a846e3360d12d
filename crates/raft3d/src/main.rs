//! raft3d: replicated store for a 3D-printer fleet.
//!
//! # Usage
//!
//! ```text
//! raft3d --node-id node1 --http-port 8080 --raft-port 12000
//! raft3d --node-id node2 --http-port 8081 --raft-port 12001 --join 127.0.0.1:8080
//! ```

use clap::Parser;
use tracing::info;

use raft3d::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_config()?;

    // RUST_LOG wins over the configured filter.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.log_filter))?,
        )
        .init();

    let node = raft3d::start(config).await?;
    info!(http = %node.http_addr, raft = %node.raft_addr, "serving; ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    node.shutdown().await;
    Ok(())
}
