//! Echo server: writes every received frame back to its sender.
//!
//! Run with:
//! ```sh
//! RUST_LOG=info cargo run --example echo_server -- --addr 0.0.0.0:8080
//! ```

use std::net::SocketAddr;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wss_echo::server::{EchoServer, ServerConfig};

#[derive(Debug, Parser)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "WSS_ECHO_ADDR", default_value = "0.0.0.0:8080")]
    addr: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = ServerConfig::builder().bind(args.addr).build();
    let server = EchoServer::bind(&config).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c received, shutting down");
            }
            shutdown.cancel();
        }
    });

    server.serve(shutdown).await?;

    Ok(())
}
