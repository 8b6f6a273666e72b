//! Long-lived client that sends "hello world" on a fixed interval and logs every echo.
//!
//! Re-establishes the connection whenever it closes. Start `echo_server` first, then run:
//! ```sh
//! RUST_LOG=info cargo run --example hello_client -- --addr ws://127.0.0.1:8080/
//! ```

use std::time::Duration;

use clap::Parser;
use futures::StreamExt as _;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wss_echo::ws::config::Config;
use wss_echo::ws::{Connection, ConnectionManager};

#[derive(Debug, Parser)]
struct Args {
    /// Server endpoint to dial
    #[arg(long, env = "WSS_ECHO_ENDPOINT", default_value = "ws://127.0.0.1:8080/")]
    addr: String,
    /// Seconds between two "hello world" messages
    #[arg(long, default_value_t = 5)]
    interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let manager = ConnectionManager::new(&args.addr, Config::default())?;
    let period = Duration::from_secs(args.interval);

    loop {
        let connection = manager.connect().await?;
        run(connection, period).await;
        warn!(endpoint = %manager.endpoint(), "connection lost, re-establishing");
    }
}

/// Drive one connection until it closes.
async fn run(mut connection: Connection, period: Duration) {
    let sender = connection.sender();

    let consumer = async {
        let mut messages = Box::pin(connection.messages());
        while let Some(payload) = messages.next().await {
            info!(payload = %String::from_utf8_lossy(&payload), "recv");
        }
    };

    let producer = async {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = sender.send("hello world").await {
                warn!(error = %e, "send failed");
                break;
            }
        }
    };

    // The inbound stream ending is the authoritative signal that the connection is gone
    tokio::select! {
        () = consumer => {}
        () = producer => {}
    }
}
