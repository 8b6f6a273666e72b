//! Core WebSocket client infrastructure.
//!
//! This module provides a persistent, full-duplex connection that multiplexes an outbound and an
//! inbound queue onto one WebSocket, keeping it alive with PING/PONG heartbeats.
//!
//! # Architecture
//!
//! - [`Establisher`]: opens the transport, retrying according to a [`config::RetryPolicy`]
//! - [`inbound`]: the only reader; feeds the inbound queue and tracks the liveness deadline
//! - [`outbound`]: the only writer; drains and coalesces the outbound queue and sends PINGs
//! - [`ConnectionManager`]: wires one pump pair to every established connection
//!
//! Data flows `Connection::send -> outbound queue -> outbound pump -> transport -> peer ->
//! transport -> inbound pump -> inbound queue -> Connection::recv`.
//!
//! # Example
//!
//! ```ignore
//! let manager = ConnectionManager::new("ws://127.0.0.1:8080", Config::default())?;
//! let mut connection = manager.connect().await?;
//! connection.send("hello world").await?;
//! let echoed = connection.recv().await;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod establish;
pub mod inbound;
pub mod outbound;
pub mod traits;
pub mod transport;

pub use connection::{Connection, ConnectionManager, ConnectionState, Sender};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use establish::Establisher;
pub use traits::*;
