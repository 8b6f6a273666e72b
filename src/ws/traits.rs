//! Core traits for the connection seam.

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::Result;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens the underlying transport for an endpoint.
///
/// The connection manager only ever talks to a [`Connector`], so alternate dialers (custom TLS
/// setups, proxies, in-memory transports for tests) plug in without touching it.
///
/// # Example
///
/// ```ignore
/// pub struct LoopbackConnector;
///
/// #[async_trait]
/// impl Connector for LoopbackConnector {
///     type Transport = WsStream;
///
///     async fn connect(&self, endpoint: &Url) -> crate::Result<WsStream> {
///         let (stream, _) = connect_async(endpoint.as_str()).await?;
///         Ok(stream)
///     }
/// }
/// ```
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Full-duplex transport produced by a successful connect
    type Transport: Send + 'static;

    /// Make a single connection attempt.
    async fn connect(&self, endpoint: &Url) -> Result<Self::Transport>;
}

/// Default [`Connector`]: WebSocket handshake over TCP, with rustls for `wss://` endpoints.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    type Transport = WsStream;

    async fn connect(&self, endpoint: &Url) -> Result<WsStream> {
        let (stream, _response) = connect_async(endpoint.as_str()).await?;
        Ok(stream)
    }
}
