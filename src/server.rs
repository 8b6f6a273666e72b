//! Minimal WebSocket echo server.
//!
//! Every text or binary frame a client sends is written back with the same type and payload.
//! Each connection runs in its own task; a failing connection is logged and dropped without
//! affecting the others. No state is kept across connections.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use bon::Builder;
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument as _, debug, error, info, info_span, warn};

use crate::Result;

const DEFAULT_BIND: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 8080));

/// Configuration for [`EchoServer`]
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct ServerConfig {
    /// Address the listener binds to. Defaults to `0.0.0.0:8080`.
    #[builder(default = DEFAULT_BIND)]
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Echo server bound to a TCP listener.
///
/// ```no_run
/// use tokio_util::sync::CancellationToken;
/// use wss_echo::server::{EchoServer, ServerConfig};
///
/// # async fn example() -> wss_echo::Result<()> {
/// let server = EchoServer::bind(&ServerConfig::default()).await?;
/// server.serve(CancellationToken::new()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct EchoServer {
    listener: TcpListener,
}

impl EchoServer {
    /// Bind the listener to `config.bind`.
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind).await?;
        info!(addr = %listener.local_addr()?, "echo server listening");
        Ok(Self { listener })
    }

    /// Address the listener is actually bound to, useful after binding port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept and echo connections until `shutdown` is cancelled.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(
                            echo(stream, shutdown.child_token()).instrument(info_span!("echo", %peer)),
                        );
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "echo task aborted");
                    }
                }
            }
        }

        debug!(open = connections.len(), "echo server stopping");
        while connections.join_next().await.is_some() {}
        Ok(())
    }
}

/// Echo frames on one connection until it fails or closes.
async fn echo(stream: TcpStream, shutdown: CancellationToken) {
    let mut ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(error = %e, "upgrade failed");
            return;
        }
    };
    debug!("client connected");

    loop {
        let next = tokio::select! {
            () = shutdown.cancelled() => {
                _ = ws.close(None).await;
                break;
            }
            next = ws.next() => next,
        };

        match next {
            Some(Ok(msg @ (Message::Text(_) | Message::Binary(_)))) => {
                let reply = msg.clone();
                info!(payload = %String::from_utf8_lossy(&msg.into_data()), "recv");

                if let Err(e) = ws.send(reply).await {
                    warn!(direction = "outbound", error = %e, "write error");
                    break;
                }
            }
            // tungstenite answers PINGs and completes the close handshake on the next read
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(direction = "inbound", error = %e, "read error");
                break;
            }
            None => {
                debug!("client disconnected");
                break;
            }
        }
    }
}
