use std::error::Error as StdError;

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::transport::FrameReader;
use crate::Result;

/// Inbound pump: the only reader of a connection.
///
/// Forwards every data frame to `inbound` in arrival order. The liveness deadline is refreshed by
/// every frame the reader returns, PONG replies included, so an idle but healthy peer stays
/// connected as long as it answers our PINGs.
///
/// A full `inbound` queue blocks the pump (backpressure reaches the peer through TCP flow
/// control); nothing is dropped. Returning, for whatever reason, drops `inbound`, which ends the
/// application's message stream, and cancels `shutdown` so the outbound pump stops too.
pub async fn run<St, E>(
    mut reader: FrameReader<St>,
    inbound: mpsc::Sender<Bytes>,
    shutdown: CancellationToken,
) -> Result<()>
where
    St: Stream<Item = std::result::Result<Message, E>> + Unpin,
    E: StdError + Send + Sync + 'static,
{
    let _guard = shutdown.clone().drop_guard();

    loop {
        let frame = tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            frame = reader.read_frame() => frame?,
        };

        let payload = match frame {
            Message::Text(_) | Message::Binary(_) => frame.into_data(),
            Message::Pong(_) => {
                trace!(direction = "inbound", deadline = ?reader.deadline(), "pong");
                continue;
            }
            // tungstenite queues the PONG reply itself
            Message::Ping(_) | Message::Frame(_) => continue,
            Message::Close(close) => {
                debug!(direction = "inbound", ?close, "peer sent close");
                return Ok(());
            }
        };

        trace!(direction = "inbound", len = payload.len(), "recv");

        tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            sent = inbound.send(payload) => {
                if sent.is_err() {
                    debug!(direction = "inbound", "inbound queue dropped by application");
                    return Ok(());
                }
            }
        }
    }
}
