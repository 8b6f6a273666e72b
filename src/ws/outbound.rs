use std::error::Error as StdError;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::Sink;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::transport::FrameWriter;
use crate::Result;

/// Outbound pump: the only writer of a connection, PINGs included.
///
/// Waits on whichever comes first of a queued payload, the PING ticker, or `shutdown`. When a
/// payload arrives, everything already sitting in the queue is drained with it and written as a
/// single binary frame, in enqueue order. Once every producer is gone the remaining payloads are
/// flushed and a close notification ends the pump. The stop signal does the same: payloads that
/// were accepted before it are still written, then the queue is closed to new ones.
///
/// A coalesced frame holds at most `outbound.max_capacity()` payloads but has no byte limit; the
/// queue capacity times the largest payload must stay below the peer's maximum message size.
///
/// Any write error or expired write deadline terminates the pump; there is no retry on the same
/// connection. Returning cancels `shutdown`, which stops the inbound pump.
pub async fn run<Si>(
    mut writer: FrameWriter<Si>,
    mut outbound: mpsc::Receiver<Bytes>,
    ping_period: Duration,
    shutdown: CancellationToken,
) -> Result<()>
where
    Si: Sink<Message> + Unpin,
    Si::Error: StdError + Send + Sync + 'static,
{
    let _guard = shutdown.clone().drop_guard();

    let mut ticker = interval_at(Instant::now() + ping_period, ping_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let limit = outbound.max_capacity();
    let mut batch = Vec::with_capacity(limit.min(64));

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                if let Err(e) = flush_and_close(&mut writer, &mut outbound, &mut batch).await {
                    debug!(direction = "outbound", error = %e, "flush on shutdown failed");
                }
                return Ok(());
            }
            received = outbound.recv_many(&mut batch, limit) => {
                if received == 0 {
                    debug!(direction = "outbound", "outbound queue closed");
                    return writer.close().await;
                }

                let frame = coalesce(&mut batch);
                trace!(direction = "outbound", payloads = received, len = frame.len(), "send");
                writer.write_frame(Message::Binary(frame)).await?;

                if outbound.is_closed() && outbound.is_empty() {
                    debug!(direction = "outbound", "outbound queue closed");
                    return writer.close().await;
                }
            }
            _ = ticker.tick() => {
                trace!(direction = "outbound", "ping");
                writer.ping().await?;
            }
        }
    }
}

/// Refuse new payloads, write everything still queued as one frame, then send a close
/// notification.
async fn flush_and_close<Si>(
    writer: &mut FrameWriter<Si>,
    outbound: &mut mpsc::Receiver<Bytes>,
    batch: &mut Vec<Bytes>,
) -> Result<()>
where
    Si: Sink<Message> + Unpin,
    Si::Error: StdError + Send + Sync + 'static,
{
    outbound.close();
    while let Ok(payload) = outbound.try_recv() {
        batch.push(payload);
    }

    if !batch.is_empty() {
        let payloads = batch.len();
        let frame = coalesce(batch);
        trace!(direction = "outbound", payloads, len = frame.len(), "flush");
        writer.write_frame(Message::Binary(frame)).await?;
    }
    writer.close().await
}

/// Concatenate a drained batch into one frame body, emptying `batch`.
fn coalesce(batch: &mut Vec<Bytes>) -> Bytes {
    if batch.len() == 1
        && let Some(single) = batch.pop()
    {
        return single;
    }

    let len = batch.iter().map(Bytes::len).sum();
    let mut frame = BytesMut::with_capacity(len);
    for payload in batch.drain(..) {
        frame.extend_from_slice(&payload);
    }
    frame.freeze()
}
