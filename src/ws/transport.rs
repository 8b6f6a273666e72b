//! Direction-restricted views over a single WebSocket transport.
//!
//! [`split`] hands out a [`FrameReader`] that can only read and a [`FrameWriter`] that can only
//! write. Each pump owns exactly one of them, so reads and writes on the shared connection stay
//! confined to one task each.

use std::error::Error as StdError;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{Sink, SinkExt as _, Stream, StreamExt as _};
use tokio::time::{Instant, timeout, timeout_at};
use tokio_tungstenite::tungstenite::Message;

use super::error::WsError;
use crate::Result;
use crate::error::{Error, Kind};

/// Split a full-duplex transport into its read-only and write-only halves.
pub fn split<T, E>(
    transport: T,
    pong_wait: Duration,
    write_wait: Duration,
) -> (
    FrameReader<SplitStream<T>>,
    FrameWriter<SplitSink<T, Message>>,
)
where
    T: Stream<Item = std::result::Result<Message, E>> + Sink<Message, Error = E>,
{
    let (sink, stream) = transport.split();
    (
        FrameReader::new(stream, pong_wait),
        FrameWriter::new(sink, write_wait),
    )
}

/// Read half of a connection, carrying the liveness deadline.
#[derive(Debug)]
pub struct FrameReader<St> {
    stream: St,
    pong_wait: Duration,
    deadline: Instant,
}

impl<St> FrameReader<St> {
    /// Wrap `stream`; the first deadline is `pong_wait` from now.
    pub fn new(stream: St, pong_wait: Duration) -> Self {
        Self {
            stream,
            pong_wait,
            deadline: Instant::now() + pong_wait,
        }
    }

    /// Instant at which the connection is considered dead if nothing arrives.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Push the liveness deadline to `pong_wait` from now.
    pub fn refresh(&mut self) {
        self.deadline = Instant::now() + self.pong_wait;
    }

    /// Read the next frame before the liveness deadline, refreshing it on success.
    ///
    /// Cancel safe: dropping the future before completion loses no frame.
    pub async fn read_frame<E>(&mut self) -> Result<Message>
    where
        St: Stream<Item = std::result::Result<Message, E>> + Unpin,
        E: StdError + Send + Sync + 'static,
    {
        match timeout_at(self.deadline, self.stream.next()).await {
            Err(_elapsed) => Err(WsError::ReadTimeout.into()),
            Ok(None) => Err(WsError::ConnectionClosed.into()),
            Ok(Some(Err(e))) => Err(Error::with_source(Kind::WebSocket, e)),
            Ok(Some(Ok(frame))) => {
                self.refresh();
                Ok(frame)
            }
        }
    }
}

/// Write half of a connection. Every write is bounded by the write deadline.
#[derive(Debug)]
pub struct FrameWriter<Si> {
    sink: Si,
    write_wait: Duration,
}

impl<Si> FrameWriter<Si> {
    /// Wrap `sink`; every write must complete within `write_wait`.
    pub fn new(sink: Si, write_wait: Duration) -> Self {
        Self { sink, write_wait }
    }

    /// Write and flush one frame.
    pub async fn write_frame(&mut self, frame: Message) -> Result<()>
    where
        Si: Sink<Message> + Unpin,
        Si::Error: StdError + Send + Sync + 'static,
    {
        match timeout(self.write_wait, self.sink.send(frame)).await {
            Err(_elapsed) => Err(WsError::WriteTimeout.into()),
            Ok(Err(e)) => Err(Error::with_source(Kind::WebSocket, e)),
            Ok(Ok(())) => Ok(()),
        }
    }

    /// Send a zero-length liveness probe.
    pub async fn ping(&mut self) -> Result<()>
    where
        Si: Sink<Message> + Unpin,
        Si::Error: StdError + Send + Sync + 'static,
    {
        self.write_frame(Message::Ping(Bytes::new())).await
    }

    /// Send a close notification.
    pub async fn close(&mut self) -> Result<()>
    where
        Si: Sink<Message> + Unpin,
        Si::Error: StdError + Send + Sync + 'static,
    {
        self.write_frame(Message::Close(None)).await
    }
}
