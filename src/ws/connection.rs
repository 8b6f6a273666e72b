#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_stream::stream;
use bytes::Bytes;
use futures::{Sink, Stream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinError;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument as _, debug, error, info, info_span, warn};
use url::Url;

use super::config::Config;
use super::error::WsError;
use super::establish::Establisher;
use super::traits::{Connector, TungsteniteConnector};
use super::{inbound, outbound, transport};
use crate::Result;
use crate::error::Error;

/// Lifecycle of one connection instance: `Connecting -> Active -> Closed`.
///
/// There is no way back from `Closed`; a new [`Connection`] is a new instance of this machine.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Establishing the transport
    Connecting,
    /// Both pumps are running
    Active {
        /// When the connection was established
        since: Instant,
    },
    /// Both pumps have stopped, or no connection was made yet
    Closed,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active { .. })
    }

    /// Check if both pumps have stopped.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Establishes connections and wires one inbound and one outbound pump to each.
///
/// The manager is cheap to clone. Each [`ConnectionManager::connect`] call produces an
/// independent [`Connection`]; re-establishing after a failure is up to the caller.
///
/// # Example
///
/// ```no_run
/// use futures::StreamExt as _;
/// use wss_echo::ws::ConnectionManager;
/// use wss_echo::ws::config::Config;
///
/// # async fn example() -> wss_echo::Result<()> {
/// let manager = ConnectionManager::new("ws://127.0.0.1:8080", Config::default())?;
/// let mut connection = manager.connect().await?;
///
/// connection.send("hello world").await?;
///
/// let mut messages = Box::pin(connection.messages());
/// while let Some(payload) = messages.next().await {
///     println!("recv: {}", String::from_utf8_lossy(&payload));
/// }
/// # Ok(())
/// # }
/// ```
pub struct ConnectionManager<C: Connector = TungsteniteConnector> {
    inner: Arc<ManagerInner<C>>,
}

impl<C: Connector> Clone for ConnectionManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ManagerInner<C> {
    endpoint: Url,
    config: Config,
    establisher: Establisher<C>,
    /// State of the most recent connection instance
    state_tx: watch::Sender<ConnectionState>,
    /// Incremented by every `connect` call; identifies the most recent instance
    generation: AtomicU64,
}

impl ConnectionManager<TungsteniteConnector> {
    /// Create a manager dialing `endpoint` with the default tungstenite connector.
    pub fn new(endpoint: &str, config: Config) -> Result<Self> {
        Self::with_connector(endpoint, config, TungsteniteConnector)
    }
}

impl<C> ConnectionManager<C>
where
    C: Connector,
    C::Transport: Stream<Item = std::result::Result<Message, tungstenite::Error>>
        + Sink<Message, Error = tungstenite::Error>
        + Send
        + Unpin,
{
    /// Create a manager using a custom [`Connector`].
    pub fn with_connector(endpoint: &str, config: Config, connector: C) -> Result<Self> {
        config.validate()?;
        let endpoint = Url::parse(endpoint)?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(Error::validation(format!(
                "unsupported scheme `{}`, expected ws or wss",
                endpoint.scheme()
            )));
        }

        let establisher = Establisher::new(connector, config.retry.clone());
        let (state_tx, _) = watch::channel(ConnectionState::Closed);

        Ok(Self {
            inner: Arc::new(ManagerInner {
                endpoint,
                config,
                establisher,
                state_tx,
                generation: AtomicU64::new(0),
            }),
        })
    }

    /// Establish a connection and start its pumps.
    ///
    /// Blocks until the establisher succeeds; with the default retry policy this never fails.
    pub async fn connect(&self) -> Result<Connection> {
        let inner = &self.inner;
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        inner.state_tx.send_replace(ConnectionState::Connecting);

        let transport = match inner.establisher.establish(&inner.endpoint).await {
            Ok(transport) => transport,
            Err(e) => {
                inner.state_tx.send_if_modified(|state| {
                    inner.publish_closed(generation, state)
                });
                return Err(e);
            }
        };

        let config = &inner.config;
        let (outbound_tx, outbound_rx) = mpsc::channel(config.queue_capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(config.queue_capacity);
        let shutdown = CancellationToken::new();
        let span = info_span!("connection", endpoint = %inner.endpoint);

        let (reader, writer) = transport::split(transport, config.pong_wait, config.write_wait);
        let read_handle = tokio::spawn(
            inbound::run(reader, inbound_tx, shutdown.clone()).instrument(span.clone()),
        );
        let write_handle = tokio::spawn(
            outbound::run(writer, outbound_rx, config.ping_period, shutdown.clone())
                .instrument(span.clone()),
        );

        let active = ConnectionState::Active {
            since: Instant::now(),
        };
        let (state_tx, state_rx) = watch::channel(active);
        inner.state_tx.send_if_modified(|state| {
            let latest = inner.generation.load(Ordering::SeqCst) == generation;
            if latest {
                *state = active;
            }
            latest
        });

        let manager = Arc::clone(inner);
        tokio::spawn(
            async move {
                let (read, write) = tokio::join!(read_handle, write_handle);
                report("inbound", read);
                report("outbound", write);

                manager
                    .state_tx
                    .send_if_modified(|state| manager.publish_closed(generation, state));
                state_tx.send_replace(ConnectionState::Closed);
                info!("connection closed");
            }
            .instrument(span),
        );

        Ok(Connection {
            sender: Sender {
                outbound: outbound_tx,
            },
            inbound: inbound_rx,
            state_rx,
            shutdown,
        })
    }

    /// Endpoint every connection is dialed to.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Validated configuration shared by every connection.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// State of the most recent connection instance.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribe to state changes of the most recent connection instance.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }
}

impl<C> ManagerInner<C> {
    /// Mark `state` closed if `generation` is still the most recent instance.
    fn publish_closed(&self, generation: u64, state: &mut ConnectionState) -> bool {
        // Runs under the watch lock, so a concurrent `connect` either sees Closed or overwrites it
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        *state = ConnectionState::Closed;
        true
    }
}

fn report(direction: &'static str, outcome: std::result::Result<Result<()>, JoinError>) {
    match outcome {
        Ok(Ok(())) => debug!(direction, "pump stopped"),
        Ok(Err(e)) => warn!(direction, error = %e, "pump failed"),
        Err(e) => error!(direction, error = %e, "pump aborted"),
    }
}

/// Cloneable handle onto a connection's outbound queue.
#[derive(Debug, Clone)]
pub struct Sender {
    outbound: mpsc::Sender<Bytes>,
}

impl Sender {
    /// Enqueue `payload`, waiting for queue capacity if necessary.
    pub async fn send<B: Into<Bytes>>(&self, payload: B) -> Result<()> {
        self.outbound
            .send(payload.into())
            .await
            .map_err(|_e| WsError::ConnectionClosed)?;
        Ok(())
    }

    /// Enqueue `payload` without waiting; fails with [`WsError::QueueFull`] when at capacity.
    pub fn try_send<B: Into<Bytes>>(&self, payload: B) -> Result<()> {
        self.outbound
            .try_send(payload.into())
            .map_err(|e| match e {
                TrySendError::Full(_) => WsError::QueueFull,
                TrySendError::Closed(_) => WsError::ConnectionClosed,
            })?;
        Ok(())
    }

    /// Whether the outbound pump has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

/// One established connection: an outbound queue, an inbound queue and its lifecycle state.
///
/// Dropping the connection (and every [`Sender`] cloned from it) closes the outbound queue: the
/// outbound pump flushes what is left, sends a close notification and the connection winds down.
pub struct Connection {
    sender: Sender,
    inbound: mpsc::Receiver<Bytes>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown: CancellationToken,
}

impl Connection {
    /// Enqueue `payload` for the outbound pump, waiting for capacity if the queue is full.
    pub async fn send<B: Into<Bytes>>(&self, payload: B) -> Result<()> {
        self.sender.send(payload).await
    }

    /// Enqueue `payload` without waiting.
    pub fn try_send<B: Into<Bytes>>(&self, payload: B) -> Result<()> {
        self.sender.try_send(payload)
    }

    /// A handle for producing from another task.
    #[must_use]
    pub fn sender(&self) -> Sender {
        self.sender.clone()
    }

    /// Next received payload, or `None` once the connection has closed.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.inbound.recv().await
    }

    /// Received payloads in arrival order; the stream ends when the connection closes.
    pub fn messages(&mut self) -> impl Stream<Item = Bytes> + '_ {
        stream! {
            while let Some(payload) = self.inbound.recv().await {
                yield payload;
            }
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Stop both pumps. Payloads already accepted by [`Connection::send`] are still written,
    /// followed by a close notification; later sends fail.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Wait until both pumps have stopped.
    pub async fn closed(&self) {
        let mut state_rx = self.state_rx.clone();
        // An error means the supervisor is gone, which only happens after Closed
        _ = state_rx.wait_for(|state| state.is_closed()).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::{SinkExt as _, StreamExt as _};
    use tokio::io::DuplexStream;
    use tokio::time::timeout;
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::protocol::Role;

    use super::*;
    use crate::error::Kind;

    /// Connects over an in-memory duplex pipe; the peer half is handed to the test.
    struct PipeConnector {
        peers: mpsc::UnboundedSender<WebSocketStream<DuplexStream>>,
    }

    #[async_trait]
    impl Connector for PipeConnector {
        type Transport = WebSocketStream<DuplexStream>;

        async fn connect(&self, _endpoint: &Url) -> Result<Self::Transport> {
            let (client, server) = tokio::io::duplex(64 * 1024);
            let client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;
            let server = WebSocketStream::from_raw_socket(server, Role::Server, None).await;
            self.peers
                .send(server)
                .map_err(|_e| WsError::ConnectionClosed)?;
            Ok(client)
        }
    }

    fn manager(
        config: Config,
    ) -> (
        ConnectionManager<PipeConnector>,
        mpsc::UnboundedReceiver<WebSocketStream<DuplexStream>>,
    ) {
        let (peers, peer_rx) = mpsc::unbounded_channel();
        let manager =
            ConnectionManager::with_connector("ws://pipe/", config, PipeConnector { peers })
                .unwrap();
        (manager, peer_rx)
    }

    #[test]
    fn rejects_non_websocket_scheme() {
        let err = ConnectionManager::new("http://127.0.0.1:8080", Config::default())
            .err()
            .unwrap();

        assert_eq!(err.kind(), Kind::Validation);
    }

    #[test]
    fn rejects_invalid_heartbeat() {
        let config = Config::builder()
            .ping_period(Duration::from_secs(90))
            .build();

        assert!(ConnectionManager::new("ws://127.0.0.1:8080", config).is_err());
    }

    #[tokio::test]
    async fn payloads_flow_both_ways() {
        let (manager, mut peers) = manager(Config::default());
        let mut connection = manager.connect().await.unwrap();
        let mut peer = peers.recv().await.unwrap();

        assert!(connection.state().is_active());
        assert!(manager.state().is_active());

        connection.send("ping?").await.unwrap();
        let frame = timeout(Duration::from_secs(2), peer.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(frame, Message::Binary(Bytes::from_static(b"ping?")));

        peer.send(Message::text("pong!".to_owned())).await.unwrap();
        let payload = timeout(Duration::from_secs(2), connection.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload, Bytes::from_static(b"pong!"));
    }

    #[tokio::test]
    async fn peer_disconnect_closes_connection() {
        let (manager, mut peers) = manager(Config::default());
        let mut connection = manager.connect().await.unwrap();
        let peer = peers.recv().await.unwrap();

        drop(peer);

        let mut messages = Box::pin(connection.messages());
        let next = timeout(Duration::from_secs(2), messages.next()).await.unwrap();
        assert!(next.is_none());
        drop(messages);

        timeout(Duration::from_secs(2), connection.closed())
            .await
            .unwrap();
        assert!(connection.state().is_closed());
        assert!(manager.state().is_closed());
        assert!(connection.send("too late").await.is_err());
    }

    #[tokio::test]
    async fn close_sends_close_frame() {
        let (manager, mut peers) = manager(Config::default());
        let connection = manager.connect().await.unwrap();
        let mut peer = peers.recv().await.unwrap();

        connection.close();

        let frame = timeout(Duration::from_secs(2), peer.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(matches!(frame, Message::Close(_)));
        timeout(Duration::from_secs(2), connection.closed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn try_send_reports_full_queue() {
        let (outbound, _rx) = mpsc::channel(1);
        let sender = Sender { outbound };

        sender.try_send("first").unwrap();
        let err = sender.try_send("second").unwrap_err();

        assert!(matches!(
            err.downcast_ref::<WsError>(),
            Some(WsError::QueueFull)
        ));
    }

    #[tokio::test]
    async fn try_send_after_close_reports_closed() {
        let (manager, mut peers) = manager(Config::default());
        let connection = manager.connect().await.unwrap();
        let _peer = peers.recv().await.unwrap();
        connection.close();
        connection.closed().await;

        let err = connection.try_send("after close").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WsError>(),
            Some(WsError::ConnectionClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn older_instance_closing_keeps_newer_active() {
        let (manager, mut peers) = manager(Config::default());
        let first = manager.connect().await.unwrap();
        let _first_peer = peers.recv().await.unwrap();
        let second = manager.connect().await.unwrap();
        let _second_peer = peers.recv().await.unwrap();

        first.close();
        first.closed().await;

        assert!(second.state().is_active());
        assert!(manager.state().is_active());

        second.close();
        second.closed().await;
        assert!(manager.state().is_closed());
    }

    #[tokio::test]
    async fn close_flushes_accepted_payloads() {
        let (manager, mut peers) = manager(Config::default());
        let connection = manager.connect().await.unwrap();
        let mut peer = peers.recv().await.unwrap();

        connection.send("a").await.unwrap();
        connection.send("b").await.unwrap();
        connection.close();

        let mut received = Vec::new();
        loop {
            let frame = timeout(Duration::from_secs(2), peer.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            match frame {
                Message::Binary(payload) => received.extend_from_slice(&payload),
                Message::Close(_) => break,
                other => panic!("unexpected frame {other:?}"),
            }
        }

        assert_eq!(received, b"ab");
        timeout(Duration::from_secs(2), connection.closed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reconnect_yields_new_instance() {
        let (manager, mut peers) = manager(Config::default());
        let first = manager.connect().await.unwrap();
        let _first_peer = peers.recv().await.unwrap();
        first.close();
        first.closed().await;
        assert!(manager.state().is_closed());

        let second = manager.connect().await.unwrap();
        let _second_peer = peers.recv().await.unwrap();

        assert!(first.state().is_closed());
        assert!(second.state().is_active());
        assert!(manager.state().is_active());
    }
}
