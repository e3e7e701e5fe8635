//! Outbound WebSocket connector and session multiplexer
//!
//! Dials the broker and carries every session opened by it over the one
//! connection. Frames are demultiplexed by session key into per-session
//! queues; everything going back out passes through a single writer task.

use std::collections::HashMap;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use hl_core::config::{AgentConfig, KeepaliveConfig, QueueConfig};
use hl_core::error::ConnectionError;
use hl_core::request::request_path;
use hl_protocol::{Message, MessageType, SessionKey, MESSAGE_SEPARATOR};

use super::reconnect::ExponentialBackoff;
use super::router::HandlerTable;
use super::watchdog::KeepaliveWatchdog;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = futures::stream::SplitSink<WsStream, WsMessage>;

/// Why a connection ended without an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Broker sent a close frame
    ClosedByBroker(Option<String>),
    /// Stream ended without a close frame
    StreamEnded,
}

/// Establishes the outbound connection to the broker
pub struct TunnelConnector {
    /// Agent configuration
    config: AgentConfig,
    /// Routing table shared by every connection
    handlers: Arc<HandlerTable>,
}

impl TunnelConnector {
    /// Create a connector
    pub fn new(config: AgentConfig, handlers: Arc<HandlerTable>) -> Self {
        Self { config, handlers }
    }

    /// Connect to the broker, retrying with backoff.
    ///
    /// Only an unusable broker URL is returned as an error; every other
    /// failure is retried. The backoff is reset once a connection is made.
    pub async fn connect_with_retry(
        &self,
        backoff: &mut ExponentialBackoff,
    ) -> Result<ActiveTunnel, ConnectionError> {
        loop {
            match self.try_connect().await {
                Ok(tunnel) => {
                    tracing::info!("Connected to broker at {}", self.config.proxy_url);
                    backoff.reset();
                    return Ok(tunnel);
                }
                Err(e @ ConnectionError::InvalidUrl { .. }) => return Err(e),
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::warn!("Connection failed: {}. Retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Attempt a single connection to the broker
    pub async fn try_connect(&self) -> Result<ActiveTunnel, ConnectionError> {
        let url = self.config.connect_url()?;

        tracing::debug!("Connecting to {}", self.config.proxy_url);
        let (ws, _response) = tokio::time::timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await
        .map_err(|_| ConnectionError::Timeout(self.config.proxy_url.clone()))?
        .map_err(|e| ConnectionError::WebSocket(e.to_string()))?;

        Ok(ActiveTunnel::new(
            ws,
            Arc::clone(&self.handlers),
            self.config.keepalive.clone(),
            self.config.queues.clone(),
        ))
    }
}

/// An established broker connection, ready to serve sessions
pub struct ActiveTunnel {
    ws: WsStream,
    handlers: Arc<HandlerTable>,
    keepalive: KeepaliveConfig,
    queues: QueueConfig,
}

impl ActiveTunnel {
    /// Wrap an established WebSocket
    pub fn new(
        ws: WsStream,
        handlers: Arc<HandlerTable>,
        keepalive: KeepaliveConfig,
        queues: QueueConfig,
    ) -> Self {
        Self {
            ws,
            handlers,
            keepalive,
            queues,
        }
    }

    /// Serve sessions until the connection ends.
    ///
    /// On return every session's inbound queue has been closed and the
    /// writer has stopped; handlers still running see end-of-stream and
    /// failed sends and unwind on their own.
    pub async fn run(self) -> Result<DisconnectReason, ConnectionError> {
        let (sink, mut stream) = self.ws.split();
        let cancel = CancellationToken::new();
        let (outbound_tx, outbound_rx) = mpsc::channel(self.queues.outbound_capacity.max(1));

        let writer = tokio::spawn(write_loop(
            sink,
            outbound_rx,
            self.keepalive.ping_interval,
            cancel.clone(),
        ));

        let watchdog = Arc::new(KeepaliveWatchdog::new(self.keepalive.max_wait));
        let watcher = {
            let watchdog = Arc::clone(&watchdog);
            let cancel = cancel.clone();
            let check_interval = self.keepalive.check_interval;
            tokio::spawn(async move { watchdog.watch(check_interval, &cancel).await })
        };

        let mut mux = SessionMux {
            handlers: self.handlers,
            inbound_capacity: self.queues.inbound_capacity.max(1),
            outbound: outbound_tx,
            sessions: HashMap::new(),
            cancel: cancel.clone(),
        };
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<SessionKey>();

        let ended: Option<Result<DisconnectReason, ConnectionError>> = loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => break None,
                Some(key) = done_rx.recv() => {
                    mux.sessions.remove(&key);
                    continue;
                }
                frame = stream.next() => frame,
            };

            match frame {
                None => break Some(Ok(DisconnectReason::StreamEnded)),
                Some(Err(e)) => break Some(Err(ConnectionError::WebSocket(e.to_string()))),
                Some(Ok(WsMessage::Text(text))) => mux.dispatch(&text, &done_tx).await,
                Some(Ok(WsMessage::Pong(_))) => watchdog.touch(),
                Some(Ok(WsMessage::Close(frame))) => {
                    let reason = frame.map(|f| f.reason.to_string());
                    break Some(Ok(DisconnectReason::ClosedByBroker(reason)));
                }
                Some(Ok(other)) => {
                    tracing::trace!("Ignoring frame: {:?}", other);
                }
            }
        };

        cancel.cancel();
        let open = mux.sessions.len();
        drop(mux);
        if open > 0 {
            tracing::info!("Closing {} open session(s)", open);
        }

        let silence = watcher.await.ok().flatten();
        let written = writer.await;

        if let Some(silence) = silence {
            return Err(ConnectionError::KeepaliveTimeout(silence));
        }
        match (ended, written) {
            (Some(Err(e)), _) => Err(e),
            (_, Ok(Err(e))) => Err(e),
            (Some(Ok(reason)), _) => Ok(reason),
            (None, Ok(Ok(()))) => Ok(DisconnectReason::StreamEnded),
            (None, Err(e)) => Err(ConnectionError::WebSocket(format!("writer task failed: {}", e))),
        }
    }
}

/// Per-connection session state owned by the reader loop
struct SessionMux {
    handlers: Arc<HandlerTable>,
    inbound_capacity: usize,
    outbound: mpsc::Sender<Message>,
    sessions: HashMap<SessionKey, mpsc::Sender<String>>,
    cancel: CancellationToken,
}

impl SessionMux {
    async fn dispatch(&mut self, text: &str, done: &mpsc::UnboundedSender<SessionKey>) {
        let message = match Message::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Undecodable frame: {}", e);
                self.abandon(text).await;
                return;
            }
        };

        match message.message_type {
            MessageType::Open => self.open(message.key, message.body, done).await,
            MessageType::Data => self.deliver(message.key, message.body).await,
            MessageType::Close => {
                if self.sessions.remove(&message.key).is_some() {
                    tracing::debug!(key = %message.key, "Session closed by broker");
                }
            }
        }
    }

    async fn open(
        &mut self,
        key: SessionKey,
        initial_message: String,
        done: &mpsc::UnboundedSender<SessionKey>,
    ) {
        if self.sessions.contains_key(&key) {
            tracing::warn!(key = %key, "Ignoring open for a session that is already open");
            return;
        }

        let handler = match request_path(&initial_message) {
            Ok(path) => self.handlers.lookup(&path).cloned(),
            Err(e) => {
                tracing::warn!(key = %key, "Bad open message: {}", e);
                None
            }
        };
        let Some(handler) = handler else {
            tracing::warn!(key = %key, message = %initial_message, "No handler for session");
            self.reply_close(key).await;
            return;
        };

        tracing::debug!(key = %key, message = %initial_message, "Session opened");
        let (inbound_tx, inbound_rx) = mpsc::channel(self.inbound_capacity);
        self.sessions.insert(key.clone(), inbound_tx);

        let outbound = self.outbound.clone();
        let done = done.clone();
        tokio::spawn(async move {
            handler
                .handle(key.clone(), initial_message, inbound_rx, outbound.clone())
                .await;
            if outbound.send(Message::close(key.clone())).await.is_err() {
                tracing::debug!(key = %key, "Connection gone before close was sent");
            }
            let _ = done.send(key);
        });
    }

    async fn deliver(&mut self, key: SessionKey, body: String) {
        let Some(inbound) = self.sessions.get(&key).cloned() else {
            tracing::debug!(key = %key, "Data for unknown session");
            self.reply_close(key).await;
            return;
        };

        tokio::select! {
            _ = self.cancel.cancelled() => {}
            sent = inbound.send(body) => {
                if sent.is_err() {
                    tracing::debug!(key = %key, "Handler already finished, dropping data");
                    self.sessions.remove(&key);
                }
            }
        }
    }

    /// Close whatever session an undecodable frame was addressed to.
    ///
    /// A live session is ended by closing its queue, and its handler's
    /// return sends the close. Otherwise the close is sent here.
    async fn abandon(&mut self, text: &str) {
        let Some((key, _)) = text.split_once(MESSAGE_SEPARATOR) else {
            return;
        };
        if key.is_empty() {
            return;
        }

        let key = SessionKey::from(key);
        if self.sessions.remove(&key).is_some() {
            tracing::debug!(key = %key, "Ending session after an undecodable frame");
        } else {
            self.reply_close(key).await;
        }
    }

    async fn reply_close(&self, key: SessionKey) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = self.outbound.send(Message::close(key)) => {}
        }
    }
}

/// Owns the sink: serializes outbound messages and sends pings
async fn write_loop(
    mut sink: WsSink,
    mut outbound: mpsc::Receiver<Message>,
    ping_interval: std::time::Duration,
    cancel: CancellationToken,
) -> Result<(), ConnectionError> {
    let mut ping = tokio::time::interval(ping_interval);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let result = loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(()),
            message = outbound.recv() => match message {
                Some(message) => {
                    tracing::trace!(key = %message.key, kind = message.message_type.as_str(), "Writing frame");
                    WsMessage::Text(message.format())
                }
                None => break Ok(()),
            },
            _ = ping.tick() => WsMessage::Ping(Vec::new()),
        };

        if let Err(e) = sink.send(frame).await {
            tracing::warn!("WebSocket write failed: {}", e);
            cancel.cancel();
            break Err(ConnectionError::WebSocket(e.to_string()));
        }
    };

    let _ = sink.close().await;
    result
}
