// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket transport for the gateway's native driver.
//!
//! One background task owns the connection. It reconnects with capped
//! exponential backoff and re-subscribes every channel after a reconnect.
//! A channel's subscribers hear `Reconnected` only once the gateway has
//! acknowledged that channel again, so a re-fetch triggered by it cannot
//! miss events published in between.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parley_core::{Actor, ClientFrame, Envelope, ParleyError, ServerFrame};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::transport::{EventTransport, SIGNAL_BUFFER, TransportSignal};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Full `ws(s)://.../ws?...` URL including identity query parameters.
    pub url: String,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// How long `subscribe` waits for the gateway to accept a channel.
    pub ack_timeout: Duration,
}

impl WsConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            ack_timeout: Duration::from_secs(10),
        }
    }

    /// `{base}/ws?token=..&user_id=..&role=..&name=..` for `actor`.
    pub fn for_actor(base_url: &str, token: &str, actor: &Actor) -> Result<Self, ParleyError> {
        let mut url = Url::parse(base_url)
            .map_err(|e| ParleyError::Config(format!("invalid gateway URL `{base_url}`: {e}")))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ParleyError::Config(format!(
                "gateway URL `{base_url}` must use ws:// or wss://"
            )));
        }
        url.path_segments_mut()
            .map_err(|_| ParleyError::Config(format!("gateway URL `{base_url}` cannot have a path")))?
            .pop_if_empty()
            .push("ws");
        url.query_pairs_mut()
            .clear()
            .append_pair("token", token)
            .append_pair("user_id", &actor.id.to_string())
            .append_pair("role", &actor.role.to_string())
            .append_pair("name", &actor.display_name);
        Ok(Self::new(url))
    }

    fn backoff(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        let base = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_backoff);
        let jitter_cap = (base.as_millis() as u64 / 10).max(1);
        let jitter = rand::thread_rng().gen_range(0..jitter_cap);
        base + Duration::from_millis(jitter)
    }
}

/// One receiver of a channel's signals.
struct Subscriber {
    tx: mpsc::Sender<TransportSignal>,
    /// A signal was dropped and a `Reconnected` is queued behind the backlog.
    gap: Arc<AtomicBool>,
}

impl Subscriber {
    fn new(tx: mpsc::Sender<TransportSignal>) -> Self {
        Self {
            tx,
            gap: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns `false` once the receiver is gone.
    ///
    /// A full buffer never loses information silently: the subscriber is
    /// owed a `Reconnected`, delivered as soon as it drains.
    fn deliver(&self, signal: TransportSignal) -> bool {
        match self.tx.try_send(signal) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                if !self.gap.swap(true, Ordering::AcqRel) {
                    warn!("subscriber lagging, signals dropped; resync queued");
                    let tx = self.tx.clone();
                    let gap = Arc::clone(&self.gap);
                    tokio::spawn(async move {
                        if tx.send(TransportSignal::Reconnected).await.is_ok() {
                            gap.store(false, Ordering::Release);
                        }
                    });
                }
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

#[derive(Default)]
struct ChannelEntry {
    subscribers: Vec<Subscriber>,
    /// Subscribers were told `Disconnected` and wait for `Reconnected`.
    down: bool,
    /// `subscribe` calls waiting for the gateway's answer.
    waiters: Vec<oneshot::Sender<Result<(), ParleyError>>>,
}

impl ChannelEntry {
    fn broadcast(&mut self, signal: &TransportSignal) {
        self.subscribers.retain(|s| s.deliver(signal.clone()));
    }

    /// Answers every pending `subscribe`; `refusal` fails them.
    fn settle(&mut self, refusal: Option<&str>) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(match refusal {
                None => Ok(()),
                Some(reason) => Err(ParleyError::Forbidden(reason.to_string())),
            });
        }
    }
}

#[derive(Default)]
struct Registry {
    channels: HashMap<String, ChannelEntry>,
    /// Set while an outage has been reported and not yet recovered.
    down: bool,
}

struct Shared {
    registry: Mutex<Registry>,
    outbound: mpsc::UnboundedSender<ClientFrame>,
    socket_id: watch::Sender<Option<String>>,
}

impl Shared {
    async fn channels(&self) -> Vec<String> {
        self.registry.lock().await.channels.keys().cloned().collect()
    }

    /// Registers `tx` for `channel`. Returns a receiver for the gateway's
    /// answer, or `None` when the link is down and the subscriber will hear
    /// `Reconnected` instead.
    async fn add_subscriber(
        &self,
        channel: &str,
        tx: mpsc::Sender<TransportSignal>,
    ) -> Option<oneshot::Receiver<Result<(), ParleyError>>> {
        let mut registry = self.registry.lock().await;
        let outage = registry.down;
        let entry = registry.channels.entry(channel.to_string()).or_default();
        let subscriber = Subscriber::new(tx);
        if outage {
            // Joining during an outage starts with the outage.
            subscriber.deliver(TransportSignal::Disconnected);
            entry.down = true;
            entry.subscribers.push(subscriber);
            return None;
        }
        entry.subscribers.push(subscriber);
        let (ack_tx, ack_rx) = oneshot::channel();
        entry.waiters.push(ack_tx);
        Some(ack_rx)
    }

    /// Drops subscribers whose receiver is gone, and the channel with them.
    async fn forget_closed(&self, channel: &str) {
        let mut registry = self.registry.lock().await;
        if let Some(entry) = registry.channels.get_mut(channel) {
            entry.subscribers.retain(|s| !s.tx.is_closed());
            if entry.subscribers.is_empty() {
                registry.channels.remove(channel);
            }
        }
    }

    /// The link dropped: every channel is down until re-acknowledged.
    async fn mark_down(&self) {
        let mut registry = self.registry.lock().await;
        registry.down = true;
        for entry in registry.channels.values_mut() {
            if !entry.down {
                entry.down = true;
                entry.broadcast(&TransportSignal::Disconnected);
            }
            // Pending subscribers now wait on `Reconnected` like everyone else.
            entry.settle(None);
        }
    }

    /// A socket is up again; channels recover one by one as acks arrive.
    async fn mark_connected(&self) {
        self.registry.lock().await.down = false;
    }

    async fn acknowledged(&self, channel: &str) {
        let mut registry = self.registry.lock().await;
        let Some(entry) = registry.channels.get_mut(channel) else {
            return;
        };
        entry.settle(None);
        if entry.down {
            entry.down = false;
            entry.broadcast(&TransportSignal::Reconnected);
        }
    }

    async fn rejected(&self, channel: &str, message: &str) {
        let mut registry = self.registry.lock().await;
        let Some(entry) = registry.channels.get_mut(channel) else {
            return;
        };
        entry.settle(Some(&format!("subscription to `{channel}` refused: {message}")));
    }

    async fn route(&self, channel: &str, signal: TransportSignal) {
        let mut registry = self.registry.lock().await;
        if let Some(entry) = registry.channels.get_mut(channel) {
            entry.broadcast(&signal);
        }
    }

    async fn handle_text(&self, text: &str) {
        let frame = match serde_json::from_str::<ServerFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "unparseable frame from gateway");
                return;
            }
        };
        match frame {
            ServerFrame::Connected { socket_id } => {
                debug!(%socket_id, "socket id assigned");
                self.socket_id.send_replace(Some(socket_id));
            }
            ServerFrame::Event { channel, event } => {
                let mut envelope = Envelope::new(event);
                envelope.channel = channel.clone();
                self.route(&channel, TransportSignal::Event(envelope)).await;
            }
            ServerFrame::Resync { channel } => {
                warn!(%channel, "gateway dropped events for this socket; resyncing");
                self.route(&channel, TransportSignal::Reconnected).await;
            }
            ServerFrame::Subscribed { channel } => {
                debug!(%channel, "subscribed");
                self.acknowledged(&channel).await;
            }
            ServerFrame::Unsubscribed { channel } => debug!(%channel, "unsubscribed"),
            ServerFrame::Error {
                message,
                channel: Some(channel),
            } => {
                warn!(%channel, %message, "gateway rejected a subscription");
                self.rejected(&channel, &message).await;
            }
            ServerFrame::Error {
                message,
                channel: None,
            } => warn!(%message, "gateway rejected a request"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Cancelled,
    Lost,
}

/// Reconnecting WebSocket client.
pub struct WsTransport {
    shared: Arc<Shared>,
    ack_timeout: Duration,
    cancel: CancellationToken,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl WsTransport {
    /// Spawns the connection task. Returns immediately; connection happens in the background.
    pub fn connect(config: WsConfig) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (socket_id, _) = watch::channel(None);
        let shared = Arc::new(Shared {
            registry: Mutex::new(Registry::default()),
            outbound,
            socket_id,
        });
        let cancel = CancellationToken::new();
        let ack_timeout = config.ack_timeout;
        let task = tokio::spawn(run(
            config,
            Arc::clone(&shared),
            outbound_rx,
            cancel.clone(),
        ));
        Self {
            shared,
            ack_timeout,
            cancel,
            task: std::sync::Mutex::new(Some(task)),
        }
    }

    /// Socket id of the live connection, if any.
    pub fn socket_id(&self) -> Option<String> {
        self.shared.socket_id.borrow().clone()
    }

    pub fn watch_socket_id(&self) -> watch::Receiver<Option<String>> {
        self.shared.socket_id.subscribe()
    }

    /// Closes the connection and waits for the task to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().ok().and_then(|mut t| t.take());
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl EventTransport for WsTransport {
    /// Resolves once the gateway has accepted the channel, or immediately
    /// during an outage (the receiver then starts with `Disconnected`).
    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<mpsc::Receiver<TransportSignal>, ParleyError> {
        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
        let ack = self.shared.add_subscriber(channel, tx).await;
        if self
            .shared
            .outbound
            .send(ClientFrame::Subscribe {
                channel: channel.to_string(),
            })
            .is_err()
        {
            drop(rx);
            self.shared.forget_closed(channel).await;
            return Err(ParleyError::transport("websocket transport is shut down"));
        }

        let Some(ack) = ack else {
            return Ok(rx);
        };
        let outcome = match tokio::time::timeout(self.ack_timeout, ack).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ParleyError::transport("websocket transport is shut down")),
            Err(_) => Err(ParleyError::Timeout {
                duration: self.ack_timeout,
            }),
        };
        match outcome {
            Ok(()) => Ok(rx),
            Err(e) => {
                drop(rx);
                self.shared.forget_closed(channel).await;
                Err(e)
            }
        }
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), ParleyError> {
        self.shared.registry.lock().await.channels.remove(channel);
        self.shared
            .outbound
            .send(ClientFrame::Unsubscribe {
                channel: channel.to_string(),
            })
            .map_err(|_| ParleyError::transport("websocket transport is shut down"))
    }
}

async fn run(
    config: WsConfig,
    shared: Arc<Shared>,
    mut outbound_rx: mpsc::UnboundedReceiver<ClientFrame>,
    cancel: CancellationToken,
) {
    let mut failures = 0u32;
    let mut reported_down = false;

    loop {
        let attempt = tokio::select! {
            _ = cancel.cancelled() => break,
            result = tokio_tungstenite::connect_async(config.url.as_str()) => result,
        };

        let delay = match attempt {
            Ok((socket, _)) => {
                failures = 0;
                info!("websocket connected");
                if reported_down {
                    reported_down = false;
                    shared.mark_connected().await;
                }

                let end = session(socket, &shared, &mut outbound_rx, &cancel).await;
                shared.socket_id.send_replace(None);
                if end == SessionEnd::Cancelled {
                    break;
                }
                warn!("websocket connection lost");
                config.initial_backoff
            }
            Err(e) => {
                failures += 1;
                let delay = config.backoff(failures);
                warn!(
                    error = %e,
                    attempt = failures,
                    retry_in_ms = delay.as_millis() as u64,
                    "websocket connect failed"
                );
                delay
            }
        };

        if !reported_down {
            reported_down = true;
            shared.mark_down().await;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    debug!("websocket transport stopped");
}

async fn session(
    socket: Socket,
    shared: &Shared,
    outbound_rx: &mut mpsc::UnboundedReceiver<ClientFrame>,
    cancel: &CancellationToken,
) -> SessionEnd {
    let (mut sink, mut stream) = socket.split();

    // Frames queued while offline are superseded by the full re-subscribe below.
    while outbound_rx.try_recv().is_ok() {}
    for channel in shared.channels().await {
        if send_frame(&mut sink, &ClientFrame::Subscribe { channel })
            .await
            .is_err()
        {
            return SessionEnd::Lost;
        }
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(WsMessage::Close(None)).await;
                return SessionEnd::Cancelled;
            }
            Some(frame) = outbound_rx.recv() => {
                if send_frame(&mut sink, &frame).await.is_err() {
                    return SessionEnd::Lost;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => shared.handle_text(text.as_str()).await,
                Some(Ok(WsMessage::Close(_))) | None => return SessionEnd::Lost,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "websocket read failed");
                    return SessionEnd::Lost;
                }
            }
        }
    }
}

async fn send_frame<S>(sink: &mut S, frame: &ClientFrame) -> Result<(), ParleyError>
where
    S: futures::Sink<WsMessage> + Unpin,
{
    let text = serde_json::to_string(frame)
        .map_err(|e| ParleyError::Internal(format!("failed to encode frame: {e}")))?;
    sink.send(WsMessage::Text(text.into()))
        .await
        .map_err(|_| ParleyError::transport("websocket send failed"))
}
