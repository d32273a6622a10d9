// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket endpoint serving the native driver's channel hub.
//!
//! Client -> Server (JSON):
//! ```json
//! {"action": "subscribe", "channel": "conversation.12"}
//! {"action": "unsubscribe", "channel": "conversation.12"}
//! ```
//!
//! Server -> Client (JSON):
//! ```json
//! {"type": "connected", "socket_id": "..."}
//! {"type": "subscribed", "channel": "conversation.12"}
//! {"type": "event", "channel": "conversation.12", "event": {"type": "message", "payload": {...}}}
//! {"type": "resync", "channel": "conversation.12"}
//! {"type": "error", "message": "...", "channel": "conversation.12"}
//! ```
//!
//! Conversation channels require participation; `presence` is open to every
//! authenticated socket. Events caused by this socket are not echoed back.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use parley_broadcast::ChannelHub;
use parley_core::{
    Actor, ClientFrame, Envelope, PRESENCE_CHANNEL, ParleyError, ServerFrame,
    parse_conversation_channel,
};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::auth::actor_from_parts;
use crate::error::ApiError;
use crate::server::{GatewayState, SocketInfo};

/// Frames queued per socket before hub forwarding waits.
const OUTBOUND_BUFFER: usize = 256;

/// Handshake query string: `/ws?token=&user_id=&role=&name=`.
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// WebSocket upgrade handler.
///
/// Rejects the handshake before upgrading when the native driver is not in
/// use or the token/identity is invalid.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    Query(query): Query<WsQuery>,
) -> Result<Response, ApiError> {
    let Some(hub) = state.hub.clone() else {
        return Err(ParleyError::not_found("route", "/ws").into());
    };
    state.auth.verify(query.token.as_deref())?;
    let actor = actor_from_parts(
        query.user_id.as_deref(),
        query.role.as_deref(),
        query.name.as_deref(),
        None,
    )?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, hub, actor)))
}

/// Handle an individual WebSocket connection.
///
/// One task writes queued frames to the socket; the receive loop below
/// handles subscribe/unsubscribe requests; one forwarder task per subscribed
/// channel copies hub envelopes into the outbound queue.
async fn handle_socket(socket: WebSocket, state: GatewayState, hub: Arc<ChannelHub>, actor: Actor) {
    let socket_id = uuid::Uuid::new_v4().to_string();
    let actor = actor.with_socket_id(socket_id.clone());
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<ServerFrame>(OUTBOUND_BUFFER);
    let sender_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("failed to encode WebSocket frame: {e}");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    state.sockets.insert(
        socket_id.clone(),
        SocketInfo {
            user_id: actor.id,
            connected_at: Instant::now(),
        },
    );
    let _ = tx
        .send(ServerFrame::Connected {
            socket_id: socket_id.clone(),
        })
        .await;
    tracing::info!(%socket_id, user_id = actor.id.0, "websocket connected");
    announce_presence(&state, &actor, true).await;

    let mut session = Session {
        state: &state,
        hub: &hub,
        actor: &actor,
        tx,
        forwarders: HashMap::new(),
    };
    while let Some(Ok(msg)) = ws_receiver.next().await {
        match msg {
            Message::Text(text) => session.handle_text(text.as_str()).await,
            Message::Close(_) => break,
            _ => {} // Ignore binary, ping (handled by the protocol layer)
        }
    }

    // Cleanup.
    session.close();
    sender_task.abort();
    state.sockets.remove(&socket_id);
    announce_presence(&state, &actor, false).await;
    hub.prune();
    tracing::info!(%socket_id, user_id = actor.id.0, "websocket disconnected");
}

async fn announce_presence(state: &GatewayState, actor: &Actor, is_online: bool) {
    if actor.role.participant().is_none() {
        return;
    }
    if let Err(e) = state.engine.presence.set_presence(actor, is_online).await {
        tracing::debug!(user_id = actor.id.0, error = %e, "presence not announced");
    }
}

struct Session<'a> {
    state: &'a GatewayState,
    hub: &'a ChannelHub,
    actor: &'a Actor,
    tx: mpsc::Sender<ServerFrame>,
    forwarders: HashMap<String, JoinHandle<()>>,
}

impl Session<'_> {
    async fn handle_text(&mut self, text: &str) {
        let frame = match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("invalid WebSocket frame: {e}");
                self.reply(ServerFrame::Error {
                    message: format!("invalid frame: {e}"),
                    channel: None,
                })
                .await;
                return;
            }
        };

        match frame {
            ClientFrame::Subscribe { channel } => self.subscribe(channel).await,
            ClientFrame::Unsubscribe { channel } => {
                if let Some(task) = self.forwarders.remove(&channel) {
                    task.abort();
                }
                self.reply(ServerFrame::Unsubscribed { channel }).await;
            }
        }
    }

    async fn subscribe(&mut self, channel: String) {
        if self.forwarders.contains_key(&channel) {
            self.reply(ServerFrame::Subscribed { channel }).await;
            return;
        }
        if let Err(e) = self.authorize(&channel).await {
            tracing::debug!(%channel, user_id = self.actor.id.0, error = %e, "subscription refused");
            let message = if e.is_storage() {
                "subscription failed".to_string()
            } else {
                e.to_string()
            };
            self.reply(ServerFrame::Error {
                message,
                channel: Some(channel),
            })
            .await;
            return;
        }

        let receiver = self.hub.subscribe(&channel);
        let own_socket = self.actor.socket_id.clone().unwrap_or_default();
        let task = spawn_forwarder(receiver, channel.clone(), own_socket, self.tx.clone());
        self.forwarders.insert(channel.clone(), task);
        self.reply(ServerFrame::Subscribed { channel }).await;
    }

    async fn authorize(&self, channel: &str) -> Result<(), ParleyError> {
        if channel == PRESENCE_CHANNEL {
            return Ok(());
        }
        let id = parse_conversation_channel(channel).ok_or_else(|| {
            ParleyError::validation("channel", format!("unknown channel `{channel}`"))
        })?;
        self.state
            .engine
            .conversations
            .require_participant(self.actor, id)
            .await
            .map(|_| ())
    }

    async fn reply(&self, frame: ServerFrame) {
        let _ = self.tx.send(frame).await;
    }

    fn close(&mut self) {
        for (_, task) in self.forwarders.drain() {
            task.abort();
        }
    }
}

/// Copies hub envelopes for `channel` into the socket's outbound queue.
///
/// A lagging receiver has lost events for good, so the client is told to
/// re-fetch instead.
fn spawn_forwarder(
    mut receiver: broadcast::Receiver<Envelope>,
    channel: String,
    own_socket: String,
    tx: mpsc::Sender<ServerFrame>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(envelope) => {
                    if envelope.origin_socket.as_deref() == Some(own_socket.as_str()) {
                        continue;
                    }
                    let frame = ServerFrame::Event {
                        channel: envelope.channel,
                        event: envelope.event,
                    };
                    if tx.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(%channel, skipped, "websocket lagging behind hub, asking client to resync");
                    let frame = ServerFrame::Resync {
                        channel: channel.clone(),
                    };
                    if tx.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
