// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live view of one conversation.
//!
//! A subscription is an explicit object: register callbacks with
//! [`on_update`](ConversationSubscription::on_update), then
//! [`open`](ConversationSubscription::open) and eventually
//! [`close`](ConversationSubscription::close).
//!
//! All work for one conversation happens on a single task: transport
//! signals, fetches and typing expiry are handled one at a time, so the
//! thread state needs no locking beyond the snapshot handed to readers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use parley_config::model::TypingConfig;
use parley_core::{
    ConversationId, Envelope, Message, MessageId, PRESENCE_CHANNEL, ParleyError, Participant,
    PresencePayload, RealtimeEvent, UserId, conversation_channel,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::thread::{ThreadState, TypingSet, TypingUser};
use crate::transport::{EventTransport, TransportSignal};

/// Source of persisted messages for the initial fetch and backfill.
#[async_trait]
pub trait MessageFeed: Send + Sync + 'static {
    /// The newest `limit` messages, oldest first.
    async fn fetch_recent(
        &self,
        conversation: ConversationId,
        limit: u32,
    ) -> Result<Vec<Message>, ParleyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribing,
    Subscribed,
}

/// Delivered to every registered callback, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionUpdate {
    StateChanged(SubscriptionState),
    /// Full thread after the initial fetch or a resync.
    Snapshot(Vec<Message>),
    /// A message id seen for the first time. Hook for scrolling to the latest message.
    MessageAppended(Message),
    MessagesRead {
        message_ids: Vec<MessageId>,
        reader_role: Participant,
    },
    /// Who is typing now, excluding the viewer.
    TypingChanged(Vec<TypingUser>),
    Presence(PresencePayload),
}

type Callback = Arc<dyn Fn(&SubscriptionUpdate) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct SubscriptionOptions {
    pub typing_window: Duration,
    /// Messages fetched on subscribe and on every resync.
    pub fetch_limit: u32,
    /// Also listen on the global presence channel.
    pub include_presence: bool,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self::from_typing(&TypingConfig::default())
    }
}

impl SubscriptionOptions {
    pub fn from_typing(config: &TypingConfig) -> Self {
        Self {
            typing_window: Duration::from_millis(config.expiry_ms),
            fetch_limit: 50,
            include_presence: false,
        }
    }
}

pub struct ConversationSubscription {
    conversation: ConversationId,
    viewer: UserId,
    transport: Arc<dyn EventTransport>,
    feed: Arc<dyn MessageFeed>,
    options: SubscriptionOptions,
    callbacks: Arc<Mutex<Vec<Callback>>>,
    state: Arc<Mutex<SubscriptionState>>,
    snapshot: Arc<Mutex<ThreadState>>,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl ConversationSubscription {
    pub fn new(
        conversation: ConversationId,
        viewer: UserId,
        transport: Arc<dyn EventTransport>,
        feed: Arc<dyn MessageFeed>,
        options: SubscriptionOptions,
    ) -> Self {
        Self {
            conversation,
            viewer,
            transport,
            feed,
            options,
            callbacks: Arc::new(Mutex::new(Vec::new())),
            state: Arc::new(Mutex::new(SubscriptionState::Unsubscribed)),
            snapshot: Arc::new(Mutex::new(ThreadState::default())),
            cancel: None,
            task: None,
        }
    }

    /// Registers a callback. Callbacks run on the subscription task and must not block.
    pub fn on_update<F>(&self, callback: F)
    where
        F: Fn(&SubscriptionUpdate) + Send + Sync + 'static,
    {
        if let Ok(mut callbacks) = self.callbacks.lock() {
            callbacks.push(Arc::new(callback));
        }
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(SubscriptionState::Unsubscribed)
    }

    /// Messages known locally, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.snapshot
            .lock()
            .map(|t| t.messages())
            .unwrap_or_default()
    }

    pub fn channel(&self) -> String {
        conversation_channel(self.conversation)
    }

    /// Subscribes the transport and starts the event loop. A no-op when already open.
    pub async fn open(&mut self) -> Result<(), ParleyError> {
        if self.state() != SubscriptionState::Unsubscribed {
            return Ok(());
        }
        let ctx = self.context();
        ctx.set_state(SubscriptionState::Subscribing);

        let channel = self.channel();
        let events = match self.transport.subscribe(&channel).await {
            Ok(rx) => rx,
            Err(e) => {
                ctx.set_state(SubscriptionState::Unsubscribed);
                return Err(e);
            }
        };
        let presence = if self.options.include_presence {
            match self.transport.subscribe(PRESENCE_CHANNEL).await {
                Ok(rx) => Some(rx),
                Err(e) => {
                    warn!(error = %e, "presence subscription failed");
                    None
                }
            }
        } else {
            None
        };

        let cancel = CancellationToken::new();
        ctx.set_state(SubscriptionState::Subscribed);
        self.task = Some(tokio::spawn(run_loop(ctx, events, presence, cancel.clone())));
        self.cancel = Some(cancel);
        debug!(conversation_id = self.conversation.0, "subscription opened");
        Ok(())
    }

    /// Stops the loop, unsubscribes the transport and drops pending typing timers.
    pub async fn close(&mut self) -> Result<(), ParleyError> {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        if self.state() == SubscriptionState::Unsubscribed {
            return Ok(());
        }

        let result = self.transport.unsubscribe(&self.channel()).await;
        if self.options.include_presence {
            let _ = self.transport.unsubscribe(PRESENCE_CHANNEL).await;
        }
        self.context().set_state(SubscriptionState::Unsubscribed);
        debug!(conversation_id = self.conversation.0, "subscription closed");
        result
    }

    fn context(&self) -> LoopContext {
        LoopContext {
            conversation: self.conversation,
            viewer: self.viewer,
            feed: Arc::clone(&self.feed),
            fetch_limit: self.options.fetch_limit,
            typing_window: self.options.typing_window,
            callbacks: Arc::clone(&self.callbacks),
            state: Arc::clone(&self.state),
            snapshot: Arc::clone(&self.snapshot),
        }
    }
}

impl Drop for ConversationSubscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

struct LoopContext {
    conversation: ConversationId,
    viewer: UserId,
    feed: Arc<dyn MessageFeed>,
    fetch_limit: u32,
    typing_window: Duration,
    callbacks: Arc<Mutex<Vec<Callback>>>,
    state: Arc<Mutex<SubscriptionState>>,
    snapshot: Arc<Mutex<ThreadState>>,
}

impl LoopContext {
    fn emit(&self, update: SubscriptionUpdate) {
        let callbacks: Vec<Callback> = match self.callbacks.lock() {
            Ok(c) => c.clone(),
            Err(_) => return,
        };
        for callback in callbacks {
            callback(&update);
        }
    }

    fn set_state(&self, next: SubscriptionState) {
        let changed = match self.state.lock() {
            Ok(mut state) if *state != next => {
                *state = next;
                true
            }
            _ => false,
        };
        if changed {
            self.emit(SubscriptionUpdate::StateChanged(next));
        }
    }

    fn publish_snapshot(&self, thread: &ThreadState) {
        if let Ok(mut snapshot) = self.snapshot.lock() {
            *snapshot = thread.clone();
        }
    }

    /// Fetches recent messages and merges them by id.
    async fn resync(&self, thread: &mut ThreadState) {
        match self
            .feed
            .fetch_recent(self.conversation, self.fetch_limit)
            .await
        {
            Ok(batch) => {
                thread.merge(batch);
                self.publish_snapshot(thread);
                self.emit(SubscriptionUpdate::Snapshot(thread.messages()));
            }
            Err(e) => {
                warn!(
                    conversation_id = self.conversation.0,
                    error = %e,
                    "message fetch failed, will retry on reconnect"
                );
            }
        }
    }

    fn handle_event(
        &self,
        envelope: Envelope,
        thread: &mut ThreadState,
        typing: &mut TypingSet,
    ) {
        match envelope.event {
            RealtimeEvent::Message(payload) => {
                if payload.message.conversation_id != self.conversation {
                    return;
                }
                let message = payload.message;
                // A message from someone clears their typing indicator.
                if let Some(sender) = message.sender_id
                    && typing.remove(sender)
                {
                    self.emit(SubscriptionUpdate::TypingChanged(typing.users()));
                }
                let appended = thread.apply_message(message.clone());
                self.publish_snapshot(thread);
                if appended {
                    self.emit(SubscriptionUpdate::MessageAppended(message));
                }
            }
            RealtimeEvent::Read(payload) => {
                if payload.conversation_id != self.conversation {
                    return;
                }
                let changed =
                    thread.apply_read(&payload.message_ids, payload.reader_role, payload.read_at);
                if !changed.is_empty() {
                    self.publish_snapshot(thread);
                    self.emit(SubscriptionUpdate::MessagesRead {
                        message_ids: changed,
                        reader_role: payload.reader_role,
                    });
                }
            }
            RealtimeEvent::Typing(payload) => {
                if payload.conversation_id != self.conversation || payload.user_id == self.viewer {
                    return;
                }
                if typing.apply(&payload, Instant::now()) {
                    self.emit(SubscriptionUpdate::TypingChanged(typing.users()));
                }
            }
            RealtimeEvent::Presence(payload) => {
                self.emit(SubscriptionUpdate::Presence(payload));
            }
        }
    }
}

async fn recv_optional(
    rx: &mut Option<mpsc::Receiver<TransportSignal>>,
) -> Option<TransportSignal> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_optional(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run_loop(
    ctx: LoopContext,
    mut events: mpsc::Receiver<TransportSignal>,
    mut presence: Option<mpsc::Receiver<TransportSignal>>,
    cancel: CancellationToken,
) {
    let mut thread = ThreadState::default();
    let mut typing = TypingSet::new(ctx.typing_window);

    // Entering Subscribed: full fetch of recent messages.
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = ctx.resync(&mut thread) => {}
    }

    loop {
        let deadline = typing.next_deadline();
        tokio::select! {
            _ = cancel.cancelled() => break,
            signal = events.recv() => match signal {
                Some(TransportSignal::Event(envelope)) => {
                    ctx.handle_event(envelope, &mut thread, &mut typing);
                }
                Some(TransportSignal::Disconnected) => {
                    debug!(conversation_id = ctx.conversation.0, "transport disconnected");
                    if typing.clear() {
                        ctx.emit(SubscriptionUpdate::TypingChanged(Vec::new()));
                    }
                }
                Some(TransportSignal::Reconnected) => {
                    debug!(conversation_id = ctx.conversation.0, "transport reconnected, resyncing");
                    ctx.resync(&mut thread).await;
                }
                None => {
                    debug!(conversation_id = ctx.conversation.0, "transport closed the channel");
                    break;
                }
            },
            Some(signal) = recv_optional(&mut presence) => {
                if let TransportSignal::Event(envelope) = signal
                    && let RealtimeEvent::Presence(payload) = envelope.event
                {
                    ctx.emit(SubscriptionUpdate::Presence(payload));
                }
            }
            _ = sleep_until_optional(deadline) => {
                if typing.expire(Instant::now()) {
                    ctx.emit(SubscriptionUpdate::TypingChanged(typing.users()));
                }
            }
        }
    }
}
