// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process channel hub behind the native driver.
//!
//! One `tokio::sync::broadcast` sender per channel name. WebSocket sessions
//! subscribe per channel; the driver publishes into the matching sender.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use parley_core::Envelope;
use tokio::sync::broadcast;
use tracing::debug;

/// Fan-out point between the native driver and socket sessions.
pub struct ChannelHub {
    channels: DashMap<String, broadcast::Sender<Envelope>>,
    capacity: usize,
    /// Number of running socket layers serving this hub.
    attached: AtomicUsize,
}

impl ChannelHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
            attached: AtomicUsize::new(0),
        }
    }

    /// Marks a socket layer as serving this hub. Pair with [`detach`](Self::detach).
    pub fn attach(&self) {
        self.attached.fetch_add(1, Ordering::SeqCst);
    }

    pub fn detach(&self) {
        let _ = self
            .attached
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst) > 0
    }

    /// Receiver for everything published on `channel` from now on.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<Envelope> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Sends the envelope to its channel and returns how many receivers got it.
    pub fn publish(&self, envelope: &Envelope) -> usize {
        let Some(sender) = self.channels.get(&envelope.channel) else {
            return 0;
        };
        match sender.send(envelope.clone()) {
            Ok(n) => n,
            Err(_) => {
                drop(sender);
                self.channels
                    .remove_if(&envelope.channel, |_, s| s.receiver_count() == 0);
                0
            }
        }
    }

    /// Drops channels nobody listens to any more.
    pub fn prune(&self) -> usize {
        let before = self.channels.len();
        self.channels.retain(|_, s| s.receiver_count() > 0);
        let removed = before - self.channels.len();
        if removed > 0 {
            debug!(removed, "pruned idle hub channels");
        }
        removed
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Live receivers on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for ChannelHub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{ConversationId, RealtimeEvent, TypingPayload, UserId};

    fn typing(conv: i64) -> Envelope {
        Envelope::new(RealtimeEvent::Typing(TypingPayload {
            conversation_id: ConversationId(conv),
            user_id: UserId(1),
            user_name: "Ana".into(),
            is_typing: true,
        }))
    }

    #[tokio::test]
    async fn publish_reaches_only_matching_channel() {
        let hub = ChannelHub::new(8);
        let mut one = hub.subscribe("conversation.1");
        let mut two = hub.subscribe("conversation.2");

        assert_eq!(hub.publish(&typing(1)), 1);
        let got = one.recv().await.unwrap();
        assert_eq!(got.channel, "conversation.1");
        assert!(two.try_recv().is_err());
    }

    #[test]
    fn publish_without_subscribers_is_dropped() {
        let hub = ChannelHub::new(8);
        assert_eq!(hub.publish(&typing(5)), 0);

        let rx = hub.subscribe("conversation.5");
        drop(rx);
        assert_eq!(hub.publish(&typing(5)), 0);
        assert_eq!(hub.channel_count(), 0);
    }

    #[test]
    fn attach_counts_layers() {
        let hub = ChannelHub::default();
        assert!(!hub.is_attached());
        hub.attach();
        hub.attach();
        hub.detach();
        assert!(hub.is_attached());
        hub.detach();
        hub.detach();
        assert!(!hub.is_attached());
    }

    #[test]
    fn prune_removes_idle_channels() {
        let hub = ChannelHub::new(4);
        let _kept = hub.subscribe("conversation.1");
        drop(hub.subscribe("conversation.2"));
        assert_eq!(hub.prune(), 1);
        assert_eq!(hub.channel_count(), 1);
        assert_eq!(hub.subscriber_count("conversation.1"), 1);
        assert_eq!(hub.subscriber_count("conversation.2"), 0);
    }
}
