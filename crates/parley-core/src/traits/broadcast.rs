// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broadcast driver trait for relaying realtime events.
//!
//! Drivers implement [`is_ready`](BroadcastDriver::is_ready) and
//! [`deliver`](BroadcastDriver::deliver). Callers use the `publish_*`
//! methods, which never fail: delivery errors are logged and dropped here.

use async_trait::async_trait;
use chrono::Utc;

use crate::error::ParleyError;
use crate::event::{
    Envelope, MessagePayload, PresencePayload, ReadPayload, RealtimeEvent, TypingPayload,
    conversation_channel,
};
use crate::traits::adapter::PluginAdapter;
use crate::types::{Actor, ConversationId, Message, MessageId, Participant};

/// Pluggable strategy for relaying realtime events to subscribed clients.
#[async_trait]
pub trait BroadcastDriver: PluginAdapter {
    /// Whether the driver can currently deliver anything.
    fn is_ready(&self) -> bool;

    /// Hands one envelope to the transport.
    async fn deliver(&self, envelope: &Envelope) -> Result<(), ParleyError>;

    fn channel_name_for(&self, conversation: ConversationId) -> String {
        conversation_channel(conversation)
    }

    /// Delivers an envelope, logging and swallowing any failure.
    async fn publish(&self, envelope: Envelope) {
        if !self.is_ready() {
            tracing::trace!(
                driver = self.name(),
                event_type = %envelope.event_type(),
                "broadcast driver not ready, skipping publish"
            );
            return;
        }

        if let Err(e) = self.deliver(&envelope).await {
            tracing::warn!(
                driver = self.name(),
                event_type = %envelope.event_type(),
                channel = %envelope.channel,
                conversation_id = ?envelope.conversation_id().map(|c| c.0),
                message_id = ?message_id_of(&envelope.event),
                error = %e,
                "broadcast publish failed"
            );
        }
    }

    async fn publish_message(&self, message: &Message, sender: &Actor) {
        let payload = MessagePayload {
            message: message.clone(),
            sender_name: sender.display_name.clone(),
            time_label: message.created_at.format("%H:%M").to_string(),
        };
        let mut envelope = Envelope::new(RealtimeEvent::Message(payload))
            .with_origin(sender.socket_id.clone());
        envelope.channel = self.channel_name_for(message.conversation_id);
        self.publish(envelope).await;
    }

    async fn publish_typing(&self, conversation: ConversationId, actor: &Actor, is_typing: bool) {
        let payload = TypingPayload {
            conversation_id: conversation,
            user_id: actor.id,
            user_name: actor.display_name.clone(),
            is_typing,
        };
        let mut envelope =
            Envelope::new(RealtimeEvent::Typing(payload)).with_origin(actor.socket_id.clone());
        envelope.channel = self.channel_name_for(conversation);
        self.publish(envelope).await;
    }

    /// Publishes one event covering every id in `message_ids`.
    async fn publish_read(
        &self,
        conversation: ConversationId,
        message_ids: &[MessageId],
        reader_role: Participant,
        reader: &Actor,
    ) {
        let payload = ReadPayload {
            conversation_id: conversation,
            message_ids: message_ids.to_vec(),
            reader_role,
            reader_id: reader.id,
            read_at: Utc::now(),
        };
        let mut envelope =
            Envelope::new(RealtimeEvent::Read(payload)).with_origin(reader.socket_id.clone());
        envelope.channel = self.channel_name_for(conversation);
        self.publish(envelope).await;
    }

    async fn publish_presence(&self, actor: &Actor, is_online: bool) {
        let payload = PresencePayload {
            user_id: actor.id,
            user_name: actor.display_name.clone(),
            is_online,
            at: Utc::now(),
        };
        self.publish(Envelope::new(RealtimeEvent::Presence(payload)))
            .await;
    }
}

fn message_id_of(event: &RealtimeEvent) -> Option<i64> {
    match event {
        RealtimeEvent::Message(p) => Some(p.message.id.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::types::{AdapterType, HealthStatus, MessageBody, Role, UserId};
    use crate::event::EventType;

    struct Spy {
        ready: AtomicBool,
        fail: bool,
        seen: Mutex<Vec<Envelope>>,
    }

    impl Spy {
        fn new(ready: bool, fail: bool) -> Self {
            Self {
                ready: AtomicBool::new(ready),
                fail,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PluginAdapter for Spy {
        fn name(&self) -> &str {
            "spy"
        }
        fn version(&self) -> semver::Version {
            semver::Version::new(0, 1, 0)
        }
        fn adapter_type(&self) -> AdapterType {
            AdapterType::Broadcast
        }
        async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
            Ok(HealthStatus::Healthy)
        }
        async fn shutdown(&self) -> Result<(), ParleyError> {
            Ok(())
        }
    }

    #[async_trait]
    impl BroadcastDriver for Spy {
        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        async fn deliver(&self, envelope: &Envelope) -> Result<(), ParleyError> {
            self.seen.lock().unwrap().push(envelope.clone());
            if self.fail {
                return Err(ParleyError::transport("relay returned 500"));
            }
            Ok(())
        }
    }

    fn sample_message() -> Message {
        Message {
            id: MessageId(12),
            conversation_id: ConversationId(3),
            sender_id: Some(UserId(1)),
            sender_role: Role::Customer,
            body: MessageBody::Text {
                content: "hi".into(),
                booking: None,
            },
            formatted_content: Some("hi".into()),
            read_by_customer_at: None,
            read_by_provider_at: None,
            created_at: "2026-03-01T09:05:00Z".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn unready_driver_delivers_nothing() {
        let spy = Spy::new(false, false);
        let actor = Actor::new(UserId(1), Role::Customer, "Ana");
        spy.publish_message(&sample_message(), &actor).await;
        spy.publish_presence(&actor, true).await;
        assert!(spy.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn message_payload_is_fully_resolved() {
        let spy = Spy::new(true, false);
        let actor = Actor::new(UserId(1), Role::Customer, "Ana").with_socket_id("s-1");
        spy.publish_message(&sample_message(), &actor).await;

        let seen = spy.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].channel, "conversation.3");
        assert_eq!(seen[0].origin_socket.as_deref(), Some("s-1"));
        match &seen[0].event {
            RealtimeEvent::Message(p) => {
                assert_eq!(p.sender_name, "Ana");
                assert_eq!(p.time_label, "09:05");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn delivery_failure_is_logged_and_swallowed() {
        let spy = Spy::new(true, true);
        let actor = Actor::new(UserId(2), Role::Provider, "Bo");
        spy
            .publish_read(ConversationId(3), &[MessageId(1), MessageId(2)], Participant::Provider, &actor)
            .await;

        assert_eq!(spy.seen.lock().unwrap()[0].event_type(), EventType::Read);
        assert!(logs_contain("broadcast publish failed"));
        assert!(logs_contain("relay returned 500"));
    }
}
