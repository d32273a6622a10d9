// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message service: validate, persist, then publish.
//!
//! Persistence errors propagate to the caller. Broadcast is best-effort and
//! never turns a stored message into a failed send.

use std::sync::Arc;

use chrono::Utc;
use parley_config::model::{MessagingConfig, ParleyConfig};
use parley_core::{
    ActionButton, Actor, BookingRef, BroadcastDriver, ConversationId, Message, MessageBody,
    MessageId, MessagePage, NewMessage, PageRequest, ParleyError, Role,
};
use tracing::{debug, info};

use crate::attachments::{AttachmentPolicy, AttachmentUpload};
use crate::format::format_content;
use crate::resolver::ConversationResolver;
use crate::validate;

pub struct MessageService {
    resolver: ConversationResolver,
    driver: Arc<dyn BroadcastDriver>,
    limits: MessagingConfig,
    attachments: AttachmentPolicy,
}

impl MessageService {
    pub fn new(
        resolver: ConversationResolver,
        driver: Arc<dyn BroadcastDriver>,
        config: &ParleyConfig,
    ) -> Self {
        Self {
            resolver,
            driver,
            limits: config.messaging.clone(),
            attachments: AttachmentPolicy::new(&config.attachments),
        }
    }

    /// Send a text message as `actor`.
    pub async fn send(
        &self,
        conversation_id: ConversationId,
        actor: &Actor,
        content: &str,
        booking: Option<BookingRef>,
    ) -> Result<Message, ParleyError> {
        let content = validate::content("content", content, self.limits.max_content_length)?;
        if let Some(b) = &booking {
            validate::booking(b)?;
        }
        self.resolver
            .require_participant(actor, conversation_id)
            .await?;

        let body = MessageBody::Text {
            content: content.to_string(),
            booking,
        };
        self.persist_and_publish(conversation_id, actor, Some(actor), body)
            .await
    }

    /// A page of messages, oldest first.
    ///
    /// `limit` 0 means the configured default; larger values are clamped to
    /// `messaging.max_page_size`.
    pub async fn list(
        &self,
        conversation_id: ConversationId,
        actor: &Actor,
        page: PageRequest,
    ) -> Result<MessagePage, ParleyError> {
        self.resolver
            .require_participant(actor, conversation_id)
            .await?;
        let page = PageRequest {
            before: page.before,
            limit: self.clamp_limit(page.limit),
        };
        self.resolver
            .storage()
            .list_messages(conversation_id, &page)
            .await
    }

    /// Marks everything the other side wrote as read by the actor's side.
    ///
    /// Returns the ids whose marker changed. One read event is published for
    /// the whole set, and none when the set is empty.
    pub async fn mark_read(
        &self,
        conversation_id: ConversationId,
        actor: &Actor,
    ) -> Result<Vec<MessageId>, ParleyError> {
        let (_, side) = self
            .resolver
            .require_participant(actor, conversation_id)
            .await?;
        let changed = self
            .resolver
            .storage()
            .mark_read(conversation_id, side, Utc::now())
            .await?;

        if changed.is_empty() {
            debug!(conversation_id = conversation_id.0, reader = %side, "nothing to mark read");
        } else {
            debug!(
                conversation_id = conversation_id.0,
                reader = %side,
                count = changed.len(),
                "messages marked read"
            );
            self.driver
                .publish_read(conversation_id, &changed, side, actor)
                .await;
        }
        Ok(changed)
    }

    /// Send a file reference. Size and type are checked before the store is touched.
    pub async fn send_attachment(
        &self,
        conversation_id: ConversationId,
        actor: &Actor,
        upload: AttachmentUpload,
    ) -> Result<Message, ParleyError> {
        self.attachments.check(&upload)?;
        let caption = validate::optional_content(
            "caption",
            upload.caption.as_deref(),
            self.limits.max_content_length,
        )?
        .map(str::to_string);
        self.resolver
            .require_participant(actor, conversation_id)
            .await?;

        let body = MessageBody::File {
            attachment: upload.to_attachment(),
            caption,
        };
        self.persist_and_publish(conversation_id, actor, Some(actor), body)
            .await
    }

    /// A notification authored by the platform, unread for both sides.
    pub async fn send_system(
        &self,
        conversation_id: ConversationId,
        content: &str,
        buttons: Vec<ActionButton>,
        booking: Option<BookingRef>,
    ) -> Result<Message, ParleyError> {
        let content = validate::content("content", content, self.limits.max_content_length)?;
        validate::buttons(&buttons)?;
        if let Some(b) = &booking {
            validate::booking(b)?;
        }
        if self
            .resolver
            .storage()
            .get_conversation(conversation_id)
            .await?
            .is_none()
        {
            return Err(ParleyError::not_found("conversation", conversation_id));
        }

        let body = MessageBody::System {
            content: content.to_string(),
            buttons,
            booking,
        };
        self.persist_and_publish(conversation_id, &Actor::system(), None, body)
            .await
    }

    pub async fn send_booking_request(
        &self,
        conversation_id: ConversationId,
        actor: &Actor,
        content: &str,
        booking: BookingRef,
        buttons: Vec<ActionButton>,
    ) -> Result<Message, ParleyError> {
        let content = validate::content("content", content, self.limits.max_content_length)?;
        validate::booking(&booking)?;
        validate::buttons(&buttons)?;
        self.resolver
            .require_participant(actor, conversation_id)
            .await?;

        let body = MessageBody::BookingRequest {
            content: content.to_string(),
            booking,
            buttons,
        };
        self.persist_and_publish(conversation_id, actor, Some(actor), body)
            .await
    }

    /// `author` is `None` for system notifications; `publisher` names the sender in events.
    async fn persist_and_publish(
        &self,
        conversation_id: ConversationId,
        publisher: &Actor,
        author: Option<&Actor>,
        body: MessageBody,
    ) -> Result<Message, ParleyError> {
        let formatted_content = body.text().map(format_content);
        let new = NewMessage {
            conversation_id,
            sender_id: author.map(|a| a.id),
            sender_role: author.map(|a| a.role).unwrap_or(Role::System),
            body,
            formatted_content,
            created_at: Utc::now(),
        };

        let message = self.resolver.storage().insert_message(new).await?;
        info!(
            conversation_id = conversation_id.0,
            message_id = message.id.0,
            kind = %message.kind(),
            sender_role = %message.sender_role,
            "message stored"
        );

        self.driver.publish_message(&message, publisher).await;
        Ok(message)
    }

    fn clamp_limit(&self, requested: u32) -> u32 {
        match requested {
            0 => self.limits.default_page_size,
            n => n.min(self.limits.max_page_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{ButtonAction, ConversationLink, EventType, Participant, RealtimeEvent, UserId};
    use parley_test_utils::{FailingDriver, TestHarness, customer, provider};

    async fn setup() -> (TestHarness, MessageService, ConversationId) {
        let harness = TestHarness::new().await.unwrap();
        let resolver = ConversationResolver::new(Arc::clone(&harness.storage));
        let conv = resolver
            .get_or_create(&customer(1), UserId(2), &ConversationLink::default())
            .await
            .unwrap();
        let driver: Arc<dyn BroadcastDriver> = harness.driver.clone();
        let service = MessageService::new(resolver, driver, &harness.config);
        (harness, service, conv.id)
    }

    #[tokio::test]
    async fn send_persists_formats_and_publishes() {
        let (harness, service, conv) = setup().await;
        let sender = customer(1).with_socket_id("sock-1");

        let msg = service
            .send(conv, &sender, "  see https://ex.com  ", None)
            .await
            .unwrap();
        assert_eq!(msg.body.text(), Some("see https://ex.com"));
        assert!(msg.formatted_content.as_deref().unwrap().contains("<a href=\"https://ex.com\""));
        assert_eq!(msg.read_at(Participant::Customer), None);

        let sent = harness.driver.sent_of(EventType::Message).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel, format!("conversation.{}", conv.0));
        assert_eq!(sent[0].origin_socket.as_deref(), Some("sock-1"));
        match &sent[0].event {
            RealtimeEvent::Message(p) => {
                assert_eq!(p.message.id, msg.id);
                assert_eq!(p.sender_name, "Customer 1");
            }
            other => panic!("unexpected event {other:?}"),
        }

        let stored = harness.storage.get_conversation(conv).await.unwrap().unwrap();
        assert_eq!(stored.last_message_preview.as_deref(), Some("see https://ex.com"));
        assert_eq!(stored.unread_provider, 1);
        assert_eq!(stored.unread_customer, 0);
    }

    #[tokio::test]
    async fn invalid_content_never_reaches_store() {
        let (harness, service, conv) = setup().await;
        for bad in ["", "   ", &"x".repeat(5001)] {
            let err = service.send(conv, &customer(1), bad, None).await.unwrap_err();
            assert!(matches!(err, ParleyError::Validation { .. }));
        }
        let page = harness
            .storage
            .list_messages(conv, &PageRequest::default())
            .await
            .unwrap();
        assert!(page.messages.is_empty());
        assert_eq!(harness.driver.sent_count().await, 0);
    }

    #[tokio::test]
    async fn outsider_is_forbidden() {
        let (_h, service, conv) = setup().await;
        let err = service.send(conv, &customer(77), "hi", None).await.unwrap_err();
        assert!(matches!(err, ParleyError::Forbidden(_)));
    }

    #[tokio::test]
    async fn broadcast_failure_does_not_fail_send() {
        let harness = TestHarness::new().await.unwrap();
        let resolver = ConversationResolver::new(Arc::clone(&harness.storage));
        let conv = resolver
            .get_or_create(&customer(1), UserId(2), &ConversationLink::default())
            .await
            .unwrap();
        let failing = Arc::new(FailingDriver::new());
        let service = MessageService::new(resolver, failing.clone(), &harness.config);

        let msg = service.send(conv.id, &customer(1), "hello", None).await.unwrap();
        assert_eq!(failing.attempts(), 1);
        assert!(harness.storage.get_message(msg.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn mark_read_is_idempotent_and_batched() {
        let (harness, service, conv) = setup().await;
        let a = service.send(conv, &customer(1), "one", None).await.unwrap();
        let b = service.send(conv, &customer(1), "two", None).await.unwrap();
        service.send(conv, &provider(2), "reply", None).await.unwrap();
        harness.driver.clear_sent().await;

        let changed = service.mark_read(conv, &provider(2)).await.unwrap();
        assert_eq!(changed, vec![a.id, b.id]);
        let reads = harness.driver.sent_of(EventType::Read).await;
        assert_eq!(reads.len(), 1);
        match &reads[0].event {
            RealtimeEvent::Read(p) => {
                assert_eq!(p.message_ids, vec![a.id, b.id]);
                assert_eq!(p.reader_role, Participant::Provider);
            }
            other => panic!("unexpected event {other:?}"),
        }

        let first = harness.storage.get_message(a.id).await.unwrap().unwrap();
        let again = service.mark_read(conv, &provider(2)).await.unwrap();
        assert!(again.is_empty());
        assert_eq!(harness.driver.sent_of(EventType::Read).await.len(), 1);
        let second = harness.storage.get_message(a.id).await.unwrap().unwrap();
        assert_eq!(first.read_by_provider_at, second.read_by_provider_at);

        let stored = harness.storage.get_conversation(conv).await.unwrap().unwrap();
        assert_eq!(stored.unread_provider, 0);
        assert_eq!(stored.unread_customer, 1);
    }

    #[tokio::test]
    async fn list_clamps_limit() {
        let (_h, service, conv) = setup().await;
        for i in 0..5 {
            service
                .send(conv, &customer(1), &format!("m{i}"), None)
                .await
                .unwrap();
        }
        let page = service
            .list(conv, &provider(2), PageRequest::latest(2))
            .await
            .unwrap();
        assert_eq!(page.messages.len(), 2);
        assert!(page.has_more);
        assert_eq!(page.messages[0].body.text(), Some("m3"));

        let older = service
            .list(
                conv,
                &provider(2),
                PageRequest {
                    before: page.next_before,
                    limit: 0,
                },
            )
            .await
            .unwrap();
        assert_eq!(older.messages.len(), 3);
        assert!(!older.has_more);
        assert_eq!(older.messages[0].body.text(), Some("m0"));
    }

    #[tokio::test]
    async fn oversized_attachment_rejected_before_store() {
        let (harness, service, conv) = setup().await;
        let upload = AttachmentUpload {
            url: "https://files.example.com/big.pdf".into(),
            file_name: "big.pdf".into(),
            mime_type: "application/pdf".into(),
            size_bytes: 10 * 1024 * 1024,
            caption: None,
        };
        // An unknown conversation would be NotFound if the store were consulted first.
        let err = service
            .send_attachment(ConversationId(4242), &customer(1), upload.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Validation { ref field, .. } if field == "size"));

        let ok = AttachmentUpload {
            size_bytes: 1024,
            caption: Some("  ".into()),
            ..upload
        };
        let msg = service.send_attachment(conv, &customer(1), ok).await.unwrap();
        assert_eq!(msg.body.attachment().unwrap().file_name, "big.pdf");
        assert_eq!(msg.formatted_content, None);
        let stored = harness.storage.get_conversation(conv).await.unwrap().unwrap();
        assert_eq!(stored.last_message_preview.as_deref(), Some("Attachment: big.pdf"));
    }

    #[tokio::test]
    async fn system_message_is_unread_for_both() {
        let (harness, service, conv) = setup().await;
        let buttons = vec![ActionButton {
            label: "View booking".into(),
            action: ButtonAction::Navigate,
            url: "/bookings/12".into(),
        }];
        let msg = service
            .send_system(conv, "Booking confirmed", buttons, None)
            .await
            .unwrap();
        assert_eq!(msg.sender_id, None);
        assert_eq!(msg.sender_role, Role::System);
        assert_eq!(msg.body.buttons().len(), 1);

        let stored = harness.storage.get_conversation(conv).await.unwrap().unwrap();
        assert_eq!(stored.unread_customer, 1);
        assert_eq!(stored.unread_provider, 1);

        let bad = vec![ActionButton {
            label: "Pay".into(),
            action: ButtonAction::External,
            url: "/pay".into(),
        }];
        assert!(service.send_system(conv, "Pay now", bad, None).await.is_err());
        assert!(matches!(
            service
                .send_system(ConversationId(999), "x", Vec::new(), None)
                .await
                .unwrap_err(),
            ParleyError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn booking_request_carries_reference() {
        let (_h, service, conv) = setup().await;
        let booking = BookingRef {
            booking_id: 12,
            booking_number: Some("BK-0012".into()),
            service_name: Some("Wedding photography".into()),
            event_date: None,
        };
        let msg = service
            .send_booking_request(conv, &customer(1), "Can you do June 5?", booking, Vec::new())
            .await
            .unwrap();
        assert_eq!(msg.body.booking().map(|b| b.booking_id), Some(12));
    }
}
