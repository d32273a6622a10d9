// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relay driver against a stubbed realtime database.

use std::time::{Duration, Instant};

use chrono::Utc;
use parley_broadcast::RelayDriver;
use parley_config::model::RelayConfig;
use parley_core::{
    Actor, BroadcastDriver, ConversationId, Message, MessageBody, MessageId, Participant, Role,
    UserId,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn relay_config(server: &MockServer, timeout_ms: u64) -> RelayConfig {
    RelayConfig {
        url: Some(server.uri()),
        service_key: Some("svc-key".into()),
        anon_key: None,
        table: "broadcast_events".into(),
        timeout_ms,
    }
}

fn sample_message() -> Message {
    Message {
        id: MessageId(41),
        conversation_id: ConversationId(7),
        sender_id: Some(UserId(1)),
        sender_role: Role::Customer,
        body: MessageBody::Text {
            content: "Is the 14th still open?".into(),
            booking: None,
        },
        formatted_content: Some("Is the 14th still open?".into()),
        read_by_customer_at: None,
        read_by_provider_at: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn inserts_resolved_row_with_auth_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/broadcast_events"))
        .and(header("apikey", "svc-key"))
        .and(header("authorization", "Bearer svc-key"))
        .and(body_partial_json(json!({
            "event_type": "message",
            "channel": "conversation.7",
            "conversation_id": 7,
            "payload": { "sender_name": "Ana", "message": { "id": 41 } }
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let driver = RelayDriver::new(&relay_config(&server, 5000)).unwrap();
    let sender = Actor::new(UserId(1), Role::Customer, "Ana");
    driver.publish_message(&sample_message(), &sender).await;
}

#[tokio::test]
async fn read_event_carries_id_set() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "event_type": "read",
            "payload": { "message_ids": [3, 4, 5], "reader_role": "provider" }
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let driver = RelayDriver::new(&relay_config(&server, 5000)).unwrap();
    let reader = Actor::new(UserId(2), Role::Provider, "Bo");
    driver
        .publish_read(
            ConversationId(7),
            &[MessageId(3), MessageId(4), MessageId(5)],
            Participant::Provider,
            &reader,
        )
        .await;
}

#[tokio::test]
async fn presence_row_has_no_conversation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "event_type": "presence",
            "channel": "presence",
            "conversation_id": null
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let driver = RelayDriver::new(&relay_config(&server, 5000)).unwrap();
    driver
        .publish_presence(&Actor::new(UserId(2), Role::Provider, "Bo"), true)
        .await;
}

#[tokio::test]
async fn server_error_is_reported_by_deliver_and_swallowed_by_publish() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let driver = RelayDriver::new(&relay_config(&server, 5000)).unwrap();
    let envelope = parley_core::Envelope::new(parley_core::RealtimeEvent::Typing(
        parley_core::TypingPayload {
            conversation_id: ConversationId(7),
            user_id: UserId(1),
            user_name: "Ana".into(),
            is_typing: true,
        },
    ));

    let err = driver.deliver(&envelope).await.unwrap_err();
    assert!(err.to_string().contains("500"));

    // The publish path must return normally.
    driver
        .publish_typing(ConversationId(7), &Actor::new(UserId(1), Role::Customer, "Ana"), true)
        .await;
}

#[tokio::test]
async fn hanging_relay_is_cut_off_by_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let driver = RelayDriver::new(&relay_config(&server, 200)).unwrap();
    let sender = Actor::new(UserId(1), Role::Customer, "Ana");

    let started = Instant::now();
    driver.publish_message(&sample_message(), &sender).await;
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn unconfigured_relay_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = relay_config(&server, 5000);
    config.service_key = None;
    let driver = RelayDriver::new(&config).unwrap();
    driver
        .publish_message(&sample_message(), &Actor::new(UserId(1), Role::Customer, "Ana"))
        .await;
}
