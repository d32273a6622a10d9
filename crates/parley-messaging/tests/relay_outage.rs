// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sending through a relay that is failing or hanging.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parley_broadcast::RelayDriver;
use parley_config::model::RelayConfig;
use parley_core::{BroadcastDriver, ConversationLink, PageRequest, UserId};
use parley_messaging::Engine;
use parley_test_utils::{TestHarness, customer};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TABLE_PATH: &str = "/rest/v1/broadcast_events";

fn engine_on_relay(harness: &TestHarness, server: &MockServer, timeout_ms: u64) -> Engine {
    let driver = RelayDriver::new(&RelayConfig {
        url: Some(server.uri()),
        service_key: Some("svc-key".into()),
        anon_key: None,
        table: "broadcast_events".into(),
        timeout_ms,
    })
    .unwrap();
    assert!(driver.is_ready());
    let driver: Arc<dyn BroadcastDriver> = Arc::new(driver);
    Engine::new(Arc::clone(&harness.storage), driver, &harness.config)
}

#[tokio::test]
async fn relay_error_does_not_fail_send() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TABLE_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let harness = TestHarness::new().await.unwrap();
    let engine = engine_on_relay(&harness, &server, 5000);
    let ana = customer(1);
    let conv = engine
        .conversations
        .get_or_create(&ana, UserId(2), &ConversationLink::default())
        .await
        .unwrap();

    let sent = engine
        .messages
        .send(conv.id, &ana, "still on for Friday?", None)
        .await
        .unwrap();

    let page = engine
        .messages
        .list(conv.id, &ana, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.messages[0].id, sent.id);
}

#[tokio::test]
async fn hanging_relay_is_cut_off_by_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TABLE_PATH))
        .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let harness = TestHarness::new().await.unwrap();
    let engine = engine_on_relay(&harness, &server, 200);
    let ana = customer(1);
    let conv = engine
        .conversations
        .get_or_create(&ana, UserId(2), &ConversationLink::default())
        .await
        .unwrap();

    let started = Instant::now();
    let sent = engine
        .messages
        .send(conv.id, &ana, "hello?", None)
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    let page = engine
        .messages
        .list(conv.id, &ana, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.messages.last().map(|m| m.id), Some(sent.id));
}
