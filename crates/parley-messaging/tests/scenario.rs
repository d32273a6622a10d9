// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Customer/provider exchange through the engine.

use std::sync::Arc;

use parley_core::{
    BroadcastDriver, ConversationLink, EventType, PageRequest, Participant, UserId,
};
use parley_messaging::Engine;
use parley_test_utils::{RecordingDriver, TestHarness, customer, provider};

#[tokio::test]
async fn customer_and_provider_exchange() {
    let harness = TestHarness::new().await.unwrap();
    let engine = Engine::new(
        Arc::clone(&harness.storage),
        harness.driver.clone(),
        &harness.config,
    );
    let c = customer(10);
    let p = provider(20);

    let k1 = engine
        .conversations
        .get_or_create(&c, p.id, &ConversationLink::default())
        .await
        .unwrap();

    let m1 = engine
        .messages
        .send(k1.id, &c, "Hi, is June 5 available?", None)
        .await
        .unwrap();
    let conv = engine.conversations.get(&c, k1.id).await.unwrap();
    assert_eq!(conv.last_message_preview.as_deref(), Some("Hi, is June 5 available?"));

    let page = engine
        .messages
        .list(k1.id, &p, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.messages[0].id, m1.id);
    let inbox = engine.conversations.list(&p).await.unwrap();
    assert_eq!(inbox[0].unread_count, 1);
    assert_eq!(inbox[0].counterparty_id, UserId(10));

    let m2 = engine.messages.send(k1.id, &p, "Yes it is!", None).await.unwrap();

    let read_by_p = engine.messages.mark_read(k1.id, &p).await.unwrap();
    assert_eq!(read_by_p, vec![m1.id]);
    let read_by_c = engine.messages.mark_read(k1.id, &c).await.unwrap();
    assert_eq!(read_by_c, vec![m2.id]);

    let final_page = engine
        .messages
        .list(k1.id, &c, PageRequest::default())
        .await
        .unwrap();
    let m1_final = &final_page.messages[0];
    let m2_final = &final_page.messages[1];
    assert!(m1_final.read_at(Participant::Provider).is_some());
    assert!(m1_final.read_at(Participant::Customer).is_none());
    assert!(m2_final.read_at(Participant::Customer).is_some());
    assert!(m2_final.read_at(Participant::Provider).is_none());

    let conv = engine.conversations.get(&p, k1.id).await.unwrap();
    assert_eq!(conv.unread_customer, 0);
    assert_eq!(conv.unread_provider, 0);

    // Two messages, two read batches.
    assert_eq!(harness.driver.sent_of(EventType::Message).await.len(), 2);
    assert_eq!(harness.driver.sent_of(EventType::Read).await.len(), 2);
}

#[tokio::test]
async fn unready_driver_is_transparent() {
    let harness = TestHarness::builder()
        .with_unready_driver()
        .build()
        .await
        .unwrap();
    let engine = Engine::new(
        Arc::clone(&harness.storage),
        harness.driver.clone(),
        &harness.config,
    );
    let c = customer(1);
    let p = provider(2);
    let conv = engine
        .conversations
        .get_or_create(&c, p.id, &ConversationLink::default())
        .await
        .unwrap();

    let sent = engine.messages.send(conv.id, &c, "hello", None).await.unwrap();
    engine.typing.set_typing(conv.id, &c, true).await.unwrap();
    engine.presence.set_presence(&c, true).await.unwrap();
    let read = engine.messages.mark_read(conv.id, &p).await.unwrap();

    assert_eq!(read, vec![sent.id]);
    assert!(!engine.driver().is_ready());
    assert_eq!(harness.driver.sent_count().await, 0);
}

#[tokio::test]
async fn concurrent_sends_keep_counters_consistent() {
    let harness = TestHarness::new().await.unwrap();
    let engine = Arc::new(Engine::new(
        Arc::clone(&harness.storage),
        Arc::new(RecordingDriver::new()),
        &harness.config,
    ));
    let c = customer(1);
    let p = provider(2);
    let conv = engine
        .conversations
        .get_or_create(&c, p.id, &ConversationLink::default())
        .await
        .unwrap();

    let conv_id = conv.id;
    let mut tasks = Vec::new();
    for i in 0..20 {
        let engine = Arc::clone(&engine);
        let author = if i % 2 == 0 { c.clone() } else { p.clone() };
        tasks.push(tokio::spawn(async move {
            engine
                .messages
                .send(conv_id, &author, &format!("msg {i}"), None)
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let stored = engine.conversations.get(&c, conv.id).await.unwrap();
    assert_eq!(stored.unread_customer, 10);
    assert_eq!(stored.unread_provider, 10);

    let page = engine
        .messages
        .list(conv.id, &c, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.messages.len(), 20);
    assert!(page.messages.windows(2).all(|w| w[0].id.0 < w[1].id.0));
}
