// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests: a live gateway on the native driver, driven by the
//! client library over HTTP and WebSocket exactly as a browser would.

use std::sync::Arc;
use std::time::Duration;

use parley_broadcast::{ChannelHub, build_driver};
use parley_client::{
    ApiClient, ConversationSubscription, MessageFeed, SubscriptionOptions, SubscriptionState,
    SubscriptionUpdate, TypingNotifier, TypingSink, WsConfig, WsTransport,
};
use parley_config::model::{BroadcastConfig, DriverKind, ServerConfig};
use parley_core::{
    Actor, BroadcastDriver, ConversationId, ConversationLink, Message, ParleyError, Participant,
    UserId,
};
use parley_gateway::{AuthConfig, GatewayState, serve};
use parley_messaging::Engine;
use parley_test_utils::{TestHarness, customer, provider};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const TOKEN: &str = "e2e-token";
const WAIT: Duration = Duration::from_secs(5);

struct Server {
    addr: std::net::SocketAddr,
    hub: Arc<ChannelHub>,
    shutdown: CancellationToken,
    _harness: TestHarness,
}

impl Server {
    async fn start() -> Self {
        let harness = TestHarness::new().await.unwrap();
        let handle = build_driver(&BroadcastConfig {
            driver: DriverKind::Native,
            ..BroadcastConfig::default()
        })
        .unwrap();
        let hub = handle.hub.clone().unwrap();
        let driver: Arc<dyn BroadcastDriver> = handle.driver.clone();

        let engine = Engine::new(harness.storage.clone(), Arc::clone(&driver), &harness.config);
        let state = GatewayState::new(
            Arc::new(engine),
            handle.hub.clone(),
            AuthConfig {
                bearer_token: Some(TOKEN.into()),
            },
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        tokio::spawn(async move { serve(listener, &ServerConfig::default(), state, token).await });

        // The native driver only publishes once the socket layer is attached.
        wait_for(|| driver.is_ready()).await;

        Self {
            addr,
            hub,
            shutdown,
            _harness: harness,
        }
    }

    fn http(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn api(&self, actor: &Actor) -> Arc<ApiClient> {
        Arc::new(ApiClient::new(&self.http(), TOKEN, actor).unwrap())
    }

    fn socket(&self, actor: &Actor) -> Arc<WsTransport> {
        let config = WsConfig::for_actor(&format!("ws://{}", self.addr), TOKEN, actor).unwrap();
        Arc::new(WsTransport::connect(config))
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn wait_for(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// A subscription plus the stream of its updates.
struct Viewer {
    subscription: ConversationSubscription,
    updates: mpsc::UnboundedReceiver<SubscriptionUpdate>,
}

impl Viewer {
    /// Opens the subscription and waits for its first snapshot.
    async fn open(
        conversation: ConversationId,
        actor: &Actor,
        transport: Arc<WsTransport>,
        api: Arc<ApiClient>,
    ) -> (Self, Vec<Message>) {
        let feed: Arc<dyn MessageFeed> = api;
        let mut subscription = ConversationSubscription::new(
            conversation,
            actor.id,
            transport,
            feed,
            SubscriptionOptions::default(),
        );
        let (tx, updates) = mpsc::unbounded_channel();
        subscription.on_update(move |update| {
            let _ = tx.send(update.clone());
        });
        subscription.open().await.unwrap();
        let mut viewer = Self {
            subscription,
            updates,
        };
        let snapshot = viewer
            .next(|u| match u {
                SubscriptionUpdate::Snapshot(messages) => Some(messages),
                _ => None,
            })
            .await;
        (viewer, snapshot)
    }

    /// Skips updates until `pick` accepts one.
    async fn next<T>(&mut self, mut pick: impl FnMut(SubscriptionUpdate) -> Option<T>) -> T {
        tokio::time::timeout(WAIT, async {
            loop {
                let update = self.updates.recv().await.expect("subscription ended");
                if let Some(found) = pick(update) {
                    return found;
                }
            }
        })
        .await
        .expect("expected update did not arrive")
    }
}

#[tokio::test]
async fn messages_reads_and_typing_flow_between_participants() {
    let server = Server::start().await;
    let ana = customer(1);
    let bo = provider(2);
    let ana_api = server.api(&ana);
    let bo_api = server.api(&bo);

    let conversation = ana_api
        .open_conversation(UserId(2), &ConversationLink::default())
        .await
        .unwrap();
    let channel = format!("conversation.{}", conversation.id);

    let (mut bo_view, snapshot) =
        Viewer::open(conversation.id, &bo, server.socket(&bo), Arc::clone(&bo_api)).await;
    assert!(snapshot.is_empty());
    // `open` returns only after the gateway attached the socket to the channel.
    assert_eq!(server.hub.subscriber_count(&channel), 1);

    let sent = ana_api
        .send_message(conversation.id, "is 3pm still free?", None)
        .await
        .unwrap();
    let received = bo_view
        .next(|u| match u {
            SubscriptionUpdate::MessageAppended(m) => Some(m),
            _ => None,
        })
        .await;
    assert_eq!(received.id, sent.id);
    assert_eq!(received.body.text(), Some("is 3pm still free?"));

    // Ana joins after the message exists: her snapshot carries it.
    let (mut ana_view, snapshot) =
        Viewer::open(conversation.id, &ana, server.socket(&ana), Arc::clone(&ana_api)).await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, sent.id);
    assert_eq!(server.hub.subscriber_count(&channel), 2);

    assert_eq!(bo_api.mark_read(conversation.id).await.unwrap(), vec![sent.id]);
    let (ids, reader) = ana_view
        .next(|u| match u {
            SubscriptionUpdate::MessagesRead {
                message_ids,
                reader_role,
            } => Some((message_ids, reader_role)),
            _ => None,
        })
        .await;
    assert_eq!(ids, vec![sent.id]);
    assert_eq!(reader, Participant::Provider);
    assert!(
        ana_view
            .subscription
            .messages()
            .iter()
            .all(|m| m.read_by_provider_at.is_some())
    );

    let sink: Arc<dyn TypingSink> = Arc::clone(&ana_api) as Arc<dyn TypingSink>;
    let notifier = TypingNotifier::with_timing(
        sink,
        conversation.id,
        Duration::from_secs(10),
        Duration::from_secs(5),
    );
    notifier.keystroke();
    let typing = bo_view
        .next(|u| match u {
            SubscriptionUpdate::TypingChanged(users) if !users.is_empty() => Some(users),
            _ => None,
        })
        .await;
    assert_eq!(typing[0].user_id, UserId(1));

    notifier.stop();
    bo_view
        .next(|u| match u {
            SubscriptionUpdate::TypingChanged(users) if users.is_empty() => Some(()),
            _ => None,
        })
        .await;

    bo_view.subscription.close().await.unwrap();
    ana_view.subscription.close().await.unwrap();
}

#[tokio::test]
async fn own_socket_does_not_echo_and_unread_counts_track() {
    let server = Server::start().await;
    let ana = customer(1);
    let bo = provider(2);
    let ana_api = server.api(&ana);
    let bo_api = server.api(&bo);

    let conversation = bo_api
        .open_conversation(UserId(1), &ConversationLink::default())
        .await
        .unwrap();
    let channel = format!("conversation.{}", conversation.id);

    let ana_socket = server.socket(&ana);
    let mut watch = ana_socket.watch_socket_id();
    tokio::time::timeout(WAIT, watch.wait_for(|id| id.is_some()))
        .await
        .unwrap()
        .unwrap();
    ana_api.set_socket_id(ana_socket.socket_id());

    let (mut ana_view, _) =
        Viewer::open(conversation.id, &ana, ana_socket, Arc::clone(&ana_api)).await;
    assert_eq!(server.hub.subscriber_count(&channel), 1);

    // Sent from Ana's own socket: the hub skips it for her.
    ana_api
        .send_message(conversation.id, "mine", None)
        .await
        .unwrap();
    bo_api
        .send_message(conversation.id, "theirs", None)
        .await
        .unwrap();
    let first = ana_view
        .next(|u| match u {
            SubscriptionUpdate::MessageAppended(m) => Some(m),
            _ => None,
        })
        .await;
    assert_eq!(first.body.text(), Some("theirs"));

    let inbox = bo_api.list_conversations().await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].unread_count, 1);
    let inbox = ana_api.list_conversations().await.unwrap();
    assert_eq!(inbox[0].unread_count, 1);

    ana_view.subscription.close().await.unwrap();
    wait_for(|| server.hub.subscriber_count(&channel) == 0).await;

    // A third party is refused by the gateway and the subscription never opens.
    let stranger = customer(3);
    let feed: Arc<dyn MessageFeed> = server.api(&stranger);
    let mut snooping = ConversationSubscription::new(
        conversation.id,
        stranger.id,
        server.socket(&stranger),
        feed,
        SubscriptionOptions::default(),
    );
    let err = snooping.open().await.unwrap_err();
    assert!(matches!(err, ParleyError::Forbidden(_)), "{err:?}");
    assert_eq!(snooping.state(), SubscriptionState::Unsubscribed);
    assert_eq!(server.hub.subscriber_count(&channel), 0);
}
