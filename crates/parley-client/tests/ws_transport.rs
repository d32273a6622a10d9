// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket transport against a scripted local server.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parley_client::{EventTransport, TransportSignal, WsConfig, WsTransport};
use parley_core::{ClientFrame, ConversationId, RealtimeEvent, ServerFrame, TypingPayload, UserId};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

const CHANNEL: &str = "conversation.1";

fn typing_from(connection: i64) -> RealtimeEvent {
    RealtimeEvent::Typing(TypingPayload {
        conversation_id: ConversationId(1),
        user_id: UserId(connection),
        user_name: format!("connection {connection}"),
        is_typing: true,
    })
}

/// Accepts connections in order. Each greets, acknowledges every subscribe,
/// follows the first with one event, and the first connection then drops
/// without a close handshake.
async fn scripted_server(frames: mpsc::UnboundedSender<(i64, ClientFrame)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut connection = 0i64;
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            connection += 1;
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let hello = ServerFrame::Connected {
                socket_id: format!("socket-{connection}"),
            };
            ws.send(WsMessage::Text(serde_json::to_string(&hello).unwrap().into()))
                .await
                .unwrap();

            let mut answered = false;
            while let Some(Ok(msg)) = ws.next().await {
                let WsMessage::Text(text) = msg else { continue };
                let frame: ClientFrame = serde_json::from_str(text.as_str()).unwrap();
                let _ = frames.send((connection, frame.clone()));
                if !matches!(frame, ClientFrame::Subscribe { .. }) {
                    continue;
                }
                let ack = ServerFrame::Subscribed {
                    channel: frame.channel().to_string(),
                };
                ws.send(WsMessage::Text(serde_json::to_string(&ack).unwrap().into()))
                    .await
                    .unwrap();
                if !answered {
                    answered = true;
                    let event = ServerFrame::Event {
                        channel: frame.channel().to_string(),
                        event: typing_from(connection),
                    };
                    ws.send(WsMessage::Text(serde_json::to_string(&event).unwrap().into()))
                        .await
                        .unwrap();
                    if connection == 1 {
                        break;
                    }
                }
            }
        }
    });

    format!("ws://{addr}/ws")
}

async fn next_signal(rx: &mut mpsc::Receiver<TransportSignal>) -> TransportSignal {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for transport signal")
        .expect("transport closed the channel")
}

#[tokio::test]
async fn routes_events_and_resubscribes_after_drop() {
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
    let url = scripted_server(frames_tx).await;

    let transport = WsTransport::connect(WsConfig {
        initial_backoff: Duration::from_millis(50),
        max_backoff: Duration::from_millis(200),
        ..WsConfig::new(url)
    });
    let mut rx = transport.subscribe(CHANNEL).await.unwrap();

    match next_signal(&mut rx).await {
        TransportSignal::Event(envelope) => {
            assert_eq!(envelope.channel, CHANNEL);
            assert_eq!(envelope.event, typing_from(1));
        }
        other => panic!("expected first event, got {other:?}"),
    }
    assert_eq!(next_signal(&mut rx).await, TransportSignal::Disconnected);
    assert_eq!(next_signal(&mut rx).await, TransportSignal::Reconnected);
    match next_signal(&mut rx).await {
        TransportSignal::Event(envelope) => assert_eq!(envelope.event, typing_from(2)),
        other => panic!("expected event from the second connection, got {other:?}"),
    }
    assert_eq!(transport.socket_id().as_deref(), Some("socket-2"));

    transport.unsubscribe(CHANNEL).await.unwrap();
    let mut resubscribed = false;
    loop {
        let (connection, frame) = tokio::time::timeout(Duration::from_secs(5), frames_rx.recv())
            .await
            .unwrap()
            .unwrap();
        match frame {
            ClientFrame::Subscribe { channel } if connection == 2 => {
                assert_eq!(channel, CHANNEL);
                resubscribed = true;
            }
            ClientFrame::Unsubscribe { channel } => {
                assert_eq!(connection, 2);
                assert_eq!(channel, CHANNEL);
                break;
            }
            _ => {}
        }
    }
    assert!(resubscribed);

    transport.shutdown().await;
    assert_eq!(transport.socket_id(), None);
}

#[tokio::test]
async fn unreachable_server_reports_disconnected_once() {
    // Bind then drop to get a port nobody listens on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let transport = WsTransport::connect(WsConfig {
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(20),
        ..WsConfig::new(format!("ws://{addr}/ws"))
    });
    let mut rx = transport.subscribe(CHANNEL).await.unwrap();

    assert_eq!(next_signal(&mut rx).await, TransportSignal::Disconnected);
    // Retries keep failing; nothing else is reported.
    assert!(
        tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .is_err()
    );
    transport.shutdown().await;
}

#[tokio::test]
async fn refused_subscription_fails_subscribe() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(WsMessage::Text(text))) = ws.next().await {
            let frame: ClientFrame = serde_json::from_str(text.as_str()).unwrap();
            let refusal = ServerFrame::Error {
                message: "not a participant".into(),
                channel: Some(frame.channel().to_string()),
            };
            ws.send(WsMessage::Text(serde_json::to_string(&refusal).unwrap().into()))
                .await
                .unwrap();
        }
    });

    let transport = WsTransport::connect(WsConfig::new(format!("ws://{addr}/ws")));
    let err = transport.subscribe(CHANNEL).await.unwrap_err();
    assert!(matches!(err, parley_core::ParleyError::Forbidden(ref m) if m.contains("not a participant")));
    transport.shutdown().await;
}
