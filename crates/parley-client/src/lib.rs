// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client side of the Parley realtime engine.
//!
//! Pick an [`EventTransport`] that matches the server's driver
//! ([`WsTransport`] for the native driver, [`RelayPoller`] for the relay),
//! pair it with an [`ApiClient`] as the [`MessageFeed`], and open one
//! [`ConversationSubscription`] per visible conversation. [`TypingNotifier`]
//! covers the producer side of typing indicators.

pub mod api;
pub mod poller;
pub mod presence;
pub mod subscription;
pub mod thread;
pub mod transport;
pub mod typing;
pub mod ws;

pub use api::{ApiClient, AttachmentRequest, SOCKET_ID_HEADER};
pub use poller::RelayPoller;
pub use presence::{PresenceEntry, PresenceRoster};
pub use subscription::{
    ConversationSubscription, MessageFeed, SubscriptionOptions, SubscriptionState,
    SubscriptionUpdate,
};
pub use thread::{ThreadState, TypingSet, TypingUser};
pub use transport::{EventTransport, TransportSignal};
pub use typing::{TypingNotifier, TypingSink};
pub use ws::{WsConfig, WsTransport};
