// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket frames exchanged between the gateway and client transports.

use serde::{Deserialize, Serialize};

use crate::event::RealtimeEvent;

/// Sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
}

impl ClientFrame {
    pub fn channel(&self) -> &str {
        match self {
            ClientFrame::Subscribe { channel } | ClientFrame::Unsubscribe { channel } => channel,
        }
    }
}

/// Sent by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// First frame on every connection.
    Connected { socket_id: String },
    Subscribed { channel: String },
    Unsubscribed { channel: String },
    Event { channel: String, event: RealtimeEvent },
    /// Events on `channel` were dropped for this socket; re-fetch before trusting the stream.
    Resync { channel: String },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
    },
}
