// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime event envelope shared by every broadcast driver and client transport.
//!
//! Events are never persisted as domain entities. The relay driver writes them
//! to an append-only mailbox table as [`RelayRow`]s; the native driver pushes
//! [`Envelope`]s straight onto the in-process hub.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

use crate::error::ParleyError;
use crate::types::{ConversationId, Message, MessageId, Participant, UserId};

/// Global topic for presence updates.
pub const PRESENCE_CHANNEL: &str = "presence";

/// Channel name for a conversation's events.
pub fn conversation_channel(id: ConversationId) -> String {
    format!("conversation.{id}")
}

/// Parses `conversation.{id}` back into an id. Only the canonical spelling
/// is accepted (`conversation.+5` and `conversation.05` are not channels).
pub fn parse_conversation_channel(channel: &str) -> Option<ConversationId> {
    channel
        .strip_prefix("conversation.")
        .and_then(|rest| rest.parse::<i64>().ok())
        .map(ConversationId)
        .filter(|id| conversation_channel(*id) == channel)
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    Message,
    Typing,
    Read,
    Presence,
}

/// A new message, with everything a client needs to render it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub message: Message,
    pub sender_name: String,
    /// `HH:MM` in UTC.
    pub time_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingPayload {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub user_name: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadPayload {
    pub conversation_id: ConversationId,
    /// Accepts a single `message_id` or a `message_ids` array on the wire.
    #[serde(alias = "message_id", deserialize_with = "one_or_many")]
    pub message_ids: Vec<MessageId>,
    pub reader_role: Participant,
    pub reader_id: UserId,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresencePayload {
    pub user_id: UserId,
    pub user_name: String,
    pub is_online: bool,
    pub at: DateTime<Utc>,
}

/// One realtime event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum RealtimeEvent {
    Message(MessagePayload),
    Typing(TypingPayload),
    Read(ReadPayload),
    Presence(PresencePayload),
}

impl RealtimeEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            RealtimeEvent::Message(_) => EventType::Message,
            RealtimeEvent::Typing(_) => EventType::Typing,
            RealtimeEvent::Read(_) => EventType::Read,
            RealtimeEvent::Presence(_) => EventType::Presence,
        }
    }

    /// The conversation this event belongs to; `None` for presence.
    pub fn conversation_id(&self) -> Option<ConversationId> {
        match self {
            RealtimeEvent::Message(p) => Some(p.message.conversation_id),
            RealtimeEvent::Typing(p) => Some(p.conversation_id),
            RealtimeEvent::Read(p) => Some(p.conversation_id),
            RealtimeEvent::Presence(_) => None,
        }
    }

    /// Payload without the type tag, as stored in the relay table.
    fn payload_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            RealtimeEvent::Message(p) => serde_json::to_value(p),
            RealtimeEvent::Typing(p) => serde_json::to_value(p),
            RealtimeEvent::Read(p) => serde_json::to_value(p),
            RealtimeEvent::Presence(p) => serde_json::to_value(p),
        }
    }
}

/// Delivery envelope: an event addressed to one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub channel: String,
    pub event: RealtimeEvent,
    /// Socket that caused the event; native delivery skips it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_socket: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Envelope {
    /// Addresses the event to its natural channel.
    pub fn new(event: RealtimeEvent) -> Self {
        let channel = match event.conversation_id() {
            Some(id) => conversation_channel(id),
            None => PRESENCE_CHANNEL.to_string(),
        };
        Self {
            channel,
            event,
            origin_socket: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_origin(mut self, socket_id: Option<String>) -> Self {
        self.origin_socket = socket_id;
        self
    }

    pub fn event_type(&self) -> EventType {
        self.event.event_type()
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.event.conversation_id()
    }

    /// Row shape inserted into the relay table.
    pub fn to_relay_row(&self) -> Result<RelayRow, ParleyError> {
        let payload = self.event.payload_value().map_err(|e| ParleyError::Internal(
            format!("failed to encode {} payload: {e}", self.event_type()),
        ))?;
        Ok(RelayRow {
            id: None,
            event_type: self.event_type(),
            conversation_id: self.conversation_id(),
            channel: self.channel.clone(),
            payload,
            created_at: self.created_at,
        })
    }
}

/// One row of the append-only relay mailbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayRow {
    /// Assigned by the relay on insert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub event_type: EventType,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    pub channel: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl RelayRow {
    pub fn into_envelope(self) -> Result<Envelope, ParleyError> {
        let tagged = serde_json::json!({
            "type": self.event_type,
            "payload": self.payload,
        });
        let event: RealtimeEvent = serde_json::from_value(tagged).map_err(|e| {
            ParleyError::transport(format!(
                "malformed {} row {:?}: {e}",
                self.event_type, self.id
            ))
        })?;
        Ok(Envelope {
            channel: self.channel,
            event,
            origin_socket: None,
            created_at: self.created_at,
        })
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<MessageId>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(MessageId),
        Many(Vec<MessageId>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(id) => vec![id],
        OneOrMany::Many(ids) => ids,
    })
}
