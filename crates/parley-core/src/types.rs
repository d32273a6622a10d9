// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the store, the broadcast drivers, and the services.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Maximum number of characters kept in a conversation's last-message preview.
pub const PREVIEW_MAX_CHARS: usize = 100;

/// Unique identifier for a conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ConversationId(pub i64);

/// Unique, strictly increasing identifier for a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(pub i64);

/// Identity supplied by the external identity provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

macro_rules! id_display {
    ($($t:ty),*) => {
        $(impl std::fmt::Display for $t {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        })*
    };
}

id_display!(ConversationId, MessageId, UserId);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Broadcast,
}

/// Role tag carried by every message sender.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Customer,
    Provider,
    Administrator,
    System,
}

impl Role {
    /// The conversation side this role speaks for, if any.
    pub fn participant(self) -> Option<Participant> {
        match self {
            Role::Customer => Some(Participant::Customer),
            Role::Provider => Some(Participant::Provider),
            Role::Administrator | Role::System => None,
        }
    }
}

/// One of the two sides of a conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Participant {
    Customer,
    Provider,
}

impl Participant {
    pub fn role(self) -> Role {
        match self {
            Participant::Customer => Role::Customer,
            Participant::Provider => Role::Provider,
        }
    }

    pub fn other(self) -> Participant {
        match self {
            Participant::Customer => Participant::Provider,
            Participant::Provider => Participant::Customer,
        }
    }
}

/// The authenticated caller of a service operation.
///
/// Supplied by the identity provider for every call; `socket_id` identifies
/// the caller's own realtime connection so native broadcasts can skip it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_id: Option<String>,
}

impl Actor {
    pub fn new(id: UserId, role: Role, display_name: impl Into<String>) -> Self {
        Self {
            id,
            role,
            display_name: display_name.into(),
            socket_id: None,
        }
    }

    /// The author of system notifications.
    pub fn system() -> Self {
        Self::new(UserId(0), Role::System, "System")
    }

    pub fn with_socket_id(mut self, socket_id: impl Into<String>) -> Self {
        self.socket_id = Some(socket_id.into());
        self
    }
}

/// Optional soft tags attached to a conversation on creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationLink {
    #[serde(default)]
    pub booking_id: Option<i64>,
    #[serde(default)]
    pub service_name: Option<String>,
}

/// A persistent thread between exactly one customer and one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub customer_id: UserId,
    pub provider_id: UserId,
    pub booking_id: Option<i64>,
    pub service_name: Option<String>,
    pub last_message_preview: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_customer: u32,
    pub unread_provider: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Which side of this conversation the user is on, if any.
    pub fn side_of(&self, user: UserId) -> Option<Participant> {
        if user == self.customer_id {
            Some(Participant::Customer)
        } else if user == self.provider_id {
            Some(Participant::Provider)
        } else {
            None
        }
    }

    pub fn participant_id(&self, side: Participant) -> UserId {
        match side {
            Participant::Customer => self.customer_id,
            Participant::Provider => self.provider_id,
        }
    }

    pub fn unread_for(&self, side: Participant) -> u32 {
        match side {
            Participant::Customer => self.unread_customer,
            Participant::Provider => self.unread_provider,
        }
    }
}

/// A conversation as seen by one viewer in their inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub viewer_side: Participant,
    pub counterparty_id: UserId,
    pub booking_id: Option<i64>,
    pub service_name: Option<String>,
    pub last_message_preview: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: u32,
}

impl ConversationSummary {
    pub fn for_viewer(conversation: &Conversation, side: Participant) -> Self {
        Self {
            id: conversation.id,
            viewer_side: side,
            counterparty_id: conversation.participant_id(side.other()),
            booking_id: conversation.booking_id,
            service_name: conversation.service_name.clone(),
            last_message_preview: conversation.last_message_preview.clone(),
            last_message_at: conversation.last_message_at,
            unread_count: conversation.unread_for(side),
        }
    }
}

/// Kind tag stored alongside every message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageKind {
    Text,
    File,
    System,
    BookingRequest,
}

/// Button rendered under system and booking-request messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionButton {
    pub label: String,
    pub action: ButtonAction,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ButtonAction {
    /// In-app route.
    Navigate,
    /// Absolute URL opened outside the app.
    External,
}

/// Booking cross-reference carried by message metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BookingRef {
    pub booking_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_date: Option<NaiveDate>,
}

/// Opaque reference produced by the external upload flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// Message content, keyed by kind. Each kind carries exactly the fields it allows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    Text {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        booking: Option<BookingRef>,
    },
    File {
        attachment: Attachment,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    System {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        buttons: Vec<ActionButton>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        booking: Option<BookingRef>,
    },
    BookingRequest {
        content: String,
        booking: BookingRef,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        buttons: Vec<ActionButton>,
    },
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Text { .. } => MessageKind::Text,
            MessageBody::File { .. } => MessageKind::File,
            MessageBody::System { .. } => MessageKind::System,
            MessageBody::BookingRequest { .. } => MessageKind::BookingRequest,
        }
    }

    /// Human-authored text, if the kind has any.
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageBody::Text { content, .. }
            | MessageBody::System { content, .. }
            | MessageBody::BookingRequest { content, .. } => Some(content),
            MessageBody::File { caption, .. } => caption.as_deref(),
        }
    }

    pub fn booking(&self) -> Option<&BookingRef> {
        match self {
            MessageBody::Text { booking, .. } | MessageBody::System { booking, .. } => {
                booking.as_ref()
            }
            MessageBody::BookingRequest { booking, .. } => Some(booking),
            MessageBody::File { .. } => None,
        }
    }

    pub fn buttons(&self) -> &[ActionButton] {
        match self {
            MessageBody::System { buttons, .. } | MessageBody::BookingRequest { buttons, .. } => {
                buttons
            }
            _ => &[],
        }
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        match self {
            MessageBody::File { attachment, .. } => Some(attachment),
            _ => None,
        }
    }

    /// Single-line preview for the conversation list, capped at [`PREVIEW_MAX_CHARS`].
    pub fn preview(&self) -> String {
        let raw = match self {
            MessageBody::File {
                attachment,
                caption,
            } => match caption {
                Some(c) if !c.trim().is_empty() => c.clone(),
                _ => format!("Attachment: {}", attachment.file_name),
            },
            other => other.text().unwrap_or_default().to_string(),
        };
        let flat = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if flat.chars().count() <= PREVIEW_MAX_CHARS {
            flat
        } else {
            let mut cut: String = flat.chars().take(PREVIEW_MAX_CHARS - 1).collect();
            cut.push('…');
            cut
        }
    }
}

/// One persisted unit of communication within a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    /// Absent for system notifications.
    pub sender_id: Option<UserId>,
    pub sender_role: Role,
    pub body: MessageBody,
    pub formatted_content: Option<String>,
    pub read_by_customer_at: Option<DateTime<Utc>>,
    pub read_by_provider_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Whether the given side authored this message.
    pub fn authored_by(&self, side: Participant) -> bool {
        self.sender_role == side.role()
    }

    pub fn read_at(&self, side: Participant) -> Option<DateTime<Utc>> {
        match side {
            Participant::Customer => self.read_by_customer_at,
            Participant::Provider => self.read_by_provider_at,
        }
    }

    /// Set the read marker for `side` unless it is already set.
    ///
    /// Returns true if the marker changed.
    pub fn mark_read_by(&mut self, side: Participant, at: DateTime<Utc>) -> bool {
        let slot = match side {
            Participant::Customer => &mut self.read_by_customer_at,
            Participant::Provider => &mut self.read_by_provider_at,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(at);
        true
    }
}

/// A message ready to be inserted; the store assigns `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender_id: Option<UserId>,
    pub sender_role: Role,
    pub body: MessageBody,
    pub formatted_content: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Cursor pagination request. Results are always ordered oldest-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Only messages with a smaller id are returned. `None` starts from the newest.
    #[serde(default)]
    pub before: Option<MessageId>,
    #[serde(default = "default_page_limit")]
    pub limit: u32,
}

fn default_page_limit() -> u32 {
    50
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            before: None,
            limit: default_page_limit(),
        }
    }
}

impl PageRequest {
    pub fn latest(limit: u32) -> Self {
        Self {
            before: None,
            limit,
        }
    }
}

/// A window of messages in ascending id order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    /// True when older messages exist before the first one returned.
    pub has_more: bool,
    /// Pass as `before` to fetch the next older window.
    pub next_before: Option<MessageId>,
}

/// Formats timestamps the way they are stored and relayed.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
