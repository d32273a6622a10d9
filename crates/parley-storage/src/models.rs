// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row mapping between SQLite and the domain types in `parley-core`.
//!
//! A message body is spread over typed columns (`kind`, `content`, the
//! `file_*` columns) plus a JSON `metadata` column holding the booking
//! reference and action buttons.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use parley_core::types::format_timestamp;
use parley_core::{
    ActionButton, Attachment, BookingRef, Conversation, ConversationId, Message, MessageBody,
    MessageId, MessageKind, Role, UserId,
};
use rusqlite::Row;
use rusqlite::types::Type;
use serde::{Deserialize, Serialize};

pub use parley_core::{MessagePage, NewMessage, PageRequest};

pub(crate) const CONVERSATION_COLUMNS: &str = "id, customer_id, provider_id, booking_id, service_name, \
     last_message_preview, last_message_at, unread_customer, unread_provider, created_at, updated_at";

pub(crate) const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, sender_role, kind, content, \
     formatted_content, file_url, file_name, mime_type, file_size, metadata, \
     read_by_customer_at, read_by_provider_at, created_at";

/// JSON stored in `messages.metadata`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    booking: Option<BookingRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    buttons: Vec<ActionButton>,
}

/// Column values for one message body.
pub(crate) struct BodyColumns {
    pub kind: &'static str,
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
    pub metadata: Option<String>,
}

impl BodyColumns {
    pub(crate) fn from_body(body: &MessageBody) -> Result<Self, serde_json::Error> {
        let meta = StoredMetadata {
            booking: body.booking().cloned(),
            buttons: body.buttons().to_vec(),
        };
        let metadata = if meta.booking.is_none() && meta.buttons.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&meta)?)
        };

        let kind = match body.kind() {
            MessageKind::Text => "text",
            MessageKind::File => "file",
            MessageKind::System => "system",
            MessageKind::BookingRequest => "booking_request",
        };

        let attachment = body.attachment();
        Ok(Self {
            kind,
            content: body.text().map(str::to_string),
            file_url: attachment.map(|a| a.url.clone()),
            file_name: attachment.map(|a| a.file_name.clone()),
            mime_type: attachment.map(|a| a.mime_type.clone()),
            file_size: attachment.map(|a| a.size_bytes as i64),
            metadata,
        })
    }
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

pub(crate) fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

pub(crate) fn parse_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| conversion_error(idx, e)),
    }
}

pub(crate) fn ts(at: &DateTime<Utc>) -> String {
    format_timestamp(at)
}

/// Maps a row selected with [`CONVERSATION_COLUMNS`].
pub(crate) fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: ConversationId(row.get(0)?),
        customer_id: UserId(row.get(1)?),
        provider_id: UserId(row.get(2)?),
        booking_id: row.get(3)?,
        service_name: row.get(4)?,
        last_message_preview: row.get(5)?,
        last_message_at: parse_opt_ts(row, 6)?,
        unread_customer: row.get(7)?,
        unread_provider: row.get(8)?,
        created_at: parse_ts(row, 9)?,
        updated_at: parse_ts(row, 10)?,
    })
}

/// Maps a row selected with [`MESSAGE_COLUMNS`].
pub(crate) fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let role_raw: String = row.get(3)?;
    let sender_role = Role::from_str(&role_raw).map_err(|e| conversion_error(3, e))?;

    let kind_raw: String = row.get(4)?;
    let kind = MessageKind::from_str(&kind_raw).map_err(|e| conversion_error(4, e))?;

    let content: Option<String> = row.get(5)?;
    let meta: StoredMetadata = match row.get::<_, Option<String>>(11)? {
        Some(raw) => serde_json::from_str(&raw).map_err(|e| conversion_error(11, e))?,
        None => StoredMetadata::default(),
    };

    let body = match kind {
        MessageKind::Text => MessageBody::Text {
            content: content.unwrap_or_default(),
            booking: meta.booking,
        },
        MessageKind::File => MessageBody::File {
            attachment: Attachment {
                url: row.get(7)?,
                file_name: row.get(8)?,
                mime_type: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
                size_bytes: row.get::<_, Option<i64>>(10)?.unwrap_or(0).max(0) as u64,
            },
            caption: content,
        },
        MessageKind::System => MessageBody::System {
            content: content.unwrap_or_default(),
            buttons: meta.buttons,
            booking: meta.booking,
        },
        MessageKind::BookingRequest => {
            let booking = meta.booking.ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    11,
                    Type::Null,
                    "booking_request message without booking metadata".into(),
                )
            })?;
            MessageBody::BookingRequest {
                content: content.unwrap_or_default(),
                booking,
                buttons: meta.buttons,
            }
        }
    };

    Ok(Message {
        id: MessageId(row.get(0)?),
        conversation_id: ConversationId(row.get(1)?),
        sender_id: row.get::<_, Option<i64>>(2)?.map(UserId),
        sender_role,
        body,
        formatted_content: row.get(6)?,
        read_by_customer_at: parse_opt_ts(row, 12)?,
        read_by_provider_at: parse_opt_ts(row, 13)?,
        created_at: parse_ts(row, 14)?,
    })
}
