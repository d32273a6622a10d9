// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message persistence, paging, and read markers.

use chrono::{DateTime, Utc};
use parley_core::{
    ConversationId, Message, MessageId, MessagePage, NewMessage, PageRequest, ParleyError,
    Participant, Role,
};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{BodyColumns, MESSAGE_COLUMNS, message_from_row, ts};

/// Insert a message and update the conversation in the same transaction.
///
/// The preview and last activity follow the new message. Every side that did
/// not author it gets `unread + 1`; system and administrator messages count
/// for both sides.
pub async fn insert(db: &Database, new: NewMessage) -> Result<Message, ParleyError> {
    let columns = BodyColumns::from_body(&new.body).map_err(|e| ParleyError::Storage {
        source: Box::new(e),
    })?;
    let preview = new.body.preview();
    let bump_customer = i64::from(new.sender_role != Role::Customer);
    let bump_provider = i64::from(new.sender_role != Role::Provider);

    db.connection()
        .call(move |conn| -> Result<Message, rusqlite::Error> {
            let created_at = ts(&new.created_at);
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages
                     (conversation_id, sender_id, sender_role, kind, content, formatted_content,
                      file_url, file_name, mime_type, file_size, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    new.conversation_id.0,
                    new.sender_id.map(|u| u.0),
                    new.sender_role.to_string(),
                    columns.kind,
                    columns.content,
                    new.formatted_content,
                    columns.file_url,
                    columns.file_name,
                    columns.mime_type,
                    columns.file_size,
                    columns.metadata,
                    created_at,
                ],
            )?;
            let id = tx.last_insert_rowid();

            tx.execute(
                "UPDATE conversations
                 SET last_message_preview = ?2,
                     last_message_at = ?3,
                     updated_at = ?3,
                     unread_customer = unread_customer + ?4,
                     unread_provider = unread_provider + ?5
                 WHERE id = ?1",
                params![
                    new.conversation_id.0,
                    preview,
                    created_at,
                    bump_customer,
                    bump_provider
                ],
            )?;

            let message = tx.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id],
                message_from_row,
            )?;
            tx.commit()?;
            Ok(message)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: MessageId) -> Result<Option<Message>, ParleyError> {
    db.connection()
        .call(move |conn| -> Result<Option<Message>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.0],
                message_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// One window of messages, oldest first.
///
/// Reads `limit + 1` rows newest-first below the cursor to learn whether an
/// older window exists, then reverses.
pub async fn list(
    db: &Database,
    conversation: ConversationId,
    page: &PageRequest,
) -> Result<MessagePage, ParleyError> {
    let limit = page.limit.max(1) as usize;
    let before = page.before.map(|m| m.0);

    db.connection()
        .call(move |conn| -> Result<MessagePage, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1 AND (?2 IS NULL OR id < ?2)
                 ORDER BY id DESC
                 LIMIT ?3"
            ))?;
            let rows = stmt.query_map(
                params![conversation.0, before, (limit + 1) as i64],
                message_from_row,
            )?;
            let mut messages = rows.collect::<Result<Vec<_>, _>>()?;

            let has_more = messages.len() > limit;
            messages.truncate(limit);
            messages.reverse();

            let next_before = if has_more {
                messages.first().map(|m| m.id)
            } else {
                None
            };
            Ok(MessagePage {
                messages,
                has_more,
                next_before,
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Stamp `reader`'s marker on every unread message the reader did not author
/// and recompute the reader's unread counter from the rows.
///
/// Returns the ids that changed, ascending. Already-read messages keep their
/// original timestamp.
pub async fn mark_read(
    db: &Database,
    conversation: ConversationId,
    reader: Participant,
    at: DateTime<Utc>,
) -> Result<Vec<MessageId>, ParleyError> {
    let (marker, counter) = match reader {
        Participant::Customer => ("read_by_customer_at", "unread_customer"),
        Participant::Provider => ("read_by_provider_at", "unread_provider"),
    };
    let reader_role = reader.role().to_string();

    db.connection()
        .call(move |conn| -> Result<Vec<MessageId>, rusqlite::Error> {
            let read_at = ts(&at);
            let tx = conn.transaction()?;

            let ids = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT id FROM messages
                     WHERE conversation_id = ?1 AND sender_role != ?2 AND {marker} IS NULL
                     ORDER BY id ASC"
                ))?;
                let rows = stmt.query_map(params![conversation.0, reader_role], |row| {
                    row.get::<_, i64>(0).map(MessageId)
                })?;
                rows.collect::<Result<Vec<_>, _>>()?
            };

            if !ids.is_empty() {
                tx.execute(
                    &format!(
                        "UPDATE messages SET {marker} = ?3
                         WHERE conversation_id = ?1 AND sender_role != ?2 AND {marker} IS NULL"
                    ),
                    params![conversation.0, reader_role, read_at],
                )?;
            }

            tx.execute(
                &format!(
                    "UPDATE conversations
                     SET {counter} = (
                         SELECT COUNT(*) FROM messages
                         WHERE conversation_id = ?1 AND sender_role != ?2 AND {marker} IS NULL
                     )
                     WHERE id = ?1"
                ),
                params![conversation.0, reader_role],
            )?;

            tx.commit()?;
            Ok(ids)
        })
        .await
        .map_err(map_tr_err)
}
