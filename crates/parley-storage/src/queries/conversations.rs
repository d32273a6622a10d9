// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation lookups and lazy creation.

use chrono::Utc;
use parley_core::{Conversation, ConversationId, ConversationLink, ParleyError, UserId};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{CONVERSATION_COLUMNS, conversation_from_row, ts};

/// Return the pair's conversation, inserting it first if it does not exist.
///
/// `INSERT .. ON CONFLICT DO NOTHING` plus a re-read keeps this safe under
/// concurrent callers: the UNIQUE constraint decides the winner and everyone
/// reads the same row. Link fields only fill in blanks.
pub async fn find_or_create(
    db: &Database,
    customer: UserId,
    provider: UserId,
    link: &ConversationLink,
) -> Result<Conversation, ParleyError> {
    let link = link.clone();
    db.connection()
        .call(move |conn| -> Result<Conversation, rusqlite::Error> {
            let now = ts(&Utc::now());
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO conversations
                     (customer_id, provider_id, booking_id, service_name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT (customer_id, provider_id) DO NOTHING",
                params![customer.0, provider.0, link.booking_id, link.service_name, now],
            )?;
            if link.booking_id.is_some() || link.service_name.is_some() {
                tx.execute(
                    "UPDATE conversations
                     SET booking_id = COALESCE(booking_id, ?3),
                         service_name = COALESCE(service_name, ?4)
                     WHERE customer_id = ?1 AND provider_id = ?2",
                    params![customer.0, provider.0, link.booking_id, link.service_name],
                )?;
            }
            let conversation = tx.query_row(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE customer_id = ?1 AND provider_id = ?2"
                ),
                params![customer.0, provider.0],
                conversation_from_row,
            )?;
            tx.commit()?;
            Ok(conversation)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: ConversationId) -> Result<Option<Conversation>, ParleyError> {
    db.connection()
        .call(move |conn| -> Result<Option<Conversation>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                params![id.0],
                conversation_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Every conversation the user belongs to, most recent activity first.
///
/// Conversations without messages sort by creation time; ties break on id.
pub async fn list_for_user(db: &Database, user: UserId) -> Result<Vec<Conversation>, ParleyError> {
    db.connection()
        .call(move |conn| -> Result<Vec<Conversation>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE customer_id = ?1 OR provider_id = ?1
                 ORDER BY COALESCE(last_message_at, created_at) DESC, id DESC"
            ))?;
            let rows = stmt.query_map(params![user.0], conversation_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
