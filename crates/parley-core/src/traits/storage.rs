// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store-of-record contract for conversations and messages.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Conversation, ConversationId, ConversationLink, Message, MessageId, MessagePage, NewMessage,
    PageRequest, Participant, UserId,
};

/// Persistence backend for the conversation engine.
///
/// Implementations must make [`insert_message`](Self::insert_message) and
/// [`mark_read`](Self::mark_read) atomic with their conversation counter
/// updates.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the backend (migrations, pragmas).
    async fn initialize(&self) -> Result<(), ParleyError>;

    /// Closes the backend, flushing pending writes.
    async fn close(&self) -> Result<(), ParleyError>;

    /// Returns the single conversation for the pair, creating it if absent.
    ///
    /// `link` fields are recorded only where the conversation has none.
    async fn find_or_create_conversation(
        &self,
        customer_id: UserId,
        provider_id: UserId,
        link: &ConversationLink,
    ) -> Result<Conversation, ParleyError>;

    async fn get_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, ParleyError>;

    /// All conversations the user takes part in, most recent activity first.
    async fn list_conversations(&self, user: UserId) -> Result<Vec<Conversation>, ParleyError>;

    /// Persists a message and updates the conversation's preview, last
    /// activity, and the unread counter of every side that did not author it.
    async fn insert_message(&self, message: NewMessage) -> Result<Message, ParleyError>;

    async fn get_message(&self, id: MessageId) -> Result<Option<Message>, ParleyError>;

    /// Returns a window of messages in ascending id order.
    async fn list_messages(
        &self,
        conversation: ConversationId,
        page: &PageRequest,
    ) -> Result<MessagePage, ParleyError>;

    /// Stamps `reader`'s marker on every unread message the other side
    /// authored, recomputes `reader`'s unread counter, and returns the ids
    /// whose marker changed.
    async fn mark_read(
        &self,
        conversation: ConversationId,
        reader: Participant,
        at: DateTime<Utc>,
    ) -> Result<Vec<MessageId>, ParleyError>;
}
