// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation resolution and participant checks.

use std::sync::Arc;

use parley_core::{
    Actor, Conversation, ConversationId, ConversationLink, ConversationSummary, ParleyError,
    Participant, StorageAdapter, UserId,
};
use tracing::debug;

/// Finds or creates the single conversation between a customer and a provider.
#[derive(Clone)]
pub struct ConversationResolver {
    storage: Arc<dyn StorageAdapter>,
}

impl ConversationResolver {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    /// The conversation between `actor` and `counterparty`, created on first use.
    ///
    /// The actor's role decides which side they sit on. Concurrent calls for
    /// the same pair return the same row. A `link` only fills tags that are
    /// still empty on an existing conversation.
    pub async fn get_or_create(
        &self,
        actor: &Actor,
        counterparty: UserId,
        link: &ConversationLink,
    ) -> Result<Conversation, ParleyError> {
        let side = participant_side(actor)?;
        if counterparty.0 <= 0 {
            return Err(ParleyError::validation(
                "counterparty_id",
                "must be a positive user id",
            ));
        }
        if counterparty == actor.id {
            return Err(ParleyError::validation(
                "counterparty_id",
                "cannot open a conversation with yourself",
            ));
        }
        if let Some(booking_id) = link.booking_id
            && booking_id <= 0
        {
            return Err(ParleyError::validation("booking_id", "must be a positive id"));
        }

        let (customer, provider) = match side {
            Participant::Customer => (actor.id, counterparty),
            Participant::Provider => (counterparty, actor.id),
        };
        let conversation = self
            .storage
            .find_or_create_conversation(customer, provider, link)
            .await?;
        debug!(
            conversation_id = conversation.id.0,
            customer_id = customer.0,
            provider_id = provider.0,
            "conversation resolved"
        );
        Ok(conversation)
    }

    /// The actor's inbox, most recently active first.
    pub async fn list(&self, actor: &Actor) -> Result<Vec<ConversationSummary>, ParleyError> {
        let side = participant_side(actor)?;
        let conversations = self.storage.list_conversations(actor.id).await?;
        Ok(conversations
            .iter()
            .filter(|c| c.side_of(actor.id) == Some(side))
            .map(|c| ConversationSummary::for_viewer(c, side))
            .collect())
    }

    pub async fn get(&self, actor: &Actor, id: ConversationId) -> Result<Conversation, ParleyError> {
        self.require_participant(actor, id).await.map(|(c, _)| c)
    }

    /// Loads the conversation and the actor's side of it.
    ///
    /// `NotFound` if it does not exist, `Forbidden` if the actor is not the
    /// participant their role claims.
    pub async fn require_participant(
        &self,
        actor: &Actor,
        id: ConversationId,
    ) -> Result<(Conversation, Participant), ParleyError> {
        let side = participant_side(actor)?;
        let conversation = self
            .storage
            .get_conversation(id)
            .await?
            .ok_or_else(|| ParleyError::not_found("conversation", id))?;
        match conversation.side_of(actor.id) {
            Some(s) if s == side => Ok((conversation, side)),
            _ => Err(ParleyError::Forbidden(format!(
                "user {} is not a participant of conversation {id}",
                actor.id
            ))),
        }
    }

    pub(crate) fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }
}

pub(crate) fn participant_side(actor: &Actor) -> Result<Participant, ParleyError> {
    actor.role.participant().ok_or_else(|| {
        ParleyError::Forbidden(format!(
            "role `{}` cannot take part in conversations",
            actor.role
        ))
    })
}
