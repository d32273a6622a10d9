// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server side of typing indicators: a participant check and a relay.
//!
//! Debounce and expiry live on the clients; nothing here keeps timers.

use std::sync::Arc;

use parley_core::{Actor, BroadcastDriver, ConversationId, ParleyError};
use tracing::trace;

use crate::resolver::ConversationResolver;

pub struct TypingCoordinator {
    resolver: ConversationResolver,
    driver: Arc<dyn BroadcastDriver>,
}

impl TypingCoordinator {
    pub fn new(resolver: ConversationResolver, driver: Arc<dyn BroadcastDriver>) -> Self {
        Self { resolver, driver }
    }

    /// Relays a typing start or stop to the other participant.
    ///
    /// Returns immediately, without a store lookup, when the driver cannot
    /// publish anyway.
    pub async fn set_typing(
        &self,
        conversation_id: ConversationId,
        actor: &Actor,
        is_typing: bool,
    ) -> Result<(), ParleyError> {
        if !self.driver.is_ready() {
            trace!(
                conversation_id = conversation_id.0,
                "typing ignored, broadcast driver not ready"
            );
            return Ok(());
        }
        self.resolver
            .require_participant(actor, conversation_id)
            .await?;
        self.driver
            .publish_typing(conversation_id, actor, is_typing)
            .await;
        Ok(())
    }
}
