// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation services for the Parley engine.
//!
//! [`Engine`] wires the conversation resolver, message service, typing
//! coordinator and presence tracker to one store and one broadcast driver.
//! Every service takes the authenticated [`Actor`](parley_core::Actor)
//! explicitly; nothing here reads ambient identity.

pub mod attachments;
pub mod format;
pub mod presence;
pub mod resolver;
pub mod service;
pub mod typing;
pub mod validate;

use std::sync::Arc;

use parley_config::model::ParleyConfig;
use parley_core::{BroadcastDriver, StorageAdapter};

pub use attachments::{AttachmentPolicy, AttachmentUpload};
pub use format::format_content;
pub use presence::PresenceTracker;
pub use resolver::ConversationResolver;
pub use service::MessageService;
pub use typing::TypingCoordinator;

/// All conversation services sharing one store and one driver.
pub struct Engine {
    pub conversations: ConversationResolver,
    pub messages: MessageService,
    pub typing: TypingCoordinator,
    pub presence: PresenceTracker,
    driver: Arc<dyn BroadcastDriver>,
}

impl Engine {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        driver: Arc<dyn BroadcastDriver>,
        config: &ParleyConfig,
    ) -> Self {
        let conversations = ConversationResolver::new(storage);
        Self {
            messages: MessageService::new(conversations.clone(), Arc::clone(&driver), config),
            typing: TypingCoordinator::new(conversations.clone(), Arc::clone(&driver)),
            presence: PresenceTracker::new(Arc::clone(&driver)),
            conversations,
            driver,
        }
    }

    pub fn driver(&self) -> &Arc<dyn BroadcastDriver> {
        &self.driver
    }
}
