// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use parley_core::{Actor, BroadcastDriver, ParleyError};
use tracing::debug;

/// Relays best-effort online/offline signals on the global presence channel.
pub struct PresenceTracker {
    driver: Arc<dyn BroadcastDriver>,
}

impl PresenceTracker {
    pub fn new(driver: Arc<dyn BroadcastDriver>) -> Self {
        Self { driver }
    }

    pub async fn set_presence(&self, actor: &Actor, is_online: bool) -> Result<(), ParleyError> {
        if actor.role.participant().is_none() {
            return Err(ParleyError::Forbidden(format!(
                "role `{}` has no presence",
                actor.role
            )));
        }
        debug!(user_id = actor.id.0, is_online, "presence changed");
        self.driver.publish_presence(actor, is_online).await;
        Ok(())
    }
}
