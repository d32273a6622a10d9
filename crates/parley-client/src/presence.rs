// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Best-effort online roster built from presence events.
//!
//! Presence can be stale or arrive out of order; an update older than what
//! the roster already holds for that user is ignored.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parley_core::{PresencePayload, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub user_name: String,
    pub is_online: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct PresenceRoster {
    entries: HashMap<UserId, PresenceEntry>,
}

impl PresenceRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the update was newer than what we had.
    pub fn apply(&mut self, update: &PresencePayload) -> bool {
        if let Some(current) = self.entries.get(&update.user_id)
            && current.at > update.at
        {
            return false;
        }
        self.entries.insert(
            update.user_id,
            PresenceEntry {
                user_name: update.user_name.clone(),
                is_online: update.is_online,
                at: update.at,
            },
        );
        true
    }

    /// `None` when nothing was ever heard about the user.
    pub fn is_online(&self, user: UserId) -> Option<bool> {
        self.entries.get(&user).map(|e| e.is_online)
    }

    pub fn get(&self, user: UserId) -> Option<&PresenceEntry> {
        self.entries.get(&user)
    }

    pub fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_online)
            .map(|(id, _)| *id)
            .collect();
        users.sort();
        users
    }
}
