// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client-side view of one conversation thread.
//!
//! Messages are keyed by id, so replays and re-fetches are idempotent and the
//! order never depends on arrival. Read markers only ever move from unset to
//! set.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parley_core::{Message, MessageId, Participant, TypingPayload, UserId};
use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct ThreadState {
    messages: BTreeMap<MessageId, Message>,
}

impl ThreadState {
    /// Inserts a message unless its id is known. Returns true for a new id.
    ///
    /// A known id only contributes read markers the local copy is missing.
    pub fn apply_message(&mut self, incoming: Message) -> bool {
        match self.messages.get_mut(&incoming.id) {
            Some(existing) => {
                merge_markers(existing, &incoming);
                false
            }
            None => {
                self.messages.insert(incoming.id, incoming);
                true
            }
        }
    }

    /// Merges a fetched batch. Returns the ids that were not known before, ascending.
    pub fn merge(&mut self, batch: Vec<Message>) -> Vec<MessageId> {
        let mut added: Vec<MessageId> = batch
            .into_iter()
            .filter_map(|m| {
                let id = m.id;
                self.apply_message(m).then_some(id)
            })
            .collect();
        added.sort();
        added
    }

    /// Sets `side`'s read marker on the given ids. Returns those that changed.
    pub fn apply_read(
        &mut self,
        ids: &[MessageId],
        side: Participant,
        at: DateTime<Utc>,
    ) -> Vec<MessageId> {
        ids.iter()
            .filter(|id| {
                self.messages
                    .get_mut(id)
                    .is_some_and(|m| m.mark_read_by(side, at))
            })
            .copied()
            .collect()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.values().cloned().collect()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.get(&id)
    }

    pub fn latest_id(&self) -> Option<MessageId> {
        self.messages.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

fn merge_markers(existing: &mut Message, incoming: &Message) {
    for side in [Participant::Customer, Participant::Provider] {
        if let Some(at) = incoming.read_at(side) {
            existing.mark_read_by(side, at);
        }
    }
}

/// Someone currently shown as typing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypingUser {
    pub user_id: UserId,
    pub user_name: String,
}

/// Typing indicators that clear themselves after `window` without news.
#[derive(Debug, Clone)]
pub struct TypingSet {
    window: Duration,
    entries: HashMap<UserId, (String, Instant)>,
}

impl TypingSet {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: HashMap::new(),
        }
    }

    /// Applies a typing event. Returns true if the visible set changed.
    pub fn apply(&mut self, payload: &TypingPayload, now: Instant) -> bool {
        if payload.is_typing {
            let expires = now + self.window;
            self.entries
                .insert(payload.user_id, (payload.user_name.clone(), expires))
                .is_none()
        } else {
            self.entries.remove(&payload.user_id).is_some()
        }
    }

    pub fn remove(&mut self, user: UserId) -> bool {
        self.entries.remove(&user).is_some()
    }

    /// Drops entries whose window has passed. Returns true if any were dropped.
    pub fn expire(&mut self, now: Instant) -> bool {
        let before = self.entries.len();
        self.entries.retain(|_, (_, expires)| *expires > now);
        self.entries.len() != before
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|(_, expires)| *expires).min()
    }

    pub fn users(&self) -> Vec<TypingUser> {
        let mut users: Vec<TypingUser> = self
            .entries
            .iter()
            .map(|(id, (name, _))| TypingUser {
                user_id: *id,
                user_name: name.clone(),
            })
            .collect();
        users.sort_by_key(|u| u.user_id);
        users
    }

    pub fn clear(&mut self) -> bool {
        let had = !self.entries.is_empty();
        self.entries.clear();
        had
    }
}
