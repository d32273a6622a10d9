// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parley conversation engine.
//!
//! This crate provides the domain types, the realtime event envelope, the
//! error taxonomy, and the adapter traits (store and broadcast driver) used
//! throughout the workspace.

pub mod error;
pub mod event;
pub mod socket;
pub mod traits;
pub mod types;

pub use error::ParleyError;
pub use event::{
    Envelope, EventType, MessagePayload, PRESENCE_CHANNEL, PresencePayload, ReadPayload,
    RealtimeEvent, RelayRow, TypingPayload, conversation_channel, parse_conversation_channel,
};
pub use socket::{ClientFrame, ServerFrame};
pub use types::{
    ActionButton, Actor, AdapterType, Attachment, BookingRef, ButtonAction, Conversation,
    ConversationId, ConversationLink, ConversationSummary, HealthStatus, Message, MessageBody,
    MessageId, MessageKind, MessagePage, NewMessage, PageRequest, Participant, Role, UserId,
};

pub use traits::{BroadcastDriver, PluginAdapter, StorageAdapter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_variants_render() {
        let v = ParleyError::validation("content", "must not be empty");
        assert_eq!(
            v.to_string(),
            "validation failed for `content`: must not be empty"
        );

        let nf = ParleyError::not_found("conversation", ConversationId(9));
        assert_eq!(nf.to_string(), "conversation 9 not found");

        let storage = ParleyError::Storage {
            source: Box::new(std::io::Error::other("disk full")),
        };
        assert!(storage.is_storage());
        assert!(!ParleyError::Unauthorized.is_storage());

        let _timeout = ParleyError::Timeout {
            duration: std::time::Duration::from_secs(5),
        };
    }

    #[test]
    fn adapter_type_round_trips() {
        use std::str::FromStr;

        for variant in [AdapterType::Storage, AdapterType::Broadcast] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn participant_helpers() {
        assert_eq!(Participant::Customer.other(), Participant::Provider);
        assert_eq!(Participant::Provider.role(), Role::Provider);
        assert_eq!(Role::Customer.participant(), Some(Participant::Customer));
        assert_eq!(Role::System.participant(), None);
    }

    #[test]
    fn traits_are_object_safe() {
        fn _storage(_: &dyn StorageAdapter) {}
        fn _broadcast(_: &dyn BroadcastDriver) {}
    }
}
