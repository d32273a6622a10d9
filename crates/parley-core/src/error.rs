// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Parley conversation engine.
//!
//! Persistence and authorization failures propagate to callers untouched.
//! [`ParleyError::Transport`] is the exception: it is produced by broadcast
//! drivers and client transports and is always caught at that boundary.

use thiserror::Error;

/// The primary error type used across all Parley crates.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Configuration errors (invalid TOML, missing required fields, bad driver settings).
    #[error("configuration error: {0}")]
    Config(String),

    /// Caller input was rejected (empty content, oversized attachment, malformed metadata).
    #[error("validation failed for `{field}`: {reason}")]
    Validation { field: String, reason: String },

    /// The request carried no usable identity.
    #[error("unauthorized")]
    Unauthorized,

    /// The actor is not a participant of the target conversation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The entity does not exist or is not visible to the actor.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Realtime transport errors (relay HTTP failure, closed socket hub).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Shorthand for a field-level validation failure.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a missing entity.
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for a transport failure without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Returns true for errors produced by persistence, which callers surface
    /// as "failed to send" / "failed to load" and may retry.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}
