// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Parley conversation engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Parley configuration.
///
/// Every section is optional and defaults to values suitable for a single
/// local instance with realtime broadcasting disabled.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParleyConfig {
    /// HTTP/WebSocket listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Store-of-record settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Realtime broadcast driver selection.
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    #[serde(default)]
    pub messaging: MessagingConfig,

    #[serde(default)]
    pub attachments: AttachmentConfig,

    #[serde(default)]
    pub typing: TypingConfig,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            broadcast: BroadcastConfig::default(),
            messaging: MessagingConfig::default(),
            attachments: AttachmentConfig::default(),
            typing: TypingConfig::default(),
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// HTTP/WebSocket listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind the gateway to.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Service token the upstream identity provider presents.
    /// Without one, every API request is rejected.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Origins allowed by CORS. Empty means same-origin only.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            bearer_token: None,
            allowed_origins: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("parley").join("parley.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("parley.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Which broadcast driver to construct at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// Publish nothing. Clients fall back to polling.
    #[default]
    None,
    /// In-process hub served over the gateway WebSocket.
    Native,
    /// Insert rows into an external realtime database.
    Relay,
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DriverKind::None => "none",
            DriverKind::Native => "native",
            DriverKind::Relay => "relay",
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BroadcastConfig {
    #[serde(default)]
    pub driver: DriverKind,

    #[serde(default)]
    pub native: NativeConfig,

    #[serde(default)]
    pub relay: RelayConfig,
}

/// In-process hub settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NativeConfig {
    /// Buffered events per channel before slow subscribers start lagging.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> usize {
    256
}

/// External realtime database settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Base URL of the realtime database, e.g. `https://xyz.example.co`.
    #[serde(default)]
    pub url: Option<String>,

    /// Server-side key used for inserts.
    #[serde(default)]
    pub service_key: Option<String>,

    /// Public key handed to clients for read-only polling.
    #[serde(default)]
    pub anon_key: Option<String>,

    /// Mailbox table name.
    #[serde(default = "default_relay_table")]
    pub table: String,

    #[serde(default = "default_relay_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: None,
            service_key: None,
            anon_key: None,
            table: default_relay_table(),
            timeout_ms: default_relay_timeout_ms(),
        }
    }
}

fn default_relay_table() -> String {
    "broadcast_events".to_string()
}

fn default_relay_timeout_ms() -> u64 {
    5000
}

/// Message content limits and paging.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MessagingConfig {
    /// Maximum characters in a message body.
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            max_content_length: default_max_content_length(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_max_content_length() -> usize {
    5000
}

fn default_page_size() -> u32 {
    50
}

fn default_max_page_size() -> u32 {
    200
}

/// Limits applied to attachment references before they are stored.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AttachmentConfig {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,

    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            allowed_mime_types: default_allowed_mime_types(),
        }
    }
}

fn default_max_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_allowed_mime_types() -> Vec<String> {
    [
        "image/jpeg",
        "image/png",
        "image/gif",
        "image/webp",
        "application/pdf",
        "application/msword",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "text/plain",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Typing indicator timing shared by producers and consumers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TypingConfig {
    /// Silence after the last keystroke before a stop signal is sent.
    #[serde(default = "default_quiet_window_ms")]
    pub quiet_window_ms: u64,

    /// Minimum interval between repeated start signals during a burst.
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,

    /// How long a consumer keeps showing a typing indicator without news.
    #[serde(default = "default_expiry_ms")]
    pub expiry_ms: u64,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            quiet_window_ms: default_quiet_window_ms(),
            refresh_ms: default_refresh_ms(),
            expiry_ms: default_expiry_ms(),
        }
    }
}

fn default_quiet_window_ms() -> u64 {
    3000
}

fn default_refresh_ms() -> u64 {
    2000
}

fn default_expiry_ms() -> u64 {
    3000
}
