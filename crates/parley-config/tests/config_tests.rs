// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Parley configuration system.

use parley_config::diagnostic::ConfigError;
use parley_config::model::DriverKind;
use parley_config::{load_and_validate_str, load_config_from_str};

#[test]
fn full_toml_deserializes() {
    let toml = r#"
log_level = "debug"

[server]
host = "0.0.0.0"
port = 8080
bearer_token = "svc-token"
allowed_origins = ["https://app.example.com"]

[storage]
database_path = "/tmp/parley.db"
wal_mode = false

[broadcast]
driver = "relay"

[broadcast.relay]
url = "https://rt.example.com"
service_key = "service"
anon_key = "anon"
table = "events"
timeout_ms = 2500

[messaging]
max_content_length = 2000
default_page_size = 30
max_page_size = 100

[attachments]
max_bytes = 1048576
allowed_mime_types = ["image/png"]

[typing]
quiet_window_ms = 4000
refresh_ms = 1500
expiry_ms = 4000
"#;

    let config = load_and_validate_str(toml).expect("valid config");
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.bearer_token.as_deref(), Some("svc-token"));
    assert!(!config.storage.wal_mode);
    assert_eq!(config.broadcast.driver, DriverKind::Relay);
    assert_eq!(config.broadcast.relay.table, "events");
    assert_eq!(config.broadcast.relay.timeout_ms, 2500);
    assert_eq!(config.messaging.max_content_length, 2000);
    assert_eq!(config.attachments.max_bytes, 1_048_576);
    assert_eq!(config.attachments.allowed_mime_types, vec!["image/png"]);
    assert_eq!(config.typing.refresh_ms, 1500);
}

#[test]
fn defaults_apply_when_empty() {
    let config = load_config_from_str("").expect("empty config is valid");
    assert_eq!(config.broadcast.driver, DriverKind::None);
    assert_eq!(config.broadcast.relay.timeout_ms, 5000);
    assert_eq!(config.broadcast.relay.table, "broadcast_events");
    assert_eq!(config.attachments.max_bytes, 5 * 1024 * 1024);
    assert_eq!(config.typing.quiet_window_ms, 3000);
    assert_eq!(config.typing.expiry_ms, 3000);
    assert!(config.server.bearer_token.is_none());
}

#[test]
fn unknown_key_gets_suggestion() {
    let toml = r#"
[broadcast]
drvier = "native"
"#;

    let errors = load_and_validate_str(toml).expect_err("unknown key");
    assert!(errors.iter().any(|e| matches!(
        e,
        ConfigError::UnknownKey { key, suggestion: Some(s), .. } if key == "drvier" && s == "driver"
    )));
}

#[test]
fn unknown_driver_is_reported() {
    let toml = r#"
[broadcast]
driver = "pusher"
"#;
    let errors = load_and_validate_str(toml).expect_err("bad driver");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { .. } | ConfigError::Other(_)))
    );
}

#[test]
fn wrong_type_is_reported() {
    let toml = r#"
[server]
port = "eighty"
"#;
    let errors = load_and_validate_str(toml).expect_err("bad type");
    assert!(matches!(&errors[0], ConfigError::InvalidType { .. }));
}

#[test]
fn relay_without_key_fails_validation() {
    let toml = r#"
[broadcast]
driver = "relay"

[broadcast.relay]
url = "https://rt.example.com"
"#;
    let errors = load_and_validate_str(toml).expect_err("missing key");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("service_key"));
}
