// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.

use url::Url;

use crate::diagnostic::ConfigError;
use crate::model::{DriverKind, ParleyConfig};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
///
/// Collects every problem rather than stopping at the first.
pub fn validate_config(config: &ParleyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let host = config.server.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::invalid("server.host must not be empty"));
    } else if host.parse::<std::net::IpAddr>().is_err()
        && !host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        errors.push(ConfigError::invalid(format!(
            "server.host `{host}` is not a valid IP address or hostname"
        )));
    }

    if config
        .server
        .bearer_token
        .as_deref()
        .is_some_and(|t| t.trim().is_empty())
    {
        errors.push(ConfigError::invalid(
            "server.bearer_token must not be blank when set",
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::invalid("storage.database_path must not be empty"));
    }

    if !LOG_LEVELS.contains(&config.log_level.as_str()) {
        errors.push(ConfigError::invalid(format!(
            "log_level `{}` must be one of {}",
            config.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    validate_broadcast(config, &mut errors);

    let messaging = &config.messaging;
    if messaging.max_content_length == 0 {
        errors.push(ConfigError::invalid(
            "messaging.max_content_length must be at least 1",
        ));
    }
    if messaging.default_page_size == 0 || messaging.max_page_size == 0 {
        errors.push(ConfigError::invalid("messaging page sizes must be at least 1"));
    }
    if messaging.default_page_size > messaging.max_page_size {
        errors.push(ConfigError::invalid(format!(
            "messaging.default_page_size ({}) exceeds messaging.max_page_size ({})",
            messaging.default_page_size, messaging.max_page_size
        )));
    }

    if config.attachments.max_bytes == 0 {
        errors.push(ConfigError::invalid("attachments.max_bytes must be at least 1"));
    }
    for mime in &config.attachments.allowed_mime_types {
        if !mime.contains('/') {
            errors.push(ConfigError::invalid(format!(
                "attachments.allowed_mime_types entry `{mime}` is not a MIME type"
            )));
        }
    }

    let typing = &config.typing;
    if typing.quiet_window_ms == 0 || typing.expiry_ms == 0 {
        errors.push(ConfigError::invalid(
            "typing.quiet_window_ms and typing.expiry_ms must be positive",
        ));
    }
    if typing.refresh_ms >= typing.expiry_ms {
        errors.push(ConfigError::invalid(format!(
            "typing.refresh_ms ({}) must be below typing.expiry_ms ({}) or indicators flicker",
            typing.refresh_ms, typing.expiry_ms
        )));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_broadcast(config: &ParleyConfig, errors: &mut Vec<ConfigError>) {
    let broadcast = &config.broadcast;

    if broadcast.native.channel_capacity == 0 {
        errors.push(ConfigError::invalid(
            "broadcast.native.channel_capacity must be at least 1",
        ));
    }

    if broadcast.relay.timeout_ms == 0 {
        errors.push(ConfigError::invalid("broadcast.relay.timeout_ms must be positive"));
    }

    if broadcast.driver != DriverKind::Relay {
        return;
    }

    match broadcast.relay.url.as_deref().map(str::trim) {
        None | Some("") => errors.push(ConfigError::invalid(
            "broadcast.relay.url is required when broadcast.driver = \"relay\"",
        )),
        Some(url) if !is_http_url(url) => errors.push(ConfigError::invalid(format!(
            "broadcast.relay.url `{url}` must be an absolute http:// or https:// URL"
        ))),
        Some(_) => {}
    }

    if broadcast
        .relay
        .service_key
        .as_deref()
        .is_none_or(|k| k.trim().is_empty())
    {
        errors.push(ConfigError::invalid(
            "broadcast.relay.service_key is required when broadcast.driver = \"relay\"",
        ));
    }

    if broadcast.relay.table.trim().is_empty() {
        errors.push(ConfigError::invalid("broadcast.relay.table must not be empty"));
    }
}

fn is_http_url(raw: &str) -> bool {
    Url::parse(raw).is_ok_and(|url| {
        matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|h| !h.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&ParleyConfig::default()).is_ok());
    }

    #[test]
    fn relay_driver_requires_url_and_key() {
        let mut config = ParleyConfig::default();
        config.broadcast.driver = DriverKind::Relay;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "broadcast.relay.url"));
        assert!(has_error(&errors, "broadcast.relay.service_key"));
    }

    #[test]
    fn relay_url_must_be_http() {
        let mut config = ParleyConfig::default();
        config.broadcast.driver = DriverKind::Relay;
        config.broadcast.relay.url = Some("ftp://rt.example.com".into());
        config.broadcast.relay.service_key = Some("svc".into());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(has_error(&errors, "absolute http"));

        for bad in ["https://", "http://:8080", "https://[::1"] {
            config.broadcast.relay.url = Some(bad.into());
            let errors = validate_config(&config).unwrap_err();
            assert!(has_error(&errors, "broadcast.relay.url"), "{bad} accepted");
        }
        config.broadcast.relay.url = Some("http://127.0.0.1:54321".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn unused_relay_settings_are_not_checked() {
        let mut config = ParleyConfig::default();
        config.broadcast.driver = DriverKind::Native;
        config.broadcast.relay.url = Some("not a url".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = ParleyConfig::default();
        config.storage.database_path = " ".into();
        config.log_level = "loud".into();
        config.typing.refresh_ms = 5000;
        config.messaging.default_page_size = 500;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(has_error(&errors, "database_path"));
        assert!(has_error(&errors, "log_level"));
        assert!(has_error(&errors, "typing.refresh_ms"));
        assert!(has_error(&errors, "default_page_size"));
    }

    #[test]
    fn blank_bearer_token_is_rejected() {
        let mut config = ParleyConfig::default();
        config.server.bearer_token = Some("   ".into());
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "bearer_token"));
    }

    #[test]
    fn attachment_limits_from_toml() {
        let toml_str = r#"
            [attachments]
            max_bytes = 0
            allowed_mime_types = ["image/png", "pdf"]
        "#;
        let config: ParleyConfig = toml::from_str(toml_str).unwrap();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(has_error(&errors, "attachments.max_bytes"));
        assert!(has_error(&errors, "`pdf` is not a MIME type"));
    }
}
