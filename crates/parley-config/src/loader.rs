// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Lookup order: `./parley.toml` > `~/.config/parley/parley.toml` > `/etc/parley/parley.toml`,
//! with environment variable overrides via the `PARLEY_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ParleyConfig;

pub(crate) const SYSTEM_CONFIG_PATH: &str = "/etc/parley/parley.toml";
pub(crate) const LOCAL_CONFIG_PATH: &str = "parley.toml";

/// Section prefixes for env var mapping, longest first so nested sections win.
const ENV_SECTIONS: &[(&str, &str)] = &[
    ("broadcast_native_", "broadcast.native."),
    ("broadcast_relay_", "broadcast.relay."),
    ("broadcast_", "broadcast."),
    ("server_", "server."),
    ("storage_", "storage."),
    ("messaging_", "messaging."),
    ("attachments_", "attachments."),
    ("typing_", "typing."),
];

pub(crate) fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("parley/parley.toml"))
        .unwrap_or_default()
}

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/parley/parley.toml` (system-wide)
/// 3. `~/.config/parley/parley.toml` (user config)
/// 4. `./parley.toml` (local directory)
/// 5. `PARLEY_*` environment variables
pub fn load_config() -> Result<ParleyConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no file lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<ParleyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ParleyConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ParleyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ParleyConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment behind [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ParleyConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Env provider with explicit section mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `PARLEY_BROADCAST_RELAY_SERVICE_KEY` must become
/// `broadcast.relay.service_key`.
fn env_provider() -> Env {
    Env::prefixed("PARLEY_").map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    for (prefix, section) in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(prefix) {
            return format!("{section}{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DriverKind;

    #[test]
    fn env_keys_map_to_nested_sections() {
        assert_eq!(
            map_env_key("broadcast_relay_service_key"),
            "broadcast.relay.service_key"
        );
        assert_eq!(map_env_key("broadcast_driver"), "broadcast.driver");
        assert_eq!(map_env_key("server_bearer_token"), "server.bearer_token");
        assert_eq!(map_env_key("log_level"), "log_level");
    }

    #[test]
    fn env_overrides_file_values() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "parley.toml",
                r#"
[broadcast]
driver = "native"
"#,
            )?;
            jail.set_env("PARLEY_BROADCAST_DRIVER", "relay");
            jail.set_env("PARLEY_BROADCAST_RELAY_URL", "https://rt.example.com");
            jail.set_env("PARLEY_SERVER_PORT", "8181");

            let config = load_config_from_path(Path::new("parley.toml"))?;
            assert_eq!(config.broadcast.driver, DriverKind::Relay);
            assert_eq!(
                config.broadcast.relay.url.as_deref(),
                Some("https://rt.example.com")
            );
            assert_eq!(config.server.port, 8181);
            Ok(())
        });
    }
}
