// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley check-config`: print the effective settings and anything that
//! would leave the server running but degraded.

use std::fmt::Write as _;

use parley_config::model::{DriverKind, ParleyConfig};

/// Conditions that are valid configuration but worth flagging.
pub fn readiness_warnings(config: &ParleyConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.server.bearer_token.is_none() {
        warnings.push("server.bearer_token is not set; the API will refuse every request".into());
    }

    match config.broadcast.driver {
        DriverKind::None => warnings.push(
            "broadcast.driver is `none`; clients only see new messages by polling".into(),
        ),
        DriverKind::Relay => {
            if config.broadcast.relay.anon_key.is_none() {
                warnings.push(
                    "broadcast.relay.anon_key is not set; clients cannot be handed read credentials"
                        .into(),
                );
            }
        }
        DriverKind::Native => {
            if config.server.allowed_origins.is_empty() {
                warnings.push(
                    "server.allowed_origins is empty; browsers on other origins cannot reach /ws"
                        .into(),
                );
            }
        }
    }

    warnings
}

/// Human-readable report for `parley check-config`.
pub fn render_summary(config: &ParleyConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "listen:    {}:{}", config.server.host, config.server.port);
    let _ = writeln!(out, "database:  {}", config.storage.database_path);
    let _ = writeln!(out, "driver:    {}", config.broadcast.driver);
    let _ = writeln!(out, "log level: {}", config.log_level);

    let warnings = readiness_warnings(config);
    if warnings.is_empty() {
        out.push_str("config OK\n");
    } else {
        for warning in &warnings {
            let _ = writeln!(out, "warning: {warning}");
        }
        let _ = writeln!(out, "config OK with {} warning(s)", warnings.len());
    }
    out
}
