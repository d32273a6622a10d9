// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! External relay driver.
//!
//! Inserts each event as a row into the mailbox table of a hosted realtime
//! database over its REST interface (`POST {url}/rest/v1/{table}`). Clients
//! read the table forward by row id.

use std::time::Duration;

use async_trait::async_trait;
use parley_config::model::RelayConfig;
use parley_core::{
    AdapterType, BroadcastDriver, Envelope, HealthStatus, ParleyError, PluginAdapter,
};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::{debug, warn};
use url::Url;

/// Relay-table inserts over HTTPS.
#[derive(Debug, Clone)]
pub struct RelayDriver {
    client: reqwest::Client,
    /// `None` when the URL or service key is missing; the driver is then never ready.
    endpoint: Option<Url>,
    timeout: Duration,
}

impl RelayDriver {
    /// Builds the HTTP client with auth headers and the configured timeout.
    ///
    /// A missing URL or key is not an error here: the driver is constructed
    /// unready and every publish is skipped.
    pub fn new(config: &RelayConfig) -> Result<Self, ParleyError> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let url = config
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty());
        let key = config
            .service_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());

        let mut headers = HeaderMap::new();
        headers.insert("prefer", HeaderValue::from_static("return=minimal"));
        if let Some(key) = key {
            headers.insert(
                "apikey",
                HeaderValue::from_str(key).map_err(|e| {
                    ParleyError::Config(format!("invalid relay service key header value: {e}"))
                })?,
            );
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                    ParleyError::Config(format!("invalid relay authorization header value: {e}"))
                })?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ParleyError::Transport {
                message: format!("failed to build relay HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        let endpoint = match (url, key) {
            (Some(url), Some(_)) => table_endpoint(url, &config.table),
            _ => None,
        };

        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_ref().map(Url::as_str)
    }
}

/// `{url}/rest/v1/{table}`, or `None` (logged) when `url` is not usable.
fn table_endpoint(url: &str, table: &str) -> Option<Url> {
    let mut endpoint = match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => parsed,
        Ok(_) => {
            warn!(%url, "relay url is not an http(s) URL; relay driver disabled");
            return None;
        }
        Err(e) => {
            warn!(%url, error = %e, "invalid relay url; relay driver disabled");
            return None;
        }
    };
    endpoint
        .path_segments_mut()
        .ok()?
        .pop_if_empty()
        .extend(["rest", "v1", table]);
    Some(endpoint)
}

#[async_trait]
impl PluginAdapter for RelayDriver {
    fn name(&self) -> &str {
        "relay"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Broadcast
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(match &self.endpoint {
            Some(_) => HealthStatus::Healthy,
            None => HealthStatus::Unhealthy("relay url or service key missing".into()),
        })
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl BroadcastDriver for RelayDriver {
    fn is_ready(&self) -> bool {
        self.endpoint.is_some()
    }

    async fn deliver(&self, envelope: &Envelope) -> Result<(), ParleyError> {
        let Some(endpoint) = &self.endpoint else {
            return Err(ParleyError::transport("relay driver not configured"));
        };
        let row = envelope.to_relay_row()?;

        let response = self
            .client
            .post(endpoint.clone())
            .json(&row)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ParleyError::Timeout {
                        duration: self.timeout,
                    }
                } else {
                    ParleyError::Transport {
                        message: format!("relay request failed: {e}"),
                        source: Some(Box::new(e)),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ParleyError::transport(format!(
                "relay returned {status}: {body}"
            )));
        }

        debug!(
            channel = %row.channel,
            event_type = %row.event_type,
            "relay row inserted"
        );
        Ok(())
    }
}
