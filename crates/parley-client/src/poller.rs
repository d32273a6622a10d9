// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Forward-only reader of the relay mailbox table.
//!
//! Each subscribed channel gets its own poll task with its own cursor. The
//! cursor starts at the newest row present when the subscription opens, so
//! history is never replayed; missed rows are recovered by the subscription
//! re-fetching from the API on `Reconnected`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parley_config::model::RelayConfig;
use parley_core::{PRESENCE_CHANNEL, ParleyError, RelayRow, parse_conversation_channel};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::transport::{EventTransport, SIGNAL_BUFFER, TransportSignal};

/// Rows fetched per poll.
pub const POLL_BATCH: u32 = 100;

pub struct RelayPoller {
    client: reqwest::Client,
    endpoint: Url,
    interval: Duration,
    root: CancellationToken,
    channels: Mutex<HashMap<String, CancellationToken>>,
}

#[derive(Deserialize)]
struct IdOnly {
    id: i64,
}

impl RelayPoller {
    /// Reads with the public (anon) key, falling back to the service key.
    pub fn new(config: &RelayConfig, interval: Duration) -> Result<Self, ParleyError> {
        let raw = config
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ParleyError::Config("relay url is required for polling".into()))?;
        let mut endpoint = Url::parse(raw)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
            .ok_or_else(|| ParleyError::Config(format!("relay url `{raw}` is not an http(s) URL")))?;
        endpoint
            .path_segments_mut()
            .map_err(|_| ParleyError::Config(format!("relay url `{raw}` cannot have a path")))?
            .pop_if_empty()
            .extend(["rest", "v1", config.table.as_str()]);
        let key = config
            .anon_key
            .as_deref()
            .or(config.service_key.as_deref())
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ParleyError::Config("relay anon_key is required for polling".into()))?;

        let mut headers = HeaderMap::new();
        let invalid = |e: reqwest::header::InvalidHeaderValue| {
            ParleyError::Config(format!("invalid relay key header value: {e}"))
        };
        headers.insert("apikey", HeaderValue::from_str(key).map_err(invalid)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {key}")).map_err(invalid)?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ParleyError::Transport {
                message: format!("failed to build relay poll client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            endpoint,
            interval,
            root: CancellationToken::new(),
            channels: Mutex::new(HashMap::new()),
        })
    }

    /// Stops every poll task.
    pub fn shutdown(&self) {
        self.root.cancel();
    }
}

impl Drop for RelayPoller {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

#[async_trait]
impl EventTransport for RelayPoller {
    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<mpsc::Receiver<TransportSignal>, ParleyError> {
        let filter = channel_filter(channel)?;
        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
        let token = self.root.child_token();

        let task = PollTask {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            filter,
            channel: channel.to_string(),
            interval: self.interval,
            tx,
            cancel: token.clone(),
        };
        tokio::spawn(task.run());

        // A second subscription to the same channel replaces the first.
        if let Some(previous) = self
            .channels
            .lock()
            .await
            .insert(channel.to_string(), token)
        {
            previous.cancel();
        }
        Ok(rx)
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), ParleyError> {
        if let Some(token) = self.channels.lock().await.remove(channel) {
            token.cancel();
        }
        Ok(())
    }
}

/// PostgREST filter selecting one channel's rows, as a query pair.
fn channel_filter(channel: &str) -> Result<(&'static str, String), ParleyError> {
    if channel == PRESENCE_CHANNEL {
        return Ok(("channel", format!("eq.{PRESENCE_CHANNEL}")));
    }
    parse_conversation_channel(channel)
        .map(|id| ("conversation_id", format!("eq.{id}")))
        .ok_or_else(|| ParleyError::validation("channel", format!("unknown channel `{channel}`")))
}

struct PollTask {
    client: reqwest::Client,
    endpoint: Url,
    filter: (&'static str, String),
    channel: String,
    interval: Duration,
    tx: mpsc::Sender<TransportSignal>,
    cancel: CancellationToken,
}

impl PollTask {
    async fn run(self) {
        let mut cursor: Option<i64> = None;
        let mut down = false;

        loop {
            let current = cursor;
            let result = match current {
                None => self.latest_id().await.map(|id| {
                    cursor = Some(id);
                    Vec::new()
                }),
                Some(after) => self.fetch_after(after).await,
            };

            match result {
                Ok(rows) => {
                    if down {
                        down = false;
                        debug!(channel = %self.channel, "relay poll recovered");
                        if self.tx.send(TransportSignal::Reconnected).await.is_err() {
                            break;
                        }
                    }
                    for row in rows {
                        if let Some(id) = row.id {
                            cursor = Some(cursor.map_or(id, |c| c.max(id)));
                        }
                        match row.into_envelope() {
                            Ok(envelope) => {
                                if self.tx.send(TransportSignal::Event(envelope)).await.is_err() {
                                    return;
                                }
                            }
                            Err(e) => {
                                warn!(channel = %self.channel, error = %e, "skipping malformed relay row");
                            }
                        }
                    }
                }
                Err(e) => {
                    if !down {
                        down = true;
                        warn!(channel = %self.channel, error = %e, "relay poll failed");
                        if self.tx.send(TransportSignal::Disconnected).await.is_err() {
                            break;
                        }
                    }
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.tx.closed() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        debug!(channel = %self.channel, "relay poll stopped");
    }

    /// Id of the newest row for this channel, or 0 when there is none.
    async fn latest_id(&self) -> Result<i64, ParleyError> {
        let url = self.query(&[("select", "id"), ("order", "id.desc"), ("limit", "1")]);
        let rows: Vec<IdOnly> = self.get(url).await?;
        Ok(rows.first().map_or(0, |r| r.id))
    }

    async fn fetch_after(&self, cursor: i64) -> Result<Vec<RelayRow>, ParleyError> {
        let after = format!("gt.{cursor}");
        let limit = POLL_BATCH.to_string();
        let url = self.query(&[
            ("select", "*"),
            ("id", &after),
            ("order", "id.asc"),
            ("limit", &limit),
        ]);
        self.get(url).await
    }

    /// The endpoint with this channel's filter plus `pairs`.
    fn query(&self, pairs: &[(&str, &str)]) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair(self.filter.0, &self.filter.1)
            .extend_pairs(pairs);
        url
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, ParleyError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ParleyError::Transport {
                message: format!("relay poll failed: {e}"),
                source: Some(Box::new(e)),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ParleyError::transport(format!("relay returned {status}")));
        }
        response.json::<T>().await.map_err(|e| ParleyError::Transport {
            message: format!("malformed relay response: {e}"),
            source: Some(Box::new(e)),
        })
    }
}
