// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broadcast drivers for deterministic tests.
//!
//! `RecordingDriver` captures every delivered envelope for assertion;
//! `FailingDriver` rejects every delivery the way a broken relay would.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parley_core::{
    AdapterType, BroadcastDriver, Envelope, EventType, HealthStatus, ParleyError, PluginAdapter,
};
use tokio::sync::{Mutex, Notify};

/// Captures delivered envelopes. Readiness can be toggled at runtime.
pub struct RecordingDriver {
    ready: AtomicBool,
    sent: Arc<Mutex<Vec<Envelope>>>,
    notify: Arc<Notify>,
}

impl RecordingDriver {
    /// A ready driver.
    pub fn new() -> Self {
        Self::with_ready(true)
    }

    pub fn with_ready(ready: bool) -> Self {
        Self {
            ready: AtomicBool::new(ready),
            sent: Arc::new(Mutex::new(Vec::new())),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Every envelope delivered so far, in order.
    pub async fn sent_envelopes(&self) -> Vec<Envelope> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_of(&self, event_type: EventType) -> Vec<Envelope> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn clear_sent(&self) {
        self.sent.lock().await.clear();
    }

    /// Waits until at least `count` envelopes were delivered, or the timeout passes.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if self.sent.lock().await.len() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.sent.lock().await.len() >= count;
            }
        }
    }
}

impl Default for RecordingDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for RecordingDriver {
    fn name(&self) -> &str {
        "recording"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Broadcast
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl BroadcastDriver for RecordingDriver {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn deliver(&self, envelope: &Envelope) -> Result<(), ParleyError> {
        self.sent.lock().await.push(envelope.clone());
        self.notify.notify_waiters();
        Ok(())
    }
}

/// Always ready, never delivers.
#[derive(Default)]
pub struct FailingDriver {
    attempts: AtomicUsize,
}

impl FailingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of deliveries attempted.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PluginAdapter for FailingDriver {
    fn name(&self) -> &str {
        "failing"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Broadcast
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Unhealthy("always fails".into()))
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl BroadcastDriver for FailingDriver {
    fn is_ready(&self) -> bool {
        true
    }

    async fn deliver(&self, _envelope: &Envelope) -> Result<(), ParleyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ParleyError::transport("relay returned 500 Internal Server Error"))
    }
}
