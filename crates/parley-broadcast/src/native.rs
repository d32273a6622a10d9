// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Native driver: publishes onto the in-process [`ChannelHub`].

use std::sync::Arc;

use async_trait::async_trait;
use parley_core::{
    AdapterType, BroadcastDriver, Envelope, HealthStatus, ParleyError, PluginAdapter,
};
use tracing::trace;

use crate::hub::ChannelHub;

/// Ready only while a socket layer is attached to the hub.
pub struct NativeDriver {
    hub: Arc<ChannelHub>,
}

impl NativeDriver {
    pub fn new(hub: Arc<ChannelHub>) -> Self {
        Self { hub }
    }

    pub fn hub(&self) -> &Arc<ChannelHub> {
        &self.hub
    }
}

#[async_trait]
impl PluginAdapter for NativeDriver {
    fn name(&self) -> &str {
        "native"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Broadcast
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        if self.hub.is_attached() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy("no socket layer attached".into()))
        }
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        self.hub.prune();
        Ok(())
    }
}

#[async_trait]
impl BroadcastDriver for NativeDriver {
    fn is_ready(&self) -> bool {
        self.hub.is_attached()
    }

    async fn deliver(&self, envelope: &Envelope) -> Result<(), ParleyError> {
        let receivers = self.hub.publish(envelope);
        trace!(
            channel = %envelope.channel,
            event_type = %envelope.event_type(),
            receivers,
            "native publish"
        );
        Ok(())
    }
}
