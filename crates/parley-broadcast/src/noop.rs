// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Driver used when no realtime transport is configured.

use async_trait::async_trait;
use parley_core::{
    AdapterType, BroadcastDriver, Envelope, HealthStatus, ParleyError, PluginAdapter,
};

/// Never ready; every publish is skipped. Clients rely on polling.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDriver;

#[async_trait]
impl PluginAdapter for NoopDriver {
    fn name(&self) -> &str {
        "none"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Broadcast
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Degraded("realtime broadcasting disabled".into()))
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl BroadcastDriver for NoopDriver {
    fn is_ready(&self) -> bool {
        false
    }

    async fn deliver(&self, _envelope: &Envelope) -> Result<(), ParleyError> {
        Ok(())
    }
}
