// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broadcast drivers for the Parley conversation engine.
//!
//! The driver is chosen once at startup by [`build_driver`] and handed to the
//! services as `Arc<dyn BroadcastDriver>`. There is no global broadcaster.

pub mod hub;
pub mod native;
pub mod noop;
pub mod relay;

use std::sync::Arc;

use parley_config::model::{BroadcastConfig, DriverKind};
use parley_core::{BroadcastDriver, ParleyError};
use tracing::info;

pub use hub::ChannelHub;
pub use native::NativeDriver;
pub use noop::NoopDriver;
pub use relay::RelayDriver;

/// The selected driver, plus the hub when the native driver is in use.
#[derive(Clone)]
pub struct DriverHandle {
    pub driver: Arc<dyn BroadcastDriver>,
    /// Served by the gateway's `/ws` route.
    pub hub: Option<Arc<ChannelHub>>,
}

impl std::fmt::Debug for DriverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverHandle")
            .field("driver", &self.driver.name())
            .field("hub", &self.hub.is_some())
            .finish()
    }
}

/// Construct the driver named by `broadcast.driver`.
pub fn build_driver(config: &BroadcastConfig) -> Result<DriverHandle, ParleyError> {
    let handle = match config.driver {
        DriverKind::None => DriverHandle {
            driver: Arc::new(NoopDriver),
            hub: None,
        },
        DriverKind::Native => {
            let hub = Arc::new(ChannelHub::new(config.native.channel_capacity));
            DriverHandle {
                driver: Arc::new(NativeDriver::new(Arc::clone(&hub))),
                hub: Some(hub),
            }
        }
        DriverKind::Relay => {
            let driver = RelayDriver::new(&config.relay)?;
            if !driver.is_ready() {
                tracing::warn!("relay driver selected without url/service_key; events will not be published");
            }
            DriverHandle {
                driver: Arc::new(driver),
                hub: None,
            }
        }
    };
    info!(driver = handle.driver.name(), "broadcast driver selected");
    Ok(handle)
}
