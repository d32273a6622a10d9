// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! Both adapters extend [`PluginAdapter`] and use `#[async_trait]` so they can
//! be held as `Arc<dyn ...>` and injected into the services.

pub mod adapter;
pub mod broadcast;
pub mod storage;

pub use adapter::PluginAdapter;
pub use broadcast::BroadcastDriver;
pub use storage::StorageAdapter;
