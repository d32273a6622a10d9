// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for integration testing.
//!
//! `TestHarness` assembles a temp SQLite store, a recording broadcast driver,
//! and a default configuration. Services under test are built on top of it.

use std::sync::Arc;

use parley_config::model::{ParleyConfig, StorageConfig};
use parley_core::{
    Actor, Conversation, ConversationLink, ParleyError, Participant, Role, StorageAdapter, UserId,
};
use parley_storage::SqliteStorage;

use crate::mock_driver::RecordingDriver;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    driver_ready: bool,
    config: ParleyConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            driver_ready: true,
            config: ParleyConfig::default(),
        }
    }

    /// Start with the recording driver unready, like an unconfigured relay.
    pub fn with_unready_driver(mut self) -> Self {
        self.driver_ready = false;
        self
    }

    /// Replace the configuration. The storage section is overridden by the harness.
    pub fn with_config(mut self, config: ParleyConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn build(self) -> Result<TestHarness, ParleyError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| ParleyError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("parley-test.db");

        let mut config = self.config;
        config.storage = StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        };

        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await?;
        let storage: Arc<dyn StorageAdapter> = Arc::new(storage);

        Ok(TestHarness {
            storage,
            driver: Arc::new(RecordingDriver::with_ready(self.driver_ready)),
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A temp store, a recording driver, and the config they were built from.
pub struct TestHarness {
    pub storage: Arc<dyn StorageAdapter>,
    pub driver: Arc<RecordingDriver>,
    pub config: ParleyConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Shorthand for `builder().build()`.
    pub async fn new() -> Result<Self, ParleyError> {
        Self::builder().build().await
    }

    /// Seeds a conversation between `customer` and `provider` directly in the store.
    pub async fn seed_conversation(
        &self,
        customer: &Actor,
        provider: &Actor,
    ) -> Result<Conversation, ParleyError> {
        self.storage
            .find_or_create_conversation(customer.id, provider.id, &ConversationLink::default())
            .await
    }
}

/// A customer actor named after its id.
pub fn customer(id: i64) -> Actor {
    Actor::new(UserId(id), Role::Customer, format!("Customer {id}"))
}

/// A provider actor named after its id.
pub fn provider(id: i64) -> Actor {
    Actor::new(UserId(id), Role::Provider, format!("Provider {id}"))
}

pub fn admin(id: i64) -> Actor {
    Actor::new(UserId(id), Role::Administrator, format!("Admin {id}"))
}

/// The side an actor's role maps to. Panics for non-participant roles.
pub fn side_of(actor: &Actor) -> Participant {
    match actor.role.participant() {
        Some(side) => side,
        None => panic!("{} is not a conversation participant", actor.display_name),
    }
}
