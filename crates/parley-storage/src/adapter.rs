// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use parley_config::model::StorageConfig;
use parley_core::{
    AdapterType, Conversation, ConversationId, ConversationLink, HealthStatus, Message, MessageId,
    MessagePage, NewMessage, PageRequest, ParleyError, Participant, PluginAdapter,
    StorageAdapter, UserId,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed store of record.
///
/// The database is opened by [`StorageAdapter::initialize`]; every other
/// operation fails with a storage error until then.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, ParleyError> {
        self.db.get().ok_or_else(|| ParleyError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    async fn checkpoint(db: &Database) -> Result<(), ParleyError> {
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        let db = match self.db() {
            Ok(db) => db,
            Err(_) => return Ok(HealthStatus::Unhealthy("not initialized".into())),
        };
        let health = db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await;
        Ok(match health {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        if let Some(db) = self.db.get() {
            Self::checkpoint(db).await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), ParleyError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| ParleyError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ParleyError> {
        Self::checkpoint(self.db()?).await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    async fn find_or_create_conversation(
        &self,
        customer_id: UserId,
        provider_id: UserId,
        link: &ConversationLink,
    ) -> Result<Conversation, ParleyError> {
        queries::conversations::find_or_create(self.db()?, customer_id, provider_id, link).await
    }

    async fn get_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, ParleyError> {
        queries::conversations::get(self.db()?, id).await
    }

    async fn list_conversations(&self, user: UserId) -> Result<Vec<Conversation>, ParleyError> {
        queries::conversations::list_for_user(self.db()?, user).await
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message, ParleyError> {
        queries::messages::insert(self.db()?, message).await
    }

    async fn get_message(&self, id: MessageId) -> Result<Option<Message>, ParleyError> {
        queries::messages::get(self.db()?, id).await
    }

    async fn list_messages(
        &self,
        conversation: ConversationId,
        page: &PageRequest,
    ) -> Result<MessagePage, ParleyError> {
        queries::messages::list(self.db()?, conversation, page).await
    }

    async fn mark_read(
        &self,
        conversation: ConversationId,
        reader: Participant,
        at: DateTime<Utc>,
    ) -> Result<Vec<MessageId>, ParleyError> {
        queries::messages::mark_read(self.db()?, conversation, reader, at).await
    }
}
