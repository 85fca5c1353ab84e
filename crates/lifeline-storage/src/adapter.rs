// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use lifeline_config::model::StorageConfig;
use lifeline_core::mutation::{MutationPayload, PendingMutation};
use lifeline_core::types::{MutationStatus, SnapshotRecord, SnapshotSlot};
use lifeline_core::{
    AdapterType, Domain, HealthStatus, LifelineError, PluginAdapter, StorageAdapter,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// The database is opened lazily by [`StorageAdapter::initialize`].
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

    fn db(&self) -> Result<&Database, LifelineError> {
        self.db.get().ok_or_else(|| LifelineError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    async fn checkpoint(db: &Database) -> Result<(), LifelineError> {
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            })
            .await
            .map_err(crate::database::map_tr_err)
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

    /// Degraded while any queued intent has exhausted its replay attempts,
    /// since the server never received it.
    async fn health_check(&self) -> Result<HealthStatus, LifelineError> {
        let failed = queries::mutations::list(self.db()?, None)
            .await?
            .iter()
            .filter(|m| m.status == MutationStatus::Failed)
            .count();
        Ok(match failed {
            0 => HealthStatus::Healthy,
            n => HealthStatus::Degraded(format!("{n} queued mutation(s) failed to replay")),
        })
    }

    async fn shutdown(&self) -> Result<(), LifelineError> {
        if let Some(db) = self.db.get() {
            Self::checkpoint(db).await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), LifelineError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| LifelineError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), LifelineError> {
        Self::checkpoint(self.db()?).await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Snapshot operations ---

    async fn load_snapshot(
        &self,
        domain: Domain,
        slot: SnapshotSlot,
    ) -> Result<Option<SnapshotRecord>, LifelineError> {
        queries::snapshots::load_snapshot(self.db()?, domain, slot).await
    }

    async fn save_snapshot(&self, record: &SnapshotRecord) -> Result<(), LifelineError> {
        queries::snapshots::save_snapshot(self.db()?, record).await
    }

    // --- Mutation queue operations ---

    async fn enqueue_mutation(
        &self,
        payload: &MutationPayload,
        enqueued_at: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<PendingMutation, LifelineError> {
        queries::mutations::enqueue(self.db()?, payload, enqueued_at, max_attempts).await
    }

    async fn next_pending_mutation(
        &self,
        domain: Domain,
    ) -> Result<Option<PendingMutation>, LifelineError> {
        queries::mutations::next_pending(self.db()?, domain).await
    }

    async fn ack_mutation(&self, id: i64) -> Result<(), LifelineError> {
        queries::mutations::ack(self.db()?, id).await
    }

    async fn release_mutation(&self, id: i64) -> Result<(), LifelineError> {
        queries::mutations::release(self.db()?, id).await
    }

    async fn fail_mutation(&self, id: i64) -> Result<MutationStatus, LifelineError> {
        queries::mutations::fail(self.db()?, id).await
    }

    async fn list_mutations(
        &self,
        domain: Option<Domain>,
    ) -> Result<Vec<PendingMutation>, LifelineError> {
        queries::mutations::list(self.db()?, domain).await
    }

    async fn count_pending_mutations(
        &self,
        domain: Option<Domain>,
    ) -> Result<usize, LifelineError> {
        queries::mutations::count_pending(self.db()?, domain).await
    }
}
