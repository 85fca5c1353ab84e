// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for local persistence backends (SQLite, etc.).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::LifelineError;
use crate::mutation::{MutationPayload, PendingMutation};
use crate::traits::adapter::PluginAdapter;
use crate::types::{Domain, MutationStatus, SnapshotRecord, SnapshotSlot};

/// Adapter for local persistence.
///
/// Holds what must survive a process restart: the snapshots of each domain and
/// the offline mutation queue.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, crash recovery).
    async fn initialize(&self) -> Result<(), LifelineError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), LifelineError>;

    // --- Snapshot operations ---

    async fn load_snapshot(
        &self,
        domain: Domain,
        slot: SnapshotSlot,
    ) -> Result<Option<SnapshotRecord>, LifelineError>;

    async fn save_snapshot(&self, record: &SnapshotRecord) -> Result<(), LifelineError>;

    // --- Mutation queue operations ---

    /// Appends a mutation to its domain's queue.
    async fn enqueue_mutation(
        &self,
        payload: &MutationPayload,
        enqueued_at: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<PendingMutation, LifelineError>;

    /// Takes the oldest pending mutation of the domain and marks it processing.
    async fn next_pending_mutation(
        &self,
        domain: Domain,
    ) -> Result<Option<PendingMutation>, LifelineError>;

    /// Deletes a mutation after a successful (or discarded) replay.
    async fn ack_mutation(&self, id: i64) -> Result<(), LifelineError>;

    /// Returns a mutation to pending after a connectivity failure.
    /// Counts the attempt but never exhausts the mutation.
    async fn release_mutation(&self, id: i64) -> Result<(), LifelineError>;

    /// Records a failed attempt. Marks the mutation failed once it reaches
    /// its attempt limit and returns the resulting status.
    async fn fail_mutation(&self, id: i64) -> Result<MutationStatus, LifelineError>;

    /// Lists mutations in replay order, optionally filtered by domain.
    async fn list_mutations(
        &self,
        domain: Option<Domain>,
    ) -> Result<Vec<PendingMutation>, LifelineError>;

    /// Counts mutations still awaiting replay.
    async fn count_pending_mutations(
        &self,
        domain: Option<Domain>,
    ) -> Result<usize, LifelineError>;
}
