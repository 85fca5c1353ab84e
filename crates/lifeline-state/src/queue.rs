// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The offline mutation queue.
//!
//! Intents that could not reach the server are persisted per domain and
//! replayed strictly in enqueue order once connectivity returns. Replay of a
//! domain is serialized; different domains replay independently.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use lifeline_core::mutation::{MutationPayload, PendingMutation};
use lifeline_core::types::MutationStatus;
use lifeline_core::{Clock, Domain, LifelineError, StorageAdapter};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::mutator::Mutator;
use crate::snapshot::{Publisher, SnapshotReader};

/// The pending-sync indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    /// Mutations still awaiting replay across all domains.
    pub pending: usize,
    pub online: bool,
    pub last_replay_at: Option<DateTime<Utc>>,
}

impl SyncStatus {
    pub fn is_pending_sync(&self) -> bool {
        self.pending > 0
    }
}

/// Outcome of one replay pass over a domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub domain: Domain,
    /// Accepted by the server.
    pub replayed: usize,
    /// Rejected as stale; the authoritative value was adopted instead.
    pub discarded: usize,
    /// Exhausted their attempts and were marked failed.
    pub failed: usize,
    /// Still waiting after this pass.
    pub remaining: usize,
}

impl ReplayReport {
    fn new(domain: Domain) -> Self {
        Self {
            domain,
            replayed: 0,
            discarded: 0,
            failed: 0,
            remaining: 0,
        }
    }
}

/// Handle on the persisted queue. Cheap to clone.
#[derive(Clone)]
pub struct OfflineQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    storage: Arc<dyn StorageAdapter + Send + Sync>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
    online: AtomicBool,
    replay_locks: HashMap<Domain, Mutex<()>>,
    status: Mutex<Publisher<SyncStatus>>,
    status_reader: SnapshotReader<SyncStatus>,
}

impl OfflineQueue {
    pub fn new(
        storage: Arc<dyn StorageAdapter + Send + Sync>,
        clock: Arc<dyn Clock>,
        max_attempts: u32,
    ) -> Self {
        let initial = SyncStatus {
            pending: 0,
            online: true,
            last_replay_at: None,
        };
        let publisher = Publisher::new(initial, 0, clock.now());
        let status_reader = publisher.reader();
        Self {
            inner: Arc::new(QueueInner {
                storage,
                clock,
                max_attempts: max_attempts.max(1),
                online: AtomicBool::new(true),
                replay_locks: Domain::ALL.iter().map(|d| (*d, Mutex::new(()))).collect(),
                status: Mutex::new(publisher),
                status_reader,
            }),
        }
    }

    /// Persist a write intent for later replay.
    pub async fn enqueue(
        &self,
        payload: &MutationPayload,
    ) -> Result<PendingMutation, LifelineError> {
        let mutation = self
            .inner
            .storage
            .enqueue_mutation(payload, self.inner.clock.now(), self.inner.max_attempts)
            .await?;
        info!(
            domain = %mutation.domain,
            id = mutation.id,
            op = payload.op_name(),
            "mutation queued for replay"
        );
        self.refresh_status(None).await?;
        Ok(mutation)
    }

    /// Whether a domain has mutations that have not been replayed yet.
    pub async fn has_pending(&self, domain: Domain) -> Result<bool, LifelineError> {
        Ok(self.inner.storage.count_pending_mutations(Some(domain)).await? > 0)
    }

    /// A new write must go through the queue when offline, or when earlier
    /// writes of its domain are still waiting, so replay order is preserved.
    pub async fn should_defer(&self, domain: Domain) -> Result<bool, LifelineError> {
        if !self.is_online() {
            return Ok(true);
        }
        self.has_pending(domain).await
    }

    /// Total mutations awaiting replay.
    pub async fn pending(&self) -> Result<usize, LifelineError> {
        self.inner.storage.count_pending_mutations(None).await
    }

    /// All rows in replay order, failed ones included.
    pub async fn list(
        &self,
        domain: Option<Domain>,
    ) -> Result<Vec<PendingMutation>, LifelineError> {
        self.inner.storage.list_mutations(domain).await
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Record connectivity. Returns `true` on an offline to online transition.
    pub async fn set_online(&self, online: bool) -> Result<bool, LifelineError> {
        let was_online = self.inner.online.swap(online, Ordering::SeqCst);
        if was_online != online {
            info!(online, "connectivity changed");
            self.refresh_status(None).await?;
        }
        Ok(online && !was_online)
    }

    /// Subscribe to the pending-sync indicator.
    pub fn status(&self) -> SnapshotReader<SyncStatus> {
        self.inner.status_reader.clone()
    }

    /// Recount pending rows and publish the indicator if anything changed.
    pub async fn refresh_status(
        &self,
        replayed_at: Option<DateTime<Utc>>,
    ) -> Result<(), LifelineError> {
        let pending = self.pending().await?;
        let mut publisher = self.inner.status.lock().await;
        let current = publisher.current();
        let next = SyncStatus {
            pending,
            online: self.is_online(),
            last_replay_at: replayed_at.or(current.last_replay_at),
        };
        if **current != next {
            publisher.publish(next, self.inner.clock.now());
        }
        Ok(())
    }

    /// Replay a domain's queue through its mutator, oldest first.
    ///
    /// Stops at the first connectivity or authorization failure and leaves
    /// that mutation, and everything after it, for the next pass.
    pub async fn replay(&self, mutator: &dyn Mutator) -> Result<ReplayReport, LifelineError> {
        let domain = mutator.domain();
        let lock = self
            .inner
            .replay_locks
            .get(&domain)
            .ok_or_else(|| LifelineError::Internal(format!("no replay lock for {domain}")))?;
        let _guard = lock.lock().await;

        let mut report = ReplayReport::new(domain);
        let storage = &self.inner.storage;

        while self.is_online() {
            let Some(mutation) = storage.next_pending_mutation(domain).await? else {
                break;
            };
            let op = mutation.payload.op_name();

            match mutator.replay(&mutation).await {
                Ok(()) => {
                    storage.ack_mutation(mutation.id).await?;
                    debug!(%domain, id = mutation.id, op, "mutation replayed");
                    report.replayed += 1;
                }
                Err(e) if e.is_conflict() => {
                    storage.ack_mutation(mutation.id).await?;
                    warn!(%domain, id = mutation.id, op, error = %e, "stale mutation discarded");
                    report.discarded += 1;
                    if let Err(e) = mutator.adopt_authoritative().await {
                        warn!(%domain, error = %e, "failed to adopt authoritative state");
                    }
                }
                Err(e) if e.is_connectivity() || matches!(e, LifelineError::Authorization(_)) => {
                    storage.release_mutation(mutation.id).await?;
                    warn!(%domain, id = mutation.id, op, error = %e, "replay interrupted");
                    break;
                }
                Err(e) => match storage.fail_mutation(mutation.id).await? {
                    MutationStatus::Failed => {
                        error!(
                            %domain,
                            id = mutation.id,
                            op,
                            error = %e,
                            "mutation failed permanently"
                        );
                        report.failed += 1;
                        if let Err(e) = mutator.adopt_authoritative().await {
                            warn!(%domain, error = %e, "failed to adopt authoritative state");
                        }
                    }
                    _ => {
                        warn!(%domain, id = mutation.id, op, error = %e, "replay attempt failed");
                        break;
                    }
                },
            }
        }

        report.remaining = storage.count_pending_mutations(Some(domain)).await?;
        self.refresh_status(Some(self.inner.clock.now())).await?;
        if report.replayed + report.discarded + report.failed > 0 {
            info!(
                %domain,
                replayed = report.replayed,
                discarded = report.discarded,
                failed = report.failed,
                remaining = report.remaining,
                "replay pass complete"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use lifeline_config::model::StorageConfig;
    use lifeline_core::{RemoteEvent, StorageAdapter, SystemClock};
    use lifeline_storage::SqliteStorage;
    use tempfile::TempDir;

    /// Replays by popping scripted results; records what it saw.
    struct ScriptedMutator {
        script: StdMutex<Vec<Result<(), LifelineError>>>,
        seen: StdMutex<Vec<MutationPayload>>,
        adopted: StdMutex<usize>,
    }

    impl ScriptedMutator {
        fn new(mut script: Vec<Result<(), LifelineError>>) -> Self {
            script.reverse();
            Self {
                script: StdMutex::new(script),
                seen: StdMutex::new(Vec::new()),
                adopted: StdMutex::new(0),
            }
        }
    }

    #[async_trait]
    impl Mutator for ScriptedMutator {
        fn domain(&self) -> Domain {
            Domain::Alert
        }

        async fn restore(&self) -> Result<(), LifelineError> {
            Ok(())
        }

        async fn apply_remote(&self, _event: RemoteEvent) -> Result<(), LifelineError> {
            Ok(())
        }

        async fn refresh(&self) -> Result<(), LifelineError> {
            Ok(())
        }

        async fn adopt_authoritative(&self) -> Result<(), LifelineError> {
            *self.adopted.lock().unwrap() += 1;
            Ok(())
        }

        async fn replay(&self, mutation: &PendingMutation) -> Result<(), LifelineError> {
            self.seen.lock().unwrap().push(mutation.payload.clone());
            self.script.lock().unwrap().pop().unwrap_or(Ok(()))
        }
    }

    async fn queue(max_attempts: u32) -> (OfflineQueue, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::new(StorageConfig {
            database_path: dir.path().join("queue.db").to_string_lossy().into_owned(),
            wal_mode: true,
        });
        storage.initialize().await.unwrap();
        (
            OfflineQueue::new(Arc::new(storage), Arc::new(SystemClock), max_attempts),
            dir,
        )
    }

    fn trigger(minute: u32) -> MutationPayload {
        MutationPayload::TriggerAlert {
            at: Utc.with_ymd_and_hms(2026, 4, 1, 9, minute, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn replays_in_enqueue_order_and_clears_indicator() {
        let (queue, _dir) = queue(3).await;
        let status = queue.status();
        queue.enqueue(&trigger(1)).await.unwrap();
        queue.enqueue(&MutationPayload::CancelAlert { at: Utc::now() }).await.unwrap();
        queue.enqueue(&trigger(3)).await.unwrap();
        assert_eq!(status.current().pending, 3);
        assert!(queue.should_defer(Domain::Alert).await.unwrap());
        assert!(!queue.should_defer(Domain::CheckIn).await.unwrap());

        let mutator = ScriptedMutator::new(vec![]);
        let report = queue.replay(&mutator).await.unwrap();

        assert_eq!(report.replayed, 3);
        assert_eq!(report.remaining, 0);
        let seen = mutator.seen.lock().unwrap();
        assert_eq!(seen[0], trigger(1));
        assert_eq!(seen[2], trigger(3));
        assert!(!status.current().is_pending_sync());
        assert!(status.current().last_replay_at.is_some());
    }

    #[tokio::test]
    async fn conflict_discards_and_adopts_then_continues() {
        let (queue, _dir) = queue(3).await;
        queue.enqueue(&trigger(1)).await.unwrap();
        queue.enqueue(&trigger(2)).await.unwrap();

        let mutator = ScriptedMutator::new(vec![Err(LifelineError::Conflict {
            message: "stale".into(),
        })]);
        let report = queue.replay(&mutator).await.unwrap();

        assert_eq!(report.discarded, 1);
        assert_eq!(report.replayed, 1);
        assert_eq!(*mutator.adopted.lock().unwrap(), 1);
        assert_eq!(queue.pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn connectivity_stops_the_pass_without_losing_order() {
        let (queue, _dir) = queue(3).await;
        queue.enqueue(&trigger(1)).await.unwrap();
        queue.enqueue(&trigger(2)).await.unwrap();

        let mutator = ScriptedMutator::new(vec![Err(LifelineError::connectivity("down"))]);
        let report = queue.replay(&mutator).await.unwrap();
        assert_eq!(report.replayed, 0);
        assert_eq!(report.remaining, 2);

        let retry = ScriptedMutator::new(vec![]);
        queue.replay(&retry).await.unwrap();
        assert_eq!(retry.seen.lock().unwrap()[0], trigger(1));
    }

    #[tokio::test]
    async fn unknown_failures_exhaust_into_failed_rows() {
        let (queue, _dir) = queue(2).await;
        queue.enqueue(&trigger(1)).await.unwrap();
        let unknown = || {
            Err(LifelineError::Unknown {
                message: "500".into(),
                source: None,
            })
        };

        let first = ScriptedMutator::new(vec![unknown()]);
        assert_eq!(queue.replay(&first).await.unwrap().remaining, 1);

        let second = ScriptedMutator::new(vec![unknown()]);
        let report = queue.replay(&second).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.remaining, 0);
        assert_eq!(*second.adopted.lock().unwrap(), 1);

        let rows = queue.list(Some(Domain::Alert)).await.unwrap();
        assert_eq!(rows[0].status, MutationStatus::Failed);
    }

    #[tokio::test]
    async fn offline_queue_does_not_replay() {
        let (queue, _dir) = queue(3).await;
        assert!(!queue.set_online(false).await.unwrap());
        queue.enqueue(&trigger(1)).await.unwrap();
        assert!(!queue.status().current().online);

        let mutator = ScriptedMutator::new(vec![]);
        let report = queue.replay(&mutator).await.unwrap();
        assert_eq!(report.remaining, 1);
        assert!(mutator.seen.lock().unwrap().is_empty());

        assert!(queue.set_online(true).await.unwrap());
        assert!(!queue.set_online(true).await.unwrap());
    }
}
