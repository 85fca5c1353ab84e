// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The contract every domain mutator implements, and the collaborators they share.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use lifeline_config::model::MAX_SPAN_SECS;
use lifeline_core::mutation::PendingMutation;
use lifeline_core::types::{SnapshotRecord, SnapshotSlot};
use lifeline_core::{
    Audience, Clock, Domain, LifelineError, Notifier, NotificationPayload, RemoteBackend,
    RemoteEvent, StorageAdapter,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::queue::OfflineQueue;
use crate::retry::BackoffPolicy;

/// Result of a write that either reached the server or was queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The server acknowledged the write.
    Confirmed,
    /// The optimistic state is published and the write waits in the offline queue.
    PendingSync,
}

/// The sole writer of one state domain.
///
/// Intents are exposed as inherent, verb-shaped methods on each mutator. This
/// trait carries the operations the sync stream, the offline queue and the
/// session drive generically.
#[async_trait]
pub trait Mutator: Send + Sync {
    fn domain(&self) -> Domain;

    /// Load persisted snapshots and publish them.
    async fn restore(&self) -> Result<(), LifelineError>;

    /// Fold a remote-origin change into the next snapshot.
    async fn apply_remote(&self, event: RemoteEvent) -> Result<(), LifelineError>;

    /// Fetch the domain from the server and merge it with local state.
    async fn refresh(&self) -> Result<(), LifelineError>;

    /// Fetch the domain and overwrite local optimistic values with it.
    async fn adopt_authoritative(&self) -> Result<(), LifelineError>;

    /// Re-issue a queued write against the server.
    async fn replay(&self, mutation: &PendingMutation) -> Result<(), LifelineError>;
}

/// Collaborators shared by the mutators.
#[derive(Clone)]
pub struct MutatorContext {
    pub remote: Arc<dyn RemoteBackend + Send + Sync>,
    pub storage: Arc<dyn StorageAdapter + Send + Sync>,
    pub notifier: Arc<dyn Notifier + Send + Sync>,
    pub clock: Arc<dyn Clock>,
    pub backoff: BackoffPolicy,
    pub queue: OfflineQueue,
}

impl MutatorContext {
    pub(crate) async fn persist<T: Serialize>(
        &self,
        domain: Domain,
        slot: SnapshotSlot,
        version: u64,
        state: &T,
    ) {
        let body = match serde_json::to_string(state) {
            Ok(body) => body,
            Err(e) => {
                warn!(%domain, %slot, error = %e, "failed to serialize snapshot");
                return;
            }
        };
        let record = SnapshotRecord {
            domain,
            slot,
            version,
            body,
            updated_at: self.clock.now().to_rfc3339(),
        };
        // A lost persist only costs restart fidelity; the published snapshot stands.
        if let Err(e) = self.storage.save_snapshot(&record).await {
            warn!(%domain, %slot, version, error = %e, "failed to persist snapshot");
        }
    }

    /// Load a persisted slot. Unreadable bodies are logged and treated as absent.
    pub(crate) async fn load<T: DeserializeOwned>(
        &self,
        domain: Domain,
        slot: SnapshotSlot,
    ) -> Result<Option<(u64, T)>, LifelineError> {
        let Some(record) = self.storage.load_snapshot(domain, slot).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&record.body) {
            Ok(state) => Ok(Some((record.version, state))),
            Err(e) => {
                warn!(%domain, %slot, error = %e, "discarding unreadable snapshot");
                Ok(None)
            }
        }
    }

    /// Deliver notifications, logging failures. Delivery never fails an intent.
    pub(crate) async fn notify_all(&self, notifications: Vec<(Audience, NotificationPayload)>) {
        for (audience, payload) in notifications {
            let kind = payload.kind;
            match self.notifier.deliver(audience, payload).await {
                Ok(()) => debug!(%kind, "notification delivered"),
                Err(e) => warn!(%kind, error = %e, "notification delivery failed"),
            }
        }
    }
}

/// Convert a config value in seconds, clamped to [`max_span`].
pub(crate) fn duration_from_secs(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_SPAN_SECS) as i64)
}

/// Longest schedule or expiry span the domains accept.
pub(crate) fn max_span() -> Duration {
    Duration::seconds(MAX_SPAN_SECS as i64)
}

/// Error for a queued payload that reached the wrong mutator.
pub(crate) fn misrouted(domain: Domain, mutation: &PendingMutation) -> LifelineError {
    LifelineError::Internal(format!(
        "{} mutation {} routed to {domain} mutator",
        mutation.payload.op_name(),
        mutation.id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_seconds_are_clamped_to_the_max_span() {
        assert_eq!(duration_from_secs(90), Duration::seconds(90));
        assert_eq!(duration_from_secs(u64::MAX), max_span());
        assert_eq!(duration_from_secs(10_000_000_000_000), max_span());
    }
}
