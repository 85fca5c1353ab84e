// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The alert domain: `Inactive <-> Active`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lifeline_core::mutation::{MutationPayload, PendingMutation};
use lifeline_core::types::SnapshotSlot;
use lifeline_core::{
    Alert, Audience, Domain, LifelineError, NotificationKind, NotificationPayload, RemoteEvent,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::contacts::ContactsState;
use crate::mutator::{Mutator, MutatorContext, misrouted};
use crate::retry::retry_with_backoff;
use crate::snapshot::{Publisher, SnapshotReader};

/// Result of triggering or cancelling the alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertOutcome {
    Confirmed(Alert),
    /// Applied locally and queued for replay.
    PendingSync(Alert),
    /// Already in the requested state; nothing was sent.
    Unchanged(Alert),
}

impl AlertOutcome {
    pub fn alert(&self) -> &Alert {
        match self {
            Self::Confirmed(a) | Self::PendingSync(a) | Self::Unchanged(a) => a,
        }
    }
}

/// An incoming alert replaces a local one unless it is older.
fn merge_alert(local: &Alert, incoming: &Alert) -> Alert {
    if incoming.last_transition_at() < local.last_transition_at() {
        local.clone()
    } else {
        incoming.clone()
    }
}

struct AlertState {
    current: Alert,
    confirmed: Alert,
    publisher: Publisher<Alert>,
}

struct AlertInner {
    ctx: MutatorContext,
    contacts: SnapshotReader<ContactsState>,
    state: Mutex<AlertState>,
    reader: SnapshotReader<Alert>,
}

impl AlertInner {
    async fn commit(&self, st: &mut AlertState, confirmed: bool) {
        let snapshot = st.publisher.publish(st.current.clone(), self.ctx.clock.now());
        self.ctx
            .persist(Domain::Alert, SnapshotSlot::Current, snapshot.version(), snapshot.state())
            .await;
        if confirmed {
            self.ctx
                .persist(Domain::Alert, SnapshotSlot::Confirmed, snapshot.version(), &st.confirmed)
                .await;
        }
    }
}

/// Sole writer of the alert domain.
#[derive(Clone)]
pub struct AlertCoordinator {
    inner: Arc<AlertInner>,
}

impl AlertCoordinator {
    /// `contacts` supplies the responders the alert fans out to.
    pub fn new(ctx: MutatorContext, contacts: SnapshotReader<ContactsState>) -> Self {
        let publisher = Publisher::new(Alert::default(), 0, ctx.clock.now());
        let reader = publisher.reader();
        Self {
            inner: Arc::new(AlertInner {
                ctx,
                contacts,
                state: Mutex::new(AlertState {
                    current: Alert::default(),
                    confirmed: Alert::default(),
                    publisher,
                }),
                reader,
            }),
        }
    }

    pub fn reader(&self) -> SnapshotReader<Alert> {
        self.inner.reader.clone()
    }

    /// Activate the alert and notify every responder.
    ///
    /// A no-op returning the open activation when already active.
    pub async fn trigger_alert(&self) -> Result<AlertOutcome, LifelineError> {
        let now = self.inner.ctx.clock.now();
        let alert = {
            let mut st = self.inner.state.lock().await;
            if st.current.is_active {
                debug!("alert already active");
                return Ok(AlertOutcome::Unchanged(st.current.clone()));
            }
            st.current = Alert {
                is_active: true,
                activated_at: Some(now),
                deactivated_at: st.current.deactivated_at,
            };
            self.inner.commit(&mut st, false).await;
            st.current.clone()
        };
        info!(activated_at = %now, "alert triggered");
        self.fan_out(
            NotificationKind::EmergencyAlert,
            "Emergency alert",
            "An emergency alert was raised. Please check in on them now.",
            now,
        )
        .await;

        self.submit(MutationPayload::TriggerAlert { at: now }, alert)
            .await
    }

    /// Deactivate the alert and notify every responder.
    ///
    /// A no-op when already inactive.
    pub async fn cancel_alert(&self) -> Result<AlertOutcome, LifelineError> {
        let now = self.inner.ctx.clock.now();
        let alert = {
            let mut st = self.inner.state.lock().await;
            if !st.current.is_active {
                debug!("alert already inactive");
                return Ok(AlertOutcome::Unchanged(st.current.clone()));
            }
            st.current = Alert {
                is_active: false,
                activated_at: st.current.activated_at,
                deactivated_at: Some(now),
            };
            self.inner.commit(&mut st, false).await;
            st.current.clone()
        };
        info!(deactivated_at = %now, "alert cancelled");
        self.fan_out(
            NotificationKind::AlertCancelled,
            "Alert cancelled",
            "The emergency alert was cancelled.",
            now,
        )
        .await;

        self.submit(MutationPayload::CancelAlert { at: now }, alert)
            .await
    }

    async fn fan_out(&self, kind: NotificationKind, title: &str, body: &str, at: DateTime<Utc>) {
        let responders = self.inner.contacts.current().responders();
        if responders.is_empty() {
            warn!(%kind, "no responders to notify");
            return;
        }
        let payload =
            NotificationPayload::new(kind, title, body).with_metadata("at", at.to_rfc3339());
        self.inner
            .ctx
            .notify_all(vec![(Audience::Contacts(responders), payload)])
            .await;
    }

    /// Send an activation change, retrying, and queue it if it cannot land.
    async fn submit(
        &self,
        payload: MutationPayload,
        optimistic: Alert,
    ) -> Result<AlertOutcome, LifelineError> {
        let ctx = &self.inner.ctx;
        if ctx.queue.should_defer(Domain::Alert).await? {
            ctx.queue.enqueue(&payload).await?;
            return Ok(AlertOutcome::PendingSync(optimistic));
        }

        let op = payload.op_name();
        let send = || self.send(&payload);
        match retry_with_backoff(&ctx.backoff, op, send).await {
            Ok(()) => Ok(AlertOutcome::Confirmed(self.inner.reader.current().state().clone())),
            Err(e) if e.is_conflict() => {
                warn!(op, error = %e, "alert change rejected as stale");
                self.adopt_authoritative().await?;
                Err(e)
            }
            Err(e) => {
                ctx.queue.enqueue(&payload).await?;
                if matches!(e, LifelineError::Authorization(_)) {
                    return Err(e);
                }
                warn!(op, error = %e, "alert change queued for replay");
                Ok(AlertOutcome::PendingSync(optimistic))
            }
        }
    }

    /// Issue one remote call for a payload and fold the response.
    async fn send(&self, payload: &MutationPayload) -> Result<(), LifelineError> {
        let remote = &self.inner.ctx.remote;
        match payload {
            MutationPayload::TriggerAlert { at } => {
                let server = remote.trigger_alert(*at).await?;
                self.confirm(|_| server).await;
            }
            MutationPayload::CancelAlert { at } => {
                remote.cancel_alert(*at).await?;
                let at = *at;
                self.confirm(move |confirmed| Alert {
                    is_active: false,
                    activated_at: confirmed.activated_at,
                    deactivated_at: Some(at),
                })
                .await;
            }
            _ => {
                return Err(LifelineError::Internal(format!(
                    "{} is not an alert change",
                    payload.op_name()
                )));
            }
        }
        Ok(())
    }

    async fn confirm(&self, confirmed: impl FnOnce(&Alert) -> Alert) {
        let mut st = self.inner.state.lock().await;
        st.confirmed = confirmed(&st.confirmed);
        st.current = merge_alert(&st.current, &st.confirmed);
        self.inner.commit(&mut st, true).await;
    }
}

#[async_trait]
impl Mutator for AlertCoordinator {
    fn domain(&self) -> Domain {
        Domain::Alert
    }

    async fn restore(&self) -> Result<(), LifelineError> {
        let ctx = &self.inner.ctx;
        let current = ctx.load::<Alert>(Domain::Alert, SnapshotSlot::Current).await?;
        let confirmed = ctx.load::<Alert>(Domain::Alert, SnapshotSlot::Confirmed).await?;
        let Some((version, alert)) = current else {
            return Ok(());
        };

        let mut st = self.inner.state.lock().await;
        st.confirmed = confirmed.map_or_else(|| alert.clone(), |(_, a)| a);
        st.current = alert.clone();
        st.publisher.resume(alert, version, ctx.clock.now());
        info!(version, active = st.current.is_active, "alert state restored");
        Ok(())
    }

    async fn apply_remote(&self, event: RemoteEvent) -> Result<(), LifelineError> {
        let RemoteEvent::AlertUpdated { alert } = event else {
            debug!(domain = %event.domain(), "ignoring event for another domain");
            return Ok(());
        };
        let mut st = self.inner.state.lock().await;
        let current = merge_alert(&st.current, &alert);
        let confirmed = merge_alert(&st.confirmed, &alert);
        if current == st.current && confirmed == st.confirmed {
            return Ok(());
        }
        st.current = current;
        st.confirmed = confirmed;
        self.inner.commit(&mut st, true).await;
        debug!(active = st.current.is_active, "merged remote alert update");
        Ok(())
    }

    async fn refresh(&self) -> Result<(), LifelineError> {
        let fetched = self.inner.ctx.remote.fetch_alert().await?;
        let mut st = self.inner.state.lock().await;
        st.current = merge_alert(&st.current, &fetched);
        st.confirmed = fetched;
        self.inner.commit(&mut st, true).await;
        Ok(())
    }

    async fn adopt_authoritative(&self) -> Result<(), LifelineError> {
        let fetched = self.inner.ctx.remote.fetch_alert().await?;
        let mut st = self.inner.state.lock().await;
        st.current = fetched.clone();
        st.confirmed = fetched;
        self.inner.commit(&mut st, true).await;
        info!(active = st.current.is_active, "adopted authoritative alert");
        Ok(())
    }

    async fn replay(&self, mutation: &PendingMutation) -> Result<(), LifelineError> {
        match &mutation.payload {
            MutationPayload::TriggerAlert { .. } | MutationPayload::CancelAlert { .. } => {
                self.send(&mutation.payload).await
            }
            _ => Err(misrouted(Domain::Alert, mutation)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(m: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap() + Duration::minutes(m)
    }

    fn active(m: i64) -> Alert {
        Alert {
            is_active: true,
            activated_at: Some(at(m)),
            deactivated_at: None,
        }
    }

    #[test]
    fn merge_keeps_newer_local_transition() {
        let local = Alert {
            is_active: false,
            activated_at: Some(at(0)),
            deactivated_at: Some(at(10)),
        };
        // A late echo of the activation must not reopen a cancelled alert.
        assert_eq!(merge_alert(&local, &active(0)), local);
        assert_eq!(merge_alert(&local, &active(20)), active(20));
    }

    #[test]
    fn merge_accepts_first_activation() {
        assert_eq!(merge_alert(&Alert::default(), &active(1)), active(1));
    }

    #[test]
    fn outcome_exposes_alert() {
        let outcome = AlertOutcome::Unchanged(active(3));
        assert_eq!(outcome.alert().activated_at, Some(at(3)));
    }
}
