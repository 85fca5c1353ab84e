// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ping lifecycle: `Pending -> {Responded | Cleared | Expired}`.
//!
//! [`PingBook`] holds the transition rules. [`PingCoordinator`] drives them
//! against the remote backend, sharing the contacts mutator's working state
//! so a role change and a ping write can never interleave.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use lifeline_core::model::PingDirection;
use lifeline_core::mutation::MutationPayload;
use lifeline_core::types::LOCAL_PING_PREFIX;
use lifeline_core::{
    Audience, ClearReason, Contact, ContactId, Domain, LifelineError, NotificationKind,
    NotificationPayload, Ping, PingId, PingStatus,
};
use tracing::{debug, info, warn};

use crate::contacts::{ContactsInner, ContactsState};
use crate::mutator::WriteOutcome;
use crate::snapshot::SnapshotReader;

/// Pending pings and ping history. A ping is in exactly one of the two.
#[derive(Debug, Clone, Default)]
pub(crate) struct PingBook {
    pending: Vec<Ping>,
    history: Vec<Ping>,
    /// Responded locally, response not yet acknowledged by the server.
    in_flight: BTreeSet<PingId>,
}

/// `None` when the expiry instant is past chrono's range: the ping never expires.
fn expires_at(ping: &Ping, expiry: Duration) -> Option<DateTime<Utc>> {
    ping.created_at.checked_add_signed(expiry)
}

impl PingBook {
    pub(crate) fn from_parts(pending: Vec<Ping>, history: Vec<Ping>) -> Self {
        let mut book = Self::default();
        for ping in pending.into_iter().chain(history) {
            book.take(&ping.id);
            book.place(ping);
        }
        book
    }

    pub(crate) fn pending(&self) -> &[Ping] {
        &self.pending
    }

    pub(crate) fn history(&self) -> &[Ping] {
        &self.history
    }

    pub(crate) fn get(&self, id: &PingId) -> Option<&Ping> {
        self.pending.iter().chain(self.history.iter()).find(|p| &p.id == id)
    }

    fn take(&mut self, id: &PingId) -> Option<Ping> {
        if let Some(idx) = self.pending.iter().position(|p| &p.id == id) {
            return Some(self.pending.remove(idx));
        }
        let idx = self.history.iter().position(|p| &p.id == id)?;
        Some(self.history.remove(idx))
    }

    fn place(&mut self, ping: Ping) {
        if ping.status == PingStatus::Pending {
            self.pending.push(ping);
        } else {
            self.history.push(ping);
        }
    }

    pub(crate) fn insert_pending(&mut self, ping: Ping) {
        self.take(&ping.id);
        self.place(ping);
    }

    /// Ids of pending pings self can respond to.
    pub(crate) fn incoming_pending(&self) -> Vec<PingId> {
        self.pending
            .iter()
            .filter(|p| p.direction == PingDirection::Incoming)
            .map(|p| p.id.clone())
            .collect()
    }

    /// Move a pending incoming ping to history as `Responded`.
    ///
    /// Returns the ping as it was, for [`PingBook::revert_response`].
    pub(crate) fn respond(
        &mut self,
        id: &PingId,
        at: DateTime<Utc>,
    ) -> Result<Ping, LifelineError> {
        let Some(idx) = self.pending.iter().position(|p| &p.id == id) else {
            return Err(match self.get(id) {
                Some(ping) => {
                    LifelineError::Validation(format!("ping {id} is already {}", ping.status))
                }
                None => LifelineError::not_found("ping", id),
            });
        };
        if self.pending[idx].direction == PingDirection::Outgoing {
            return Err(LifelineError::Validation(format!(
                "ping {id} was sent by self and cannot be responded to"
            )));
        }

        let original = self.pending.remove(idx);
        let mut responded = original.clone();
        responded.status = PingStatus::Responded;
        responded.responded_at = Some(at);
        responded.updated_at = at;
        self.history.push(responded);
        self.in_flight.insert(id.clone());
        Ok(original)
    }

    pub(crate) fn confirm_response(&mut self, id: &PingId) {
        self.in_flight.remove(id);
    }

    /// Undo an unacknowledged response. Does nothing if the ping has since
    /// been cleared, so a cleared ping is never resurrected.
    pub(crate) fn revert_response(&mut self, original: Ping) -> bool {
        if !self.in_flight.remove(&original.id) {
            return false;
        }
        let Some(idx) = self
            .history
            .iter()
            .position(|p| p.id == original.id && p.status == PingStatus::Responded)
        else {
            return false;
        };
        self.history.remove(idx);
        self.pending.push(original);
        true
    }

    /// Mark a ping cleared, from pending or history. `None` if it does not
    /// exist or is already cleared.
    pub(crate) fn clear(
        &mut self,
        id: &PingId,
        reason: ClearReason,
        at: DateTime<Utc>,
    ) -> Option<Ping> {
        if self.get(id)?.status == PingStatus::Cleared {
            return None;
        }
        let mut ping = self.take(id)?;
        ping.status = PingStatus::Cleared;
        ping.cleared_reason = Some(reason);
        ping.updated_at = at;
        self.in_flight.remove(id);
        self.history.push(ping.clone());
        Some(ping)
    }

    /// Force-clear every ping over `contact` that its new roles no longer
    /// permit, including responses still in flight.
    pub(crate) fn on_role_changed(&mut self, contact: &Contact, at: DateTime<Utc>) -> Vec<Ping> {
        self.clear_where(at, |ping| {
            ping.contact_id == contact.id && !ping.is_permitted_by(contact)
        })
    }

    /// Clear every live ping over a contact that no longer exists.
    pub(crate) fn remove_contact(
        &mut self,
        contact_id: &ContactId,
        at: DateTime<Utc>,
    ) -> Vec<Ping> {
        self.clear_where(at, |ping| &ping.contact_id == contact_id)
    }

    fn clear_where(&mut self, at: DateTime<Utc>, violates: impl Fn(&Ping) -> bool) -> Vec<Ping> {
        let responding = self
            .history
            .iter()
            .filter(|p| p.status == PingStatus::Responded && self.in_flight.contains(&p.id));
        let ids: Vec<PingId> = self
            .pending
            .iter()
            .chain(responding)
            .filter(|p| violates(p))
            .map(|p| p.id.clone())
            .collect();
        ids.iter()
            .filter_map(|id| self.clear(id, ClearReason::RoleChanged, at))
            .collect()
    }

    /// Expire pending pings created at least `expiry` before `now`.
    pub(crate) fn expire(&mut self, now: DateTime<Utc>, expiry: Duration) -> Vec<Ping> {
        let (expired, keep): (Vec<Ping>, Vec<Ping>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| expires_at(p, expiry).is_some_and(|at| at <= now));
        self.pending = keep;

        expired
            .into_iter()
            .map(|mut ping| {
                ping.status = PingStatus::Expired;
                ping.updated_at = now;
                self.history.push(ping.clone());
                ping
            })
            .collect()
    }

    pub(crate) fn next_expiry(&self, expiry: Duration) -> Option<DateTime<Utc>> {
        self.pending.iter().filter_map(|p| expires_at(p, expiry)).min()
    }

    /// Swap an optimistic local ping for the server's copy.
    ///
    /// If the local ping reached a terminal status meanwhile, it keeps that
    /// status under the server id.
    pub(crate) fn replace_id(&mut self, local: &PingId, server: Ping) -> Option<Ping> {
        let local_ping = self.take(local)?;
        let merged = if local_ping.status.is_terminal() {
            Ping {
                id: server.id.clone(),
                ..local_ping
            }
        } else {
            server
        };
        self.take(&merged.id);
        self.place(merged.clone());
        Some(merged)
    }

    pub(crate) fn remove(&mut self, id: &PingId) -> Option<Ping> {
        self.in_flight.remove(id);
        self.take(id)
    }

    /// Fold a server copy of a ping. Returns `true` if anything changed.
    pub(crate) fn merge_remote(&mut self, ping: Ping) -> bool {
        if let Some(existing) = self.get(&ping.id) {
            if existing == &ping
                || (existing.status.is_terminal() && !ping.status.is_terminal())
                || existing.cleared_reason == Some(ClearReason::RoleChanged)
                || ping.updated_at < existing.updated_at
            {
                return false;
            }
        }
        if ping.status.is_terminal() {
            self.in_flight.remove(&ping.id);
        }
        self.take(&ping.id);
        self.place(ping);
        true
    }

    /// Replace everything with the server's view, keeping local pings the
    /// server has not seen yet.
    pub(crate) fn adopt(&mut self, pings: Vec<Ping>) {
        let local: Vec<Ping> = self
            .pending
            .iter()
            .filter(|p| p.id.is_local())
            .cloned()
            .collect();
        *self = Self::from_parts(Vec::new(), Vec::new());
        for ping in pings.into_iter().chain(local) {
            self.take(&ping.id);
            self.place(ping);
        }
    }
}

/// Notifications for pings force-cleared by a role change: both parties.
pub(crate) fn role_cleared_notifications(cleared: &[Ping]) -> Vec<(Audience, NotificationPayload)> {
    cleared
        .iter()
        .flat_map(|ping| {
            let payload = NotificationPayload::new(
                NotificationKind::PingCleared,
                "Ping cleared",
                "A ping was cleared because a contact's role changed.",
            )
            .with_contact(ping.contact_id.clone())
            .with_metadata("ping_id", ping.id.to_string())
            .with_metadata("reason", ClearReason::RoleChanged.to_string());
            [
                (Audience::SelfUser, payload.clone()),
                (Audience::Contacts(vec![ping.contact_id.clone()]), payload),
            ]
        })
        .collect()
}

fn contact_ping_notification(ping: &Ping) -> (Audience, NotificationPayload) {
    let payload = NotificationPayload::new(
        NotificationKind::ContactPing,
        "Check-in requested",
        "One of your responders is asking you to check in.",
    )
    .with_contact(ping.contact_id.clone())
    .with_user(ping.sender_user_id.clone())
    .with_metadata("ping_id", ping.id.to_string());
    (Audience::Contacts(vec![ping.contact_id.clone()]), payload)
}

/// Result of responding to every pending incoming ping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RespondAllReport {
    /// Acknowledged by the server.
    pub responded: Vec<PingId>,
    /// Rejected by the server, with its reason. These are pending again.
    pub failed: Vec<(PingId, String)>,
    /// Responded locally and queued for replay.
    pub pending_sync: Vec<PingId>,
}

/// Ping operations of the contacts domain.
#[derive(Clone)]
pub struct PingCoordinator {
    inner: Arc<ContactsInner>,
}

impl PingCoordinator {
    pub(crate) fn new(inner: Arc<ContactsInner>) -> Self {
        Self { inner }
    }

    pub fn reader(&self) -> SnapshotReader<ContactsState> {
        self.inner.reader.clone()
    }

    /// Ask a dependent for an out-of-band check-in.
    ///
    /// Rejected with [`LifelineError::RoleViolation`] unless the contact is a
    /// dependent of self; nothing is sent and nothing changes in that case.
    pub async fn ping_dependent(
        &self,
        contact_id: &ContactId,
    ) -> Result<(Ping, WriteOutcome), LifelineError> {
        let ctx = &self.inner.ctx;
        let now = ctx.clock.now();

        let ping = {
            let mut st = self.inner.state.lock().await;
            let contact = st
                .contacts
                .get(contact_id)
                .ok_or_else(|| LifelineError::not_found("contact", contact_id))?;
            if !contact.is_dependent_of_self {
                return Err(LifelineError::role_violation(format!(
                    "{} is not a dependent of self",
                    contact.name
                )));
            }
            let sender = st
                .self_id
                .clone()
                .ok_or_else(|| LifelineError::Internal("no signed-in user".to_string()))?;
            let ping = Ping {
                id: PingId(format!("{LOCAL_PING_PREFIX}{}", uuid::Uuid::new_v4())),
                contact_id: contact_id.clone(),
                direction: PingDirection::Outgoing,
                sender_user_id: sender,
                recipient_user_id: contact.counterpart_user_id.clone(),
                created_at: now,
                status: PingStatus::Pending,
                responded_at: None,
                cleared_reason: None,
                updated_at: now,
            };
            st.book.insert_pending(ping.clone());
            self.inner.commit(&mut st).await;
            ping
        };
        let payload = MutationPayload::PingDependent {
            local_id: ping.id.clone(),
            contact_id: contact_id.clone(),
            created_at: now,
        };

        if ctx.queue.should_defer(Domain::Contacts).await? {
            ctx.queue.enqueue(&payload).await?;
            return Ok((ping, WriteOutcome::PendingSync));
        }

        match ctx.remote.ping_dependent(contact_id, now).await {
            Ok(server) => {
                let confirmed = self.adopt_server_ping(&ping.id, server).await?;
                Ok((confirmed, WriteOutcome::Confirmed))
            }
            Err(e) if e.is_connectivity() => {
                ctx.queue.enqueue(&payload).await?;
                Ok((ping, WriteOutcome::PendingSync))
            }
            Err(e) => {
                let mut st = self.inner.state.lock().await;
                st.book.remove(&ping.id);
                self.inner.commit(&mut st).await;
                warn!(contact_id = %contact_id, error = %e, "ping rejected, rolled back");
                Err(e)
            }
        }
    }

    /// Swap in the server's ping and notify the recipient.
    pub(crate) async fn adopt_server_ping(
        &self,
        local_id: &PingId,
        server: Ping,
    ) -> Result<Ping, LifelineError> {
        let server_id = server.id.clone();
        let merged = {
            let mut st = self.inner.state.lock().await;
            let merged = st.book.replace_id(local_id, server.clone());
            self.inner.commit(&mut st).await;
            merged
        };
        match merged {
            Some(ping) if ping.status == PingStatus::Pending => {
                info!(ping_id = %ping.id, "ping confirmed");
                self.inner
                    .ctx
                    .notify_all(vec![contact_ping_notification(&ping)])
                    .await;
                Ok(ping)
            }
            Some(ping) => {
                // Cleared locally while the create was in flight.
                debug!(ping_id = %server_id, status = %ping.status, "clearing confirmed ping");
                self.clear_remote(&server_id).await?;
                Ok(ping)
            }
            None => {
                debug!(ping_id = %server_id, "local ping gone before confirmation");
                self.clear_remote(&server_id).await?;
                Ok(server)
            }
        }
    }

    async fn clear_remote(&self, id: &PingId) -> Result<WriteOutcome, LifelineError> {
        let ctx = &self.inner.ctx;
        if ctx.queue.should_defer(Domain::Contacts).await? {
            ctx.queue.enqueue(&MutationPayload::ClearPing { ping_id: id.clone() }).await?;
            return Ok(WriteOutcome::PendingSync);
        }
        match ctx.remote.clear_ping(id).await {
            Ok(_) => Ok(WriteOutcome::Confirmed),
            Err(e) if e.is_connectivity() => {
                ctx.queue.enqueue(&MutationPayload::ClearPing { ping_id: id.clone() }).await?;
                Ok(WriteOutcome::PendingSync)
            }
            Err(e) => Err(e),
        }
    }

    /// Respond to one pending incoming ping.
    pub async fn respond_to_ping(&self, id: &PingId) -> Result<WriteOutcome, LifelineError> {
        let ctx = &self.inner.ctx;
        let now = ctx.clock.now();
        let original = {
            let mut st = self.inner.state.lock().await;
            let original = st.book.respond(id, now)?;
            self.inner.commit(&mut st).await;
            original
        };
        let payload = MutationPayload::RespondToPing {
            ping_id: id.clone(),
            responded_at: now,
        };

        if ctx.queue.should_defer(Domain::Contacts).await? {
            ctx.queue.enqueue(&payload).await?;
            return Ok(WriteOutcome::PendingSync);
        }

        match ctx.remote.respond_to_ping(id, now).await {
            Ok(_) => {
                self.inner.state.lock().await.book.confirm_response(id);
                debug!(ping_id = %id, "ping response confirmed");
                Ok(WriteOutcome::Confirmed)
            }
            Err(e) if e.is_connectivity() => {
                ctx.queue.enqueue(&payload).await?;
                Ok(WriteOutcome::PendingSync)
            }
            Err(e) => {
                let mut st = self.inner.state.lock().await;
                if st.book.revert_response(original) {
                    self.inner.commit(&mut st).await;
                }
                warn!(ping_id = %id, error = %e, "ping response rejected");
                Err(e)
            }
        }
    }

    /// Respond to every pending incoming ping in one request.
    ///
    /// Each ping ends up either responded, reported in
    /// [`RespondAllReport::failed`] and pending again, or queued.
    pub async fn respond_to_all_pings(&self) -> Result<RespondAllReport, LifelineError> {
        let ctx = &self.inner.ctx;
        let now = ctx.clock.now();
        let originals = {
            let mut st = self.inner.state.lock().await;
            let ids = st.book.incoming_pending();
            let mut originals = Vec::with_capacity(ids.len());
            for id in &ids {
                originals.push(st.book.respond(id, now)?);
            }
            if !originals.is_empty() {
                self.inner.commit(&mut st).await;
            }
            originals
        };
        if originals.is_empty() {
            return Ok(RespondAllReport::default());
        }
        let ids: Vec<PingId> = originals.iter().map(|p| p.id.clone()).collect();

        if ctx.queue.should_defer(Domain::Contacts).await? {
            return self.queue_responses(ids, now).await;
        }

        match ctx.remote.respond_to_all_pings(&ids, now).await {
            Ok(batch) => {
                let mut report = RespondAllReport::default();
                let mut st = self.inner.state.lock().await;
                let mut reverted = false;
                for original in originals {
                    let id = original.id.clone();
                    if batch.acknowledged.contains(&id) {
                        st.book.confirm_response(&id);
                        report.responded.push(id);
                        continue;
                    }
                    let reason = batch
                        .rejected
                        .iter()
                        .find(|(rejected, _)| rejected == &id)
                        .map(|(_, reason)| reason.clone())
                        .unwrap_or_else(|| "not acknowledged".to_string());
                    reverted |= st.book.revert_response(original);
                    report.failed.push((id, reason));
                }
                if reverted {
                    self.inner.commit(&mut st).await;
                }
                info!(
                    responded = report.responded.len(),
                    failed = report.failed.len(),
                    "responded to pending pings"
                );
                Ok(report)
            }
            Err(e) if e.is_connectivity() => self.queue_responses(ids, now).await,
            Err(e) => {
                let mut st = self.inner.state.lock().await;
                let mut reverted = false;
                for original in originals {
                    reverted |= st.book.revert_response(original);
                }
                if reverted {
                    self.inner.commit(&mut st).await;
                }
                warn!(error = %e, "batch ping response rejected");
                Err(e)
            }
        }
    }

    async fn queue_responses(
        &self,
        ids: Vec<PingId>,
        responded_at: DateTime<Utc>,
    ) -> Result<RespondAllReport, LifelineError> {
        for id in &ids {
            self.inner
                .ctx
                .queue
                .enqueue(&MutationPayload::RespondToPing {
                    ping_id: id.clone(),
                    responded_at,
                })
                .await?;
        }
        Ok(RespondAllReport {
            pending_sync: ids,
            ..RespondAllReport::default()
        })
    }

    /// Clear a ping from pending or history. A missing ping is not an error.
    pub async fn clear_ping(&self, id: &PingId) -> Result<WriteOutcome, LifelineError> {
        let ctx = &self.inner.ctx;
        let now = ctx.clock.now();
        {
            let mut st = self.inner.state.lock().await;
            if st.book.clear(id, ClearReason::UserCleared, now).is_none() {
                debug!(ping_id = %id, "nothing to clear");
                return Ok(WriteOutcome::Confirmed);
            }
            self.inner.commit(&mut st).await;
        }
        if id.is_local() {
            // Never reached the server; a queued create will be skipped.
            return Ok(WriteOutcome::Confirmed);
        }
        self.clear_remote(id).await
    }

    /// Expire stale pending pings.
    pub async fn expire_pings(&self) -> Result<Vec<Ping>, LifelineError> {
        let now = self.inner.ctx.clock.now();
        let mut st = self.inner.state.lock().await;
        let expired = st.book.expire(now, self.inner.expiry);
        if !expired.is_empty() {
            info!(count = expired.len(), "pings expired");
            self.inner.commit(&mut st).await;
        }
        Ok(expired)
    }

    /// When the oldest pending ping expires.
    pub async fn next_expiry_at(&self) -> Option<DateTime<Utc>> {
        let st = self.inner.state.lock().await;
        st.book.next_expiry(self.inner.expiry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lifeline_core::UserId;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn contact(responder: bool, dependent: bool) -> Contact {
        Contact {
            id: ContactId("c-1".into()),
            counterpart_user_id: UserId("u-b".into()),
            name: "Bo".into(),
            is_responder_of_self: responder,
            is_dependent_of_self: dependent,
            last_updated_at: t0(),
        }
    }

    fn ping(id: &str, direction: PingDirection) -> Ping {
        Ping {
            id: PingId(id.into()),
            contact_id: ContactId("c-1".into()),
            direction,
            sender_user_id: UserId("u-a".into()),
            recipient_user_id: UserId("u-b".into()),
            created_at: t0(),
            status: PingStatus::Pending,
            responded_at: None,
            cleared_reason: None,
            updated_at: t0(),
        }
    }

    fn book_with(pings: Vec<Ping>) -> PingBook {
        PingBook::from_parts(pings, Vec::new())
    }

    fn assert_disjoint(book: &PingBook) {
        for p in book.pending() {
            assert!(
                book.history().iter().all(|h| h.id != p.id),
                "{} in both pending and history",
                p.id
            );
        }
    }

    #[test]
    fn respond_moves_to_history_with_timestamp() {
        let mut book = book_with(vec![ping("p-1", PingDirection::Incoming)]);
        let at = t0() + Duration::minutes(5);

        book.respond(&PingId("p-1".into()), at).unwrap();

        assert!(book.pending().is_empty());
        let responded = &book.history()[0];
        assert_eq!(responded.status, PingStatus::Responded);
        assert_eq!(responded.responded_at, Some(at));
        assert_disjoint(&book);
    }

    #[test]
    fn respond_rejects_missing_terminal_and_outgoing() {
        let mut book = book_with(vec![
            ping("in", PingDirection::Incoming),
            ping("out", PingDirection::Outgoing),
        ]);
        assert!(matches!(
            book.respond(&PingId("nope".into()), t0()),
            Err(LifelineError::NotFound { .. })
        ));
        assert!(matches!(
            book.respond(&PingId("out".into()), t0()),
            Err(LifelineError::Validation(_))
        ));
        book.respond(&PingId("in".into()), t0()).unwrap();
        assert!(matches!(
            book.respond(&PingId("in".into()), t0()),
            Err(LifelineError::Validation(_))
        ));
    }

    #[test]
    fn revert_restores_pending_only_while_in_flight() {
        let mut book = book_with(vec![ping("p-1", PingDirection::Incoming)]);
        let original = book.respond(&PingId("p-1".into()), t0()).unwrap();

        assert!(book.revert_response(original.clone()));
        assert_eq!(book.pending()[0].status, PingStatus::Pending);
        assert!(book.history().is_empty());

        book.respond(&PingId("p-1".into()), t0()).unwrap();
        book.confirm_response(&PingId("p-1".into()));
        assert!(!book.revert_response(original));
        assert_eq!(book.history()[0].status, PingStatus::Responded);
    }

    #[test]
    fn role_change_clears_violating_pings_and_beats_in_flight_response() {
        let mut book = book_with(vec![
            ping("out", PingDirection::Outgoing),
            ping("in", PingDirection::Incoming),
        ]);
        let original = book.respond(&PingId("in".into()), t0()).unwrap();

        // Contact is neither responder nor dependent any more.
        let cleared = book.on_role_changed(&contact(false, false), t0() + Duration::seconds(1));

        assert_eq!(cleared.len(), 2);
        assert!(cleared.iter().all(|p| p.cleared_reason == Some(ClearReason::RoleChanged)));
        // The late failure of the response must not bring the ping back.
        assert!(!book.revert_response(original));
        assert!(book.pending().is_empty());
        assert_disjoint(&book);
    }

    #[test]
    fn role_change_keeps_permitted_pings() {
        let mut book = book_with(vec![
            ping("out", PingDirection::Outgoing),
            ping("in", PingDirection::Incoming),
        ]);
        let cleared = book.on_role_changed(&contact(true, false), t0());
        assert_eq!(cleared.len(), 1);
        assert_eq!(cleared[0].id, PingId("out".into()));
        assert_eq!(book.pending()[0].id, PingId("in".into()));
    }

    #[test]
    fn clear_missing_is_none_and_clear_is_idempotent() {
        let mut book = book_with(vec![ping("p-1", PingDirection::Incoming)]);
        assert!(book.clear(&PingId("x".into()), ClearReason::UserCleared, t0()).is_none());
        let cleared = book
            .clear(&PingId("p-1".into()), ClearReason::UserCleared, t0())
            .unwrap();
        assert_eq!(cleared.cleared_reason, Some(ClearReason::UserCleared));
        assert!(book.clear(&PingId("p-1".into()), ClearReason::UserCleared, t0()).is_none());
    }

    #[test]
    fn expire_moves_old_pings_and_reports_next_expiry() {
        let mut young = ping("young", PingDirection::Incoming);
        young.created_at = t0() + Duration::hours(3);
        let mut book = book_with(vec![ping("old", PingDirection::Incoming), young]);
        let expiry = Duration::hours(24);

        assert_eq!(book.next_expiry(expiry), Some(t0() + expiry));
        let expired = book.expire(t0() + expiry, expiry);

        assert_eq!(expired.len(), 1);
        assert_eq!(book.history()[0].status, PingStatus::Expired);
        assert_eq!(book.next_expiry(expiry), Some(t0() + Duration::hours(27)));
    }

    #[test]
    fn unrepresentable_expiry_never_expires() {
        let mut book = book_with(vec![ping("p-1", PingDirection::Incoming)]);

        assert_eq!(book.next_expiry(Duration::MAX), None);
        assert!(book.expire(DateTime::<Utc>::MAX_UTC, Duration::MAX).is_empty());
        assert_eq!(book.pending().len(), 1);
    }

    #[test]
    fn merge_never_resurrects_terminal_pings() {
        let mut book = book_with(vec![ping("p-1", PingDirection::Incoming)]);
        book.respond(&PingId("p-1".into()), t0()).unwrap();

        let mut stale = ping("p-1", PingDirection::Incoming);
        stale.updated_at = t0() + Duration::hours(1);
        assert!(!book.merge_remote(stale));
        assert_eq!(book.history()[0].status, PingStatus::Responded);
    }

    #[test]
    fn merge_ignores_older_updates_and_role_changed_clears() {
        let mut book = book_with(vec![ping("p-1", PingDirection::Outgoing)]);
        book.on_role_changed(&contact(false, false), t0() + Duration::minutes(1));

        let mut responded = ping("p-1", PingDirection::Outgoing);
        responded.status = PingStatus::Responded;
        responded.updated_at = t0() + Duration::minutes(2);
        assert!(!book.merge_remote(responded));

        let mut newer = ping("p-2", PingDirection::Incoming);
        newer.updated_at = t0() + Duration::minutes(5);
        assert!(book.merge_remote(newer.clone()));
        let mut older = newer.clone();
        older.status = PingStatus::Cleared;
        older.updated_at = t0();
        assert!(!book.merge_remote(older));
    }

    #[test]
    fn replace_id_swaps_local_for_server_copy() {
        let mut book = book_with(vec![ping("local-1", PingDirection::Outgoing)]);
        let server = ping("srv-1", PingDirection::Outgoing);

        let merged = book.replace_id(&PingId("local-1".into()), server).unwrap();

        assert_eq!(merged.id, PingId("srv-1".into()));
        assert_eq!(book.pending().len(), 1);
        assert!(book.get(&PingId("local-1".into())).is_none());
    }

    #[test]
    fn replace_id_keeps_local_terminal_status() {
        let mut book = book_with(vec![ping("local-1", PingDirection::Outgoing)]);
        book.clear(&PingId("local-1".into()), ClearReason::UserCleared, t0());

        let merged = book
            .replace_id(&PingId("local-1".into()), ping("srv-1", PingDirection::Outgoing))
            .unwrap();

        assert_eq!(merged.status, PingStatus::Cleared);
        assert!(book.pending().is_empty());
    }

    #[test]
    fn adopt_keeps_unconfirmed_local_pings() {
        let mut book = book_with(vec![
            ping("local-1", PingDirection::Outgoing),
            ping("srv-old", PingDirection::Incoming),
        ]);
        book.adopt(vec![ping("srv-new", PingDirection::Incoming)]);

        let ids: Vec<_> = book.pending().iter().map(|p| p.id.0.as_str()).collect();
        assert_eq!(ids, vec!["srv-new", "local-1"]);
    }

    #[test]
    fn role_clear_notifies_both_parties() {
        let mut cleared = ping("p-1", PingDirection::Outgoing);
        cleared.status = PingStatus::Cleared;
        let notes = role_cleared_notifications(&[cleared]);
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].0, Audience::SelfUser);
        assert_eq!(notes[1].1.metadata["reason"], "role-changed");
    }
}
