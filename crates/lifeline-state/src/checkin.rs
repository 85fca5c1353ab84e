// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The check-in domain: the user's schedule and its escalation.
//!
//! `Active -> Warning -> Overdue -> NonResponsive`, with a fresh check-in
//! returning to `Active` from any state. Escalation is derived from the
//! deadline fields, so restoring a persisted user restores its timers.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use lifeline_config::model::CheckInConfig;
use lifeline_core::model::duration_secs;
use lifeline_core::mutation::{MutationPayload, PendingMutation};
use lifeline_core::types::{CheckInReceipt, CheckInRequest, SnapshotSlot};
use lifeline_core::{
    Audience, CheckInStatus, Domain, LifelineError, NotificationKind, NotificationPayload,
    RemoteEvent, User,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::contacts::ContactsState;
use crate::mutator::{
    Mutator, MutatorContext, WriteOutcome, duration_from_secs, max_span, misrouted,
};
use crate::retry::retry_with_backoff;
use crate::snapshot::{Publisher, SnapshotReader};

/// Published state of the check-in domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserState {
    /// `None` until the first fetch after sign-in.
    pub user: Option<User>,
    /// Time between `Overdue` and `NonResponsive`.
    #[serde(with = "duration_secs")]
    pub grace_period: Duration,
}

impl UserState {
    pub fn status(&self) -> Option<CheckInStatus> {
        self.user.as_ref().map(|u| u.status)
    }

    /// When the current status next escalates, if it can.
    pub fn next_transition_at(&self) -> Option<DateTime<Utc>> {
        let user = self.user.as_ref()?;
        match user.status {
            CheckInStatus::Active => Some(user.reminder_at()),
            CheckInStatus::Warning => Some(user.next_deadline_at),
            CheckInStatus::Overdue => user.next_deadline_at.checked_add_signed(self.grace_period),
            CheckInStatus::NonResponsive => None,
        }
    }
}

/// The status a schedule is in at `now`, ignoring its current status.
pub fn status_at(user: &User, grace: Duration, now: DateTime<Utc>) -> CheckInStatus {
    let non_responsive_at = user.next_deadline_at.checked_add_signed(grace);
    if non_responsive_at.is_some_and(|at| now >= at) {
        CheckInStatus::NonResponsive
    } else if now >= user.next_deadline_at {
        CheckInStatus::Overdue
    } else if now >= user.reminder_at() {
        CheckInStatus::Warning
    } else {
        CheckInStatus::Active
    }
}

/// `at + interval`, unless the deadline would fall outside chrono's range.
fn deadline_after(at: DateTime<Utc>, interval: Duration) -> Result<DateTime<Utc>, LifelineError> {
    at.checked_add_signed(interval).ok_or_else(|| {
        LifelineError::Validation(format!(
            "a {}s check-in interval puts the deadline out of range",
            interval.num_seconds()
        ))
    })
}

/// Reject spans that are not positive or longer than [`max_span`].
fn check_span(what: &str, span: Duration) -> Result<(), LifelineError> {
    if span <= Duration::zero() {
        return Err(LifelineError::Validation(format!("{what} must be positive")));
    }
    if span > max_span() {
        return Err(LifelineError::Validation(format!(
            "{what} of {}s exceeds the {}s limit",
            span.num_seconds(),
            max_span().num_seconds()
        )));
    }
    Ok(())
}

fn apply_check_in(user: &User, at: DateTime<Utc>) -> Result<User, LifelineError> {
    Ok(User {
        last_check_in_at: at,
        next_deadline_at: deadline_after(at, user.check_in_interval)?,
        status: CheckInStatus::Active,
        ..user.clone()
    })
}

/// Server schedules longer than [`max_span`] are clamped to it.
fn clamp_schedule(user: &User) -> User {
    let mut user = user.clone();
    if user.check_in_interval > max_span() || user.reminder_lead_time > max_span() {
        warn!(
            interval_secs = user.check_in_interval.num_seconds(),
            lead_secs = user.reminder_lead_time.num_seconds(),
            "clamping out-of-range schedule from server"
        );
        user.check_in_interval = user.check_in_interval.min(max_span());
        user.reminder_lead_time = user.reminder_lead_time.min(max_span());
    }
    user
}

/// Merge a server copy of the user into a local one.
///
/// Schedule settings are last-write-wins on `updated_at`. Check-in fields
/// follow the later check-in; for the same check-in the more escalated status
/// wins. The deadline is always recomputed from the merged fields; a server
/// record whose deadline cannot be represented is ignored.
fn merge_user(local: &User, incoming: &User) -> User {
    let incoming = &clamp_schedule(incoming);
    let mut merged = local.clone();
    if incoming.updated_at >= local.updated_at {
        merged.name = incoming.name.clone();
        merged.check_in_interval = incoming.check_in_interval;
        merged.reminder_lead_time = incoming.reminder_lead_time;
        merged.updated_at = incoming.updated_at;
    }
    if incoming.last_check_in_at > local.last_check_in_at {
        merged.last_check_in_at = incoming.last_check_in_at;
        merged.status = incoming.status;
    } else if incoming.last_check_in_at == local.last_check_in_at {
        merged.status = local.status.max(incoming.status);
    }
    match deadline_after(merged.last_check_in_at, merged.check_in_interval) {
        Ok(deadline) => {
            merged.next_deadline_at = deadline;
            merged
        }
        Err(e) => {
            warn!(error = %e, "ignoring server user");
            local.clone()
        }
    }
}

fn merge_option(local: Option<&User>, incoming: &User) -> User {
    match local {
        Some(local) => merge_user(local, incoming),
        None => {
            let mut user = clamp_schedule(incoming);
            if let Ok(deadline) = deadline_after(user.last_check_in_at, user.check_in_interval) {
                user.next_deadline_at = deadline;
            }
            user
        }
    }
}

fn payload_duration(secs: i64) -> Result<Duration, LifelineError> {
    Duration::try_seconds(secs)
        .ok_or_else(|| LifelineError::Validation(format!("duration out of range: {secs}s")))
}

/// Result of [`CheckInScheduler::check_in`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckInOutcome {
    /// The server confirmed the check-in.
    Confirmed(User),
    /// Active locally; the check-in waits in the offline queue.
    PendingSync(User),
    /// Another check-in was already in flight and covers this one.
    Coalesced,
}

struct SchedulerState {
    current: Option<User>,
    confirmed: Option<User>,
    in_flight: bool,
    publisher: Publisher<UserState>,
}

struct SchedulerInner {
    ctx: MutatorContext,
    defaults: CheckInConfig,
    grace: Duration,
    contacts: SnapshotReader<ContactsState>,
    state: Mutex<SchedulerState>,
    reader: SnapshotReader<UserState>,
}

impl SchedulerInner {
    async fn commit(&self, st: &mut SchedulerState) {
        let state = UserState {
            user: st.current.clone(),
            grace_period: self.grace,
        };
        let snapshot = st.publisher.publish(state, self.ctx.clock.now());
        self.ctx
            .persist(Domain::CheckIn, SnapshotSlot::Current, snapshot.version(), snapshot.state())
            .await;
    }

    async fn commit_confirmed(&self, st: &mut SchedulerState) {
        self.commit(st).await;
        let version = st.publisher.current().version();
        self.ctx
            .persist(Domain::CheckIn, SnapshotSlot::Confirmed, version, &st.confirmed)
            .await;
    }
}

/// Sole writer of the check-in domain.
#[derive(Clone)]
pub struct CheckInScheduler {
    inner: Arc<SchedulerInner>,
}

impl CheckInScheduler {
    /// `contacts` supplies the responders that escalations fan out to.
    pub fn new(
        ctx: MutatorContext,
        config: &CheckInConfig,
        contacts: SnapshotReader<ContactsState>,
    ) -> Self {
        let grace = duration_from_secs(config.grace_period_secs());
        let publisher = Publisher::new(
            UserState {
                user: None,
                grace_period: grace,
            },
            0,
            ctx.clock.now(),
        );
        let reader = publisher.reader();
        Self {
            inner: Arc::new(SchedulerInner {
                ctx,
                defaults: config.clone(),
                grace,
                contacts,
                state: Mutex::new(SchedulerState {
                    current: None,
                    confirmed: None,
                    in_flight: false,
                    publisher,
                }),
                reader,
            }),
        }
    }

    pub fn reader(&self) -> SnapshotReader<UserState> {
        self.inner.reader.clone()
    }

    /// The user as currently published.
    pub fn user(&self) -> Option<User> {
        self.inner.reader.current().user.clone()
    }

    /// Record a check-in now.
    ///
    /// The new deadline is published immediately. A check-in never rolls
    /// back: if the server cannot be reached after retrying, it is queued.
    pub async fn check_in(&self) -> Result<CheckInOutcome, LifelineError> {
        let now = self.inner.ctx.clock.now();
        let user = {
            let mut st = self.inner.state.lock().await;
            if st.in_flight {
                debug!("check-in already in flight, coalescing");
                return Ok(CheckInOutcome::Coalesced);
            }
            let current = st
                .current
                .as_ref()
                .ok_or_else(|| LifelineError::not_found("user", "self"))?;
            let user = apply_check_in(current, now)?;
            st.current = Some(user.clone());
            st.in_flight = true;
            self.inner.commit(&mut st).await;
            user
        };
        info!(deadline = %user.next_deadline_at, "checked in");

        let result = self.submit_check_in(user).await;
        self.inner.state.lock().await.in_flight = false;
        result
    }

    async fn submit_check_in(&self, user: User) -> Result<CheckInOutcome, LifelineError> {
        let ctx = &self.inner.ctx;
        let request = CheckInRequest {
            at: user.last_check_in_at,
            interval: user.check_in_interval,
        };
        let payload = MutationPayload::CheckIn {
            at: request.at,
            interval_secs: request.interval.num_seconds(),
        };

        if ctx.queue.should_defer(Domain::CheckIn).await? {
            ctx.queue.enqueue(&payload).await?;
            return Ok(CheckInOutcome::PendingSync(user));
        }

        let remote = &ctx.remote;
        let call = move || remote.check_in(request.clone());
        match retry_with_backoff(&ctx.backoff, "check_in", call).await {
            Ok(receipt) => {
                let confirmed = self.confirm_check_in(receipt).await.unwrap_or(user);
                Ok(CheckInOutcome::Confirmed(confirmed))
            }
            Err(e) if e.is_conflict() => {
                warn!(error = %e, "check-in rejected as stale");
                self.adopt_authoritative().await?;
                Err(e)
            }
            Err(e) => {
                ctx.queue.enqueue(&payload).await?;
                if matches!(e, LifelineError::Authorization(_)) {
                    return Err(e);
                }
                warn!(error = %e, "check-in queued for replay");
                Ok(CheckInOutcome::PendingSync(user))
            }
        }
    }

    async fn confirm_check_in(&self, receipt: CheckInReceipt) -> Option<User> {
        let mut st = self.inner.state.lock().await;
        let apply = |user: &User| {
            if receipt.last_check_in_at < user.last_check_in_at {
                return user.clone();
            }
            let next_deadline_at =
                match deadline_after(receipt.last_check_in_at, user.check_in_interval) {
                    Ok(deadline) => deadline,
                    Err(_) => return user.clone(),
                };
            User {
                last_check_in_at: receipt.last_check_in_at,
                next_deadline_at,
                status: CheckInStatus::Active,
                updated_at: receipt.server_ts.max(user.updated_at),
                ..user.clone()
            }
        };
        st.current = st.current.as_ref().map(apply);
        st.confirmed = st.confirmed.as_ref().or(st.current.as_ref()).map(apply);
        self.inner.commit_confirmed(&mut st).await;
        debug!(last_check_in_at = %receipt.last_check_in_at, "check-in confirmed");
        st.current.clone()
    }

    /// Change the check-in interval. The deadline moves with it; the status does not.
    pub async fn set_interval(&self, interval: Duration) -> Result<WriteOutcome, LifelineError> {
        check_span("check-in interval", interval)?;
        self.update_schedule(
            |user| {
                if user.reminder_lead_time >= interval {
                    return Err(LifelineError::Validation(format!(
                        "check-in interval must exceed the reminder lead time of {}s",
                        user.reminder_lead_time.num_seconds()
                    )));
                }
                user.check_in_interval = interval;
                Ok(())
            },
            MutationPayload::SetCheckInInterval {
                interval_secs: interval.num_seconds(),
            },
        )
        .await
    }

    /// Change how long before the deadline the reminder fires.
    pub async fn set_reminder_lead_time(
        &self,
        lead: Duration,
    ) -> Result<WriteOutcome, LifelineError> {
        check_span("reminder lead time", lead)?;
        self.update_schedule(
            |user| {
                if lead >= user.check_in_interval {
                    return Err(LifelineError::Validation(format!(
                        "reminder lead time must be shorter than the {}s interval",
                        user.check_in_interval.num_seconds()
                    )));
                }
                user.reminder_lead_time = lead;
                Ok(())
            },
            MutationPayload::SetReminderLeadTime {
                lead_secs: lead.num_seconds(),
            },
        )
        .await
    }

    async fn update_schedule(
        &self,
        change: impl FnOnce(&mut User) -> Result<(), LifelineError>,
        payload: MutationPayload,
    ) -> Result<WriteOutcome, LifelineError> {
        let ctx = &self.inner.ctx;
        {
            let mut st = self.inner.state.lock().await;
            let mut user = st
                .current
                .clone()
                .ok_or_else(|| LifelineError::not_found("user", "self"))?;
            change(&mut user)?;
            user.next_deadline_at = deadline_after(user.last_check_in_at, user.check_in_interval)?;
            st.current = Some(user);
            self.inner.commit(&mut st).await;
        }

        if ctx.queue.should_defer(Domain::CheckIn).await? {
            ctx.queue.enqueue(&payload).await?;
            return Ok(WriteOutcome::PendingSync);
        }

        let result = match &payload {
            MutationPayload::SetCheckInInterval { interval_secs } => {
                ctx.remote
                    .set_check_in_interval(payload_duration(*interval_secs)?)
                    .await
            }
            MutationPayload::SetReminderLeadTime { lead_secs } => {
                ctx.remote
                    .set_reminder_lead_time(payload_duration(*lead_secs)?)
                    .await
            }
            _ => return Err(LifelineError::Internal("not a schedule change".to_string())),
        };

        match result {
            Ok(server) => {
                self.confirm_user(&server).await;
                Ok(WriteOutcome::Confirmed)
            }
            Err(e) if e.is_connectivity() => {
                ctx.queue.enqueue(&payload).await?;
                Ok(WriteOutcome::PendingSync)
            }
            Err(e) => {
                self.rollback_schedule().await;
                warn!(op = payload.op_name(), error = %e, "schedule change rejected, rolled back");
                Err(e)
            }
        }
    }

    /// Adopt the server's schedule after it acknowledged a change.
    async fn confirm_user(&self, server: &User) {
        let mut st = self.inner.state.lock().await;
        let server = &clamp_schedule(server);
        let adopt = |user: &User| {
            let next_deadline_at =
                match deadline_after(user.last_check_in_at, server.check_in_interval) {
                    Ok(deadline) => deadline,
                    Err(_) => return user.clone(),
                };
            User {
                check_in_interval: server.check_in_interval,
                reminder_lead_time: server.reminder_lead_time,
                next_deadline_at,
                updated_at: server.updated_at.max(user.updated_at),
                ..user.clone()
            }
        };
        st.current = Some(st.current.as_ref().map_or_else(|| server.clone(), adopt));
        st.confirmed = Some(st.confirmed.as_ref().map_or_else(|| server.clone(), adopt));
        self.inner.commit_confirmed(&mut st).await;
    }

    async fn rollback_schedule(&self) {
        let mut st = self.inner.state.lock().await;
        let Some(confirmed) = st.confirmed.clone() else {
            return;
        };
        if let Some(user) = st.current.as_mut() {
            let deadline = deadline_after(user.last_check_in_at, confirmed.check_in_interval);
            if let Ok(deadline) = deadline {
                user.check_in_interval = confirmed.check_in_interval;
                user.reminder_lead_time = confirmed.reminder_lead_time;
                user.next_deadline_at = deadline;
            }
        }
        self.inner.commit(&mut st).await;
    }

    /// Fill in a schedule the server has never set, from configured defaults.
    pub async fn ensure_schedule(&self) -> Result<(), LifelineError> {
        let mut st = self.inner.state.lock().await;
        let Some(user) = st.current.as_mut() else {
            return Ok(());
        };
        if user.check_in_interval > Duration::zero() && user.reminder_lead_time > Duration::zero() {
            return Ok(());
        }
        let interval = duration_from_secs(self.inner.defaults.interval_secs);
        user.next_deadline_at = deadline_after(user.last_check_in_at, interval)?;
        user.check_in_interval = interval;
        user.reminder_lead_time = duration_from_secs(self.inner.defaults.reminder_lead_secs);
        info!(
            interval_secs = self.inner.defaults.interval_secs,
            "applied default check-in schedule"
        );
        self.inner.commit(&mut st).await;
        Ok(())
    }

    /// Escalate the status to where the clock says it should be.
    ///
    /// Escalation only moves forward; only a check-in returns to `Active`.
    /// Returns the new status when it changed.
    pub async fn tick(&self) -> Result<Option<CheckInStatus>, LifelineError> {
        let now = self.inner.ctx.clock.now();
        let (user, previous) = {
            let mut st = self.inner.state.lock().await;
            let Some(user) = st.current.as_mut() else {
                return Ok(None);
            };
            let due = status_at(user, self.inner.grace, now);
            if due <= user.status {
                return Ok(None);
            }
            let previous = user.status;
            user.status = due;
            let user = user.clone();
            self.inner.commit(&mut st).await;
            (user, previous)
        };
        info!(from = %previous, to = %user.status, "check-in status escalated");

        let mut notifications = Vec::new();
        if previous < CheckInStatus::Warning && user.status < CheckInStatus::NonResponsive {
            notifications.push((
                Audience::SelfUser,
                NotificationPayload::new(
                    NotificationKind::CheckInReminder,
                    "Time to check in",
                    format!(
                        "Your check-in is due at {}.",
                        user.next_deadline_at.format("%H:%M UTC")
                    ),
                )
                .with_user(user.id.clone())
                .with_metadata("deadline", user.next_deadline_at.to_rfc3339()),
            ));
        }
        if user.status == CheckInStatus::NonResponsive {
            let responders = self.inner.contacts.current().responders();
            if responders.is_empty() {
                warn!("non-responsive with no responders to notify");
            } else {
                notifications.push((
                    Audience::Contacts(responders),
                    NotificationPayload::new(
                        NotificationKind::DependentOverdue,
                        format!("{} missed a check-in", user.name),
                        format!(
                            "{} has not checked in since {}.",
                            user.name,
                            user.last_check_in_at.format("%Y-%m-%d %H:%M UTC")
                        ),
                    )
                    .with_user(user.id.clone())
                    .with_metadata("status", user.status.to_string()),
                ));
            }
        }
        self.inner.ctx.notify_all(notifications).await;
        Ok(Some(user.status))
    }

    /// When the published status next escalates.
    pub fn next_transition_at(&self) -> Option<DateTime<Utc>> {
        self.inner.reader.current().next_transition_at()
    }
}

#[async_trait]
impl Mutator for CheckInScheduler {
    fn domain(&self) -> Domain {
        Domain::CheckIn
    }

    async fn restore(&self) -> Result<(), LifelineError> {
        let ctx = &self.inner.ctx;
        let current = ctx
            .load::<UserState>(Domain::CheckIn, SnapshotSlot::Current)
            .await?;
        let confirmed = ctx
            .load::<Option<User>>(Domain::CheckIn, SnapshotSlot::Confirmed)
            .await?;
        let Some((version, state)) = current else {
            return Ok(());
        };

        let mut st = self.inner.state.lock().await;
        st.current = state.user;
        st.confirmed = match confirmed {
            Some((_, user)) => user,
            None => st.current.clone(),
        };
        let restored = UserState {
            user: st.current.clone(),
            // Configuration wins over whatever grace was persisted.
            grace_period: self.inner.grace,
        };
        st.publisher.resume(restored, version, ctx.clock.now());
        info!(version, status = ?st.current.as_ref().map(|u| u.status), "check-in state restored");
        Ok(())
    }

    async fn apply_remote(&self, event: RemoteEvent) -> Result<(), LifelineError> {
        let RemoteEvent::UserUpdated { user } = event else {
            debug!(domain = %event.domain(), "ignoring event for another domain");
            return Ok(());
        };
        let mut st = self.inner.state.lock().await;
        let merged = Some(merge_option(st.current.as_ref(), &user));
        let confirmed = Some(merge_option(st.confirmed.as_ref(), &user));
        if st.current == merged && st.confirmed == confirmed {
            return Ok(());
        }
        st.current = merged;
        st.confirmed = confirmed;
        self.inner.commit_confirmed(&mut st).await;
        debug!("merged remote user update");
        Ok(())
    }

    async fn refresh(&self) -> Result<(), LifelineError> {
        let fetched = self.inner.ctx.remote.fetch_user().await?;
        let mut st = self.inner.state.lock().await;
        st.current = Some(merge_option(st.current.as_ref(), &fetched));
        st.confirmed = Some(fetched);
        self.inner.commit_confirmed(&mut st).await;
        Ok(())
    }

    async fn adopt_authoritative(&self) -> Result<(), LifelineError> {
        let mut fetched = clamp_schedule(&self.inner.ctx.remote.fetch_user().await?);
        fetched.next_deadline_at =
            deadline_after(fetched.last_check_in_at, fetched.check_in_interval)?;
        let mut st = self.inner.state.lock().await;
        st.current = Some(fetched.clone());
        st.confirmed = Some(fetched);
        self.inner.commit_confirmed(&mut st).await;
        info!("adopted authoritative check-in state");
        Ok(())
    }

    async fn replay(&self, mutation: &PendingMutation) -> Result<(), LifelineError> {
        let remote = &self.inner.ctx.remote;
        match &mutation.payload {
            MutationPayload::CheckIn { at, interval_secs } => {
                let receipt = remote
                    .check_in(CheckInRequest {
                        at: *at,
                        interval: payload_duration(*interval_secs)?,
                    })
                    .await?;
                self.confirm_check_in(receipt).await;
            }
            MutationPayload::SetCheckInInterval { interval_secs } => {
                let server = remote
                    .set_check_in_interval(payload_duration(*interval_secs)?)
                    .await?;
                self.confirm_user(&server).await;
            }
            MutationPayload::SetReminderLeadTime { lead_secs } => {
                let server = remote
                    .set_reminder_lead_time(payload_duration(*lead_secs)?)
                    .await?;
                self.confirm_user(&server).await;
            }
            _ => return Err(misrouted(Domain::CheckIn, mutation)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lifeline_core::UserId;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 10, 8, 0, 0).unwrap()
    }

    fn user(last: DateTime<Utc>) -> User {
        User {
            id: UserId("u-1".into()),
            name: "Ada".into(),
            check_in_interval: Duration::hours(24),
            reminder_lead_time: Duration::hours(2),
            last_check_in_at: last,
            next_deadline_at: last + Duration::hours(24),
            status: CheckInStatus::Active,
            updated_at: last,
        }
    }

    #[test]
    fn escalation_timeline() {
        let u = user(t0());
        let grace = Duration::hours(2);
        let at = |h: i64| status_at(&u, grace, t0() + Duration::hours(h));

        assert_eq!(at(0), CheckInStatus::Active);
        let just_before = |h: i64| t0() + Duration::hours(h) - Duration::seconds(1);
        assert_eq!(status_at(&u, grace, just_before(22)), CheckInStatus::Active);
        assert_eq!(at(22), CheckInStatus::Warning);
        assert_eq!(at(24), CheckInStatus::Overdue);
        assert_eq!(status_at(&u, grace, just_before(26)), CheckInStatus::Overdue);
        assert_eq!(at(26), CheckInStatus::NonResponsive);
    }

    #[test]
    fn next_transition_follows_status() {
        let mut state = UserState {
            user: Some(user(t0())),
            grace_period: Duration::hours(3),
        };
        assert_eq!(state.next_transition_at(), Some(t0() + Duration::hours(22)));
        state.user.as_mut().unwrap().status = CheckInStatus::Warning;
        assert_eq!(state.next_transition_at(), Some(t0() + Duration::hours(24)));
        state.user.as_mut().unwrap().status = CheckInStatus::Overdue;
        assert_eq!(state.next_transition_at(), Some(t0() + Duration::hours(27)));
        state.user.as_mut().unwrap().status = CheckInStatus::NonResponsive;
        assert_eq!(state.next_transition_at(), None);
    }

    #[test]
    fn check_in_resets_status_and_deadline() {
        let mut u = user(t0());
        u.status = CheckInStatus::NonResponsive;
        let later = t0() + Duration::hours(30);
        let checked = apply_check_in(&u, later).unwrap();
        assert_eq!(checked.status, CheckInStatus::Active);
        assert_eq!(checked.next_deadline_at, later + Duration::hours(24));
    }

    #[test]
    fn merge_prefers_later_check_in_and_newer_settings() {
        let local = apply_check_in(&user(t0()), t0() + Duration::hours(1)).unwrap();
        let mut server = user(t0());
        server.check_in_interval = Duration::hours(12);
        server.updated_at = t0() + Duration::hours(2);
        server.status = CheckInStatus::Overdue;

        let merged = merge_user(&local, &server);

        // Settings come from the newer server record.
        assert_eq!(merged.check_in_interval, Duration::hours(12));
        // The local check-in is later, so its status stands.
        assert_eq!(merged.last_check_in_at, t0() + Duration::hours(1));
        assert_eq!(merged.status, CheckInStatus::Active);
        assert_eq!(merged.next_deadline_at, t0() + Duration::hours(13));
    }

    #[test]
    fn merge_ignores_older_settings_and_keeps_worse_status_for_same_check_in() {
        let mut local = user(t0());
        local.updated_at = t0() + Duration::hours(5);
        local.status = CheckInStatus::Warning;
        let mut stale = user(t0());
        stale.check_in_interval = Duration::hours(1);
        stale.status = CheckInStatus::Overdue;

        let merged = merge_user(&local, &stale);
        assert_eq!(merged.check_in_interval, Duration::hours(24));
        assert_eq!(merged.status, CheckInStatus::Overdue);
    }

    #[test]
    fn merge_clamps_an_out_of_range_server_interval() {
        let local = user(t0());
        let mut server = user(t0());
        server.check_in_interval = Duration::days(100_000_000);
        server.updated_at = t0() + Duration::hours(1);

        let merged = merge_user(&local, &server);
        assert_eq!(merged.check_in_interval, max_span());
        assert_eq!(merged.next_deadline_at, t0() + max_span());

        let fresh = merge_option(None, &server);
        assert_eq!(fresh.check_in_interval, max_span());
        assert_eq!(fresh.next_deadline_at, t0() + max_span());
    }

    #[test]
    fn deadline_past_the_clock_range_is_a_validation_error() {
        let err = deadline_after(DateTime::<Utc>::MAX_UTC, Duration::hours(1)).unwrap_err();
        assert!(matches!(err, LifelineError::Validation(_)));

        let mut u = user(t0());
        u.next_deadline_at = DateTime::<Utc>::MAX_UTC;
        assert_eq!(status_at(&u, Duration::hours(4), t0()), CheckInStatus::Active);
        assert!(check_span("check-in interval", max_span() + Duration::seconds(1)).is_err());
        assert!(check_span("check-in interval", max_span()).is_ok());
    }

    proptest! {
        #[test]
        fn deadline_is_last_check_in_plus_interval(
            interval_mins in 1i64..100_000,
            lead_mins in 1i64..100_000,
            offset_mins in 0i64..1_000_000,
            server_interval_mins in 1i64..100_000,
            server_newer in any::<bool>(),
        ) {
            let mut u = user(t0());
            u.check_in_interval = Duration::minutes(interval_mins);
            u.reminder_lead_time = Duration::minutes(lead_mins.min(interval_mins));
            let checked = apply_check_in(&u, t0() + Duration::minutes(offset_mins)).unwrap();
            prop_assert_eq!(
                checked.next_deadline_at,
                checked.last_check_in_at + checked.check_in_interval
            );

            let mut server = u.clone();
            server.check_in_interval = Duration::minutes(server_interval_mins);
            server.updated_at = if server_newer {
                t0() + Duration::weeks(1000)
            } else {
                t0() - Duration::days(1)
            };
            let merged = merge_user(&checked, &server);
            prop_assert_eq!(
                merged.next_deadline_at,
                merged.last_check_in_at + merged.check_in_interval
            );
        }
    }
}
