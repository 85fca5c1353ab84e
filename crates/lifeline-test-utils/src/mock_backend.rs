// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory stand-in for the remote backend and its push subscription.
//!
//! `MockBackend` keeps an authoritative copy of one user's records and
//! applies the same rules a real server would: role checks on pings,
//! idempotent alert activation, terminal ping statuses. Every accepted write
//! is echoed to subscribers, as the real push channel does.
//!
//! Tests steer it with:
//! - [`MockBackend::set_online`] to simulate connectivity loss
//! - [`MockBackend::fail_next`] to inject one error for one operation
//! - [`MockBackend::hold`] / [`MockBackend::release`] to park a call mid-flight
//! - the `remote_*` methods to simulate changes made on another device

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::stream;
use lifeline_core::types::{
    Ack, AdapterType, BatchAck, CheckInReceipt, CheckInRequest, ContactsPayload, HealthStatus,
};
use lifeline_core::{
    Alert, CheckInStatus, ClearReason, Clock, Contact, ContactId, Domain, LifelineError, Ping,
    PingDirection, PingId, PingStatus, PluginAdapter, RemoteBackend, RemoteEvent,
    RemoteEventStream, SyncSource, User,
};
use tokio::sync::{Mutex, Notify, broadcast, watch};
use tracing::debug;

#[derive(Default)]
struct ServerState {
    user: Option<User>,
    contacts: BTreeMap<ContactId, Contact>,
    pings: BTreeMap<PingId, Ping>,
    alert: Alert,
}

struct Gate {
    entered: Notify,
    release: Notify,
}

/// A scripted, stateful remote backend.
pub struct MockBackend {
    clock: Arc<dyn Clock>,
    state: Mutex<ServerState>,
    online: AtomicBool,
    failures: Mutex<HashMap<&'static str, VecDeque<LifelineError>>>,
    calls: Mutex<Vec<String>>,
    gates: Mutex<HashMap<&'static str, Arc<Gate>>>,
    next_id: AtomicU64,
    events: broadcast::Sender<RemoteEvent>,
    generation: watch::Sender<u64>,
}

impl MockBackend {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(256);
        let (generation, _) = watch::channel(0);
        Self {
            clock,
            state: Mutex::new(ServerState::default()),
            online: AtomicBool::new(true),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            gates: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            events,
            generation,
        }
    }

    // --- seeding ---

    pub async fn set_user(&self, user: User) {
        self.state.lock().await.user = Some(user);
    }

    pub async fn add_contact(&self, contact: Contact) {
        self.state
            .lock()
            .await
            .contacts
            .insert(contact.id.clone(), contact);
    }

    pub async fn add_ping(&self, ping: Ping) {
        self.state.lock().await.pings.insert(ping.id.clone(), ping);
    }

    pub async fn set_alert(&self, alert: Alert) {
        self.state.lock().await.alert = alert;
    }

    // --- steering ---

    /// While offline, every call fails with a connectivity error and open
    /// subscriptions end.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        if !online {
            self.drop_subscriptions();
        }
    }

    /// Fail the next call to `op` with `error`. Calls queue up in order.
    pub async fn fail_next(&self, op: &'static str, error: LifelineError) {
        self.failures
            .lock()
            .await
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Fail the next `times` calls to `op` with errors built by `make`.
    pub async fn fail_times(
        &self,
        op: &'static str,
        times: usize,
        make: impl Fn() -> LifelineError,
    ) {
        let mut failures = self.failures.lock().await;
        let queue = failures.entry(op).or_default();
        for _ in 0..times {
            queue.push_back(make());
        }
    }

    /// Park the next call to `op` until [`release`](Self::release) is called.
    pub async fn hold(&self, op: &'static str) {
        self.gates.lock().await.insert(
            op,
            Arc::new(Gate {
                entered: Notify::new(),
                release: Notify::new(),
            }),
        );
    }

    /// Wait until a held call to `op` has arrived.
    pub async fn wait_until_held(&self, op: &'static str) {
        let gate = self.gates.lock().await.get(op).cloned();
        if let Some(gate) = gate {
            gate.entered.notified().await;
        }
    }

    /// Let a held call to `op` proceed.
    pub async fn release(&self, op: &'static str) {
        if let Some(gate) = self.gates.lock().await.remove(op) {
            gate.release.notify_one();
        }
    }

    /// End every open subscription; clients will reconnect.
    pub fn drop_subscriptions(&self) {
        self.generation.send_modify(|g| *g += 1);
    }

    /// Names of the operations called so far, oldest first.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self, op: &str) -> usize {
        self.calls.lock().await.iter().filter(|c| *c == op).count()
    }

    // --- inspection ---

    pub async fn user(&self) -> Option<User> {
        self.state.lock().await.user.clone()
    }

    pub async fn contact(&self, id: &ContactId) -> Option<Contact> {
        self.state.lock().await.contacts.get(id).cloned()
    }

    pub async fn ping(&self, id: &PingId) -> Option<Ping> {
        self.state.lock().await.pings.get(id).cloned()
    }

    pub async fn pings(&self) -> Vec<Ping> {
        self.state.lock().await.pings.values().cloned().collect()
    }

    pub async fn alert(&self) -> Alert {
        self.state.lock().await.alert.clone()
    }

    // --- changes made elsewhere ---

    /// Push an event without touching server state.
    pub fn push_event(&self, event: RemoteEvent) {
        // No subscribers is fine; the next refresh picks the state up.
        let _ = self.events.send(event);
    }

    pub async fn remote_update_user(&self, user: User) {
        self.state.lock().await.user = Some(user.clone());
        self.push_event(RemoteEvent::UserUpdated { user });
    }

    pub async fn remote_upsert_contact(&self, contact: Contact) {
        self.add_contact(contact.clone()).await;
        self.push_event(RemoteEvent::ContactUpserted { contact });
    }

    pub async fn remote_remove_contact(&self, contact_id: &ContactId) {
        self.state.lock().await.contacts.remove(contact_id);
        self.push_event(RemoteEvent::ContactRemoved {
            contact_id: contact_id.clone(),
            server_ts: self.clock.now(),
        });
    }

    pub async fn remote_upsert_ping(&self, ping: Ping) {
        self.add_ping(ping.clone()).await;
        self.push_event(RemoteEvent::PingUpserted { ping });
    }

    pub async fn remote_set_alert(&self, alert: Alert) {
        self.set_alert(alert.clone()).await;
        self.push_event(RemoteEvent::AlertUpdated { alert });
    }

    async fn begin(&self, op: &'static str) -> Result<(), LifelineError> {
        self.calls.lock().await.push(op.to_string());
        let gate = self.gates.lock().await.get(op).cloned();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if !self.online.load(Ordering::SeqCst) {
            return Err(LifelineError::connectivity(format!("{op}: network unreachable")));
        }
        let injected = self
            .failures
            .lock()
            .await
            .get_mut(op)
            .and_then(VecDeque::pop_front);
        match injected {
            Some(error) => {
                debug!(op, error = %error, "injected failure");
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn server_ping_id(&self) -> PingId {
        PingId(format!("ping-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    fn respond_one(
        state: &mut ServerState,
        id: &PingId,
        at: DateTime<Utc>,
    ) -> Result<Option<Ping>, LifelineError> {
        let ping = state
            .pings
            .get(id)
            .cloned()
            .ok_or_else(|| LifelineError::not_found("ping", id))?;
        match ping.status {
            PingStatus::Responded => return Ok(None),
            PingStatus::Cleared | PingStatus::Expired => {
                return Err(LifelineError::Conflict {
                    message: format!("ping {id} is {}", ping.status),
                });
            }
            PingStatus::Pending => {}
        }
        if ping.direction != PingDirection::Incoming {
            return Err(LifelineError::role_violation("cannot respond to an outgoing ping"));
        }
        let permitted = state
            .contacts
            .get(&ping.contact_id)
            .is_some_and(|c| ping.is_permitted_by(c));
        if !permitted {
            return Err(LifelineError::Conflict {
                message: format!("contact roles no longer permit ping {id}"),
            });
        }
        let updated = Ping {
            status: PingStatus::Responded,
            responded_at: Some(at),
            updated_at: at,
            ..ping
        };
        state.pings.insert(id.clone(), updated.clone());
        Ok(Some(updated))
    }
}

#[async_trait]
impl PluginAdapter for MockBackend {
    fn name(&self) -> &str {
        "mock-backend"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Remote
    }

    async fn health_check(&self) -> Result<HealthStatus, LifelineError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy("offline".into()))
        }
    }

    async fn shutdown(&self) -> Result<(), LifelineError> {
        self.drop_subscriptions();
        Ok(())
    }
}

#[async_trait]
impl RemoteBackend for MockBackend {
    async fn check_in(&self, request: CheckInRequest) -> Result<CheckInReceipt, LifelineError> {
        self.begin("check_in").await?;
        let mut state = self.state.lock().await;
        let user = state
            .user
            .as_mut()
            .ok_or_else(|| LifelineError::not_found("user", "self"))?;
        // A late replay of an older check-in never moves the deadline back.
        if request.at >= user.last_check_in_at {
            user.last_check_in_at = request.at;
            user.check_in_interval = request.interval;
            user.next_deadline_at = request.at + request.interval;
            user.status = CheckInStatus::Active;
            user.updated_at = user.updated_at.max(request.at);
        }
        let receipt = CheckInReceipt {
            last_check_in_at: user.last_check_in_at,
            next_deadline_at: user.next_deadline_at,
            server_ts: request.at,
        };
        let user = user.clone();
        drop(state);
        self.push_event(RemoteEvent::UserUpdated { user });
        Ok(receipt)
    }

    async fn set_check_in_interval(&self, interval: Duration) -> Result<User, LifelineError> {
        self.begin("set_check_in_interval").await?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let user = state
            .user
            .as_mut()
            .ok_or_else(|| LifelineError::not_found("user", "self"))?;
        if interval <= user.reminder_lead_time {
            return Err(LifelineError::Validation(
                "interval must exceed the reminder lead time".into(),
            ));
        }
        user.check_in_interval = interval;
        user.next_deadline_at = user.last_check_in_at + interval;
        user.updated_at = now;
        let user = user.clone();
        drop(state);
        self.push_event(RemoteEvent::UserUpdated { user: user.clone() });
        Ok(user)
    }

    async fn set_reminder_lead_time(&self, lead: Duration) -> Result<User, LifelineError> {
        self.begin("set_reminder_lead_time").await?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let user = state
            .user
            .as_mut()
            .ok_or_else(|| LifelineError::not_found("user", "self"))?;
        if lead >= user.check_in_interval {
            return Err(LifelineError::Validation(
                "lead time must be shorter than the interval".into(),
            ));
        }
        user.reminder_lead_time = lead;
        user.updated_at = now;
        let user = user.clone();
        drop(state);
        self.push_event(RemoteEvent::UserUpdated { user: user.clone() });
        Ok(user)
    }

    async fn ping_dependent(
        &self,
        contact_id: &ContactId,
        created_at: DateTime<Utc>,
    ) -> Result<Ping, LifelineError> {
        self.begin("ping_dependent").await?;
        let mut state = self.state.lock().await;
        let contact = state
            .contacts
            .get(contact_id)
            .cloned()
            .ok_or_else(|| LifelineError::not_found("contact", contact_id))?;
        if !contact.is_dependent_of_self {
            return Err(LifelineError::role_violation(format!(
                "{} is not a dependent",
                contact.name
            )));
        }
        let sender = state
            .user
            .as_ref()
            .map(|u| u.id.clone())
            .ok_or_else(|| LifelineError::not_found("user", "self"))?;
        let ping = Ping {
            id: self.server_ping_id(),
            contact_id: contact_id.clone(),
            direction: PingDirection::Outgoing,
            sender_user_id: sender,
            recipient_user_id: contact.counterpart_user_id.clone(),
            created_at,
            status: PingStatus::Pending,
            responded_at: None,
            cleared_reason: None,
            updated_at: self.clock.now(),
        };
        state.pings.insert(ping.id.clone(), ping.clone());
        drop(state);
        self.push_event(RemoteEvent::PingUpserted { ping: ping.clone() });
        Ok(ping)
    }

    async fn respond_to_ping(
        &self,
        ping_id: &PingId,
        responded_at: DateTime<Utc>,
    ) -> Result<Ack, LifelineError> {
        self.begin("respond_to_ping").await?;
        let updated = {
            let mut state = self.state.lock().await;
            Self::respond_one(&mut state, ping_id, responded_at)?
        };
        if let Some(ping) = updated {
            self.push_event(RemoteEvent::PingUpserted { ping });
        }
        Ok(Ack {
            server_ts: self.clock.now(),
        })
    }

    async fn respond_to_all_pings(
        &self,
        ping_ids: &[PingId],
        responded_at: DateTime<Utc>,
    ) -> Result<BatchAck, LifelineError> {
        self.begin("respond_to_all_pings").await?;
        let mut batch = BatchAck {
            acknowledged: Vec::new(),
            rejected: Vec::new(),
        };
        let mut updated = Vec::new();
        {
            let mut state = self.state.lock().await;
            for id in ping_ids {
                match Self::respond_one(&mut state, id, responded_at) {
                    Ok(ping) => {
                        batch.acknowledged.push(id.clone());
                        updated.extend(ping);
                    }
                    Err(e) => batch.rejected.push((id.clone(), e.to_string())),
                }
            }
        }
        for ping in updated {
            self.push_event(RemoteEvent::PingUpserted { ping });
        }
        Ok(batch)
    }

    async fn clear_ping(&self, ping_id: &PingId) -> Result<Ack, LifelineError> {
        self.begin("clear_ping").await?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let ping = state
            .pings
            .get_mut(ping_id)
            .ok_or_else(|| LifelineError::not_found("ping", ping_id))?;
        if ping.status == PingStatus::Pending {
            ping.status = PingStatus::Cleared;
            ping.cleared_reason = Some(ClearReason::UserCleared);
            ping.updated_at = now;
            let ping = ping.clone();
            drop(state);
            self.push_event(RemoteEvent::PingUpserted { ping });
        }
        Ok(Ack { server_ts: now })
    }

    async fn set_contact_role(
        &self,
        contact_id: &ContactId,
        is_responder: bool,
        is_dependent: bool,
    ) -> Result<Contact, LifelineError> {
        self.begin("set_contact_role").await?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let contact = state
            .contacts
            .get_mut(contact_id)
            .ok_or_else(|| LifelineError::not_found("contact", contact_id))?;
        contact.is_responder_of_self = is_responder;
        contact.is_dependent_of_self = is_dependent;
        contact.last_updated_at = now;
        let contact = contact.clone();

        let mut cleared = Vec::new();
        for ping in state.pings.values_mut() {
            if ping.contact_id == *contact_id
                && ping.status == PingStatus::Pending
                && !ping.is_permitted_by(&contact)
            {
                ping.status = PingStatus::Cleared;
                ping.cleared_reason = Some(ClearReason::RoleChanged);
                ping.updated_at = now;
                cleared.push(ping.clone());
            }
        }
        drop(state);

        self.push_event(RemoteEvent::ContactUpserted {
            contact: contact.clone(),
        });
        for ping in cleared {
            self.push_event(RemoteEvent::PingUpserted { ping });
        }
        Ok(contact)
    }

    async fn trigger_alert(&self, at: DateTime<Utc>) -> Result<Alert, LifelineError> {
        self.begin("trigger_alert").await?;
        let mut state = self.state.lock().await;
        if state.alert.is_active {
            return Ok(state.alert.clone());
        }
        state.alert = Alert {
            is_active: true,
            activated_at: Some(at),
            deactivated_at: state.alert.deactivated_at,
        };
        let alert = state.alert.clone();
        drop(state);
        self.push_event(RemoteEvent::AlertUpdated {
            alert: alert.clone(),
        });
        Ok(alert)
    }

    async fn cancel_alert(&self, at: DateTime<Utc>) -> Result<Ack, LifelineError> {
        self.begin("cancel_alert").await?;
        let mut state = self.state.lock().await;
        if state.alert.is_active {
            state.alert.is_active = false;
            state.alert.deactivated_at = Some(at);
            let alert = state.alert.clone();
            drop(state);
            self.push_event(RemoteEvent::AlertUpdated { alert });
        }
        Ok(Ack {
            server_ts: self.clock.now(),
        })
    }

    async fn fetch_user(&self) -> Result<User, LifelineError> {
        self.begin("fetch_user").await?;
        self.state
            .lock()
            .await
            .user
            .clone()
            .ok_or_else(|| LifelineError::not_found("user", "self"))
    }

    async fn fetch_contacts(&self) -> Result<ContactsPayload, LifelineError> {
        self.begin("fetch_contacts").await?;
        let state = self.state.lock().await;
        Ok(ContactsPayload {
            contacts: state.contacts.values().cloned().collect(),
            pings: state.pings.values().cloned().collect(),
        })
    }

    async fn fetch_alert(&self) -> Result<Alert, LifelineError> {
        self.begin("fetch_alert").await?;
        Ok(self.state.lock().await.alert.clone())
    }
}

#[async_trait]
impl SyncSource for MockBackend {
    async fn subscribe(&self, domain: Domain) -> Result<RemoteEventStream, LifelineError> {
        self.begin("subscribe").await?;
        let events = self.events.subscribe();
        let generation = self.generation.subscribe();

        let stream = stream::unfold(
            (events, generation),
            move |(mut events, mut generation)| async move {
                loop {
                    tokio::select! {
                        _ = generation.changed() => return None,
                        received = events.recv() => match received {
                            Ok(event) if event.domain() == domain => {
                                return Some((Ok::<_, LifelineError>(event), (events, generation)));
                            }
                            Ok(_) => continue,
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                debug!(skipped, "subscriber lagged");
                                continue;
                            }
                            Err(broadcast::error::RecvError::Closed) => return None,
                        },
                    }
                }
            },
        );
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fixtures;
    use futures::StreamExt;

    fn backend() -> MockBackend {
        MockBackend::new(Arc::new(ManualClock::default()))
    }

    #[tokio::test]
    async fn offline_calls_fail_with_connectivity() {
        let backend = backend();
        backend.set_user(fixtures::user()).await;
        backend.set_online(false);
        let err = backend.fetch_user().await.unwrap_err();
        assert!(err.is_connectivity());
        assert_eq!(backend.call_count("fetch_user").await, 1);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let backend = backend();
        backend.set_user(fixtures::user()).await;
        backend
            .fail_next("fetch_user", LifelineError::Authorization("expired".into()))
            .await;
        assert!(matches!(
            backend.fetch_user().await,
            Err(LifelineError::Authorization(_))
        ));
        assert!(backend.fetch_user().await.is_ok());
    }

    #[tokio::test]
    async fn ping_requires_dependent_role() {
        let backend = backend();
        backend.set_user(fixtures::user()).await;
        backend.add_contact(fixtures::responder("c-r")).await;
        let err = backend
            .ping_dependent(&ContactId("c-r".into()), fixtures::t0())
            .await
            .unwrap_err();
        assert!(matches!(err, LifelineError::RoleViolation { .. }));
    }

    #[tokio::test]
    async fn trigger_alert_is_idempotent() {
        let backend = backend();
        let first = backend.trigger_alert(fixtures::t0()).await.unwrap();
        let second = backend
            .trigger_alert(fixtures::t0() + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn writes_are_echoed_to_subscribers() {
        let backend = backend();
        let mut stream = backend.subscribe(Domain::Alert).await.unwrap();
        backend.trigger_alert(fixtures::t0()).await.unwrap();
        let event = stream.next().await.unwrap().unwrap();
        assert!(matches!(event, RemoteEvent::AlertUpdated { alert } if alert.is_active));
    }

    #[tokio::test]
    async fn dropped_subscriptions_end_the_stream() {
        let backend = backend();
        let mut stream = backend.subscribe(Domain::Contacts).await.unwrap();
        backend.drop_subscriptions();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn role_change_clears_pending_pings() {
        let backend = backend();
        backend.set_user(fixtures::user()).await;
        backend.add_contact(fixtures::responder("c-1")).await;
        backend
            .add_ping(fixtures::incoming_ping("ping-a", "c-1", fixtures::t0()))
            .await;
        backend
            .set_contact_role(&ContactId("c-1".into()), false, false)
            .await
            .unwrap();
        let ping = backend.ping(&PingId("ping-a".into())).await.unwrap();
        assert_eq!(ping.status, PingStatus::Cleared);
        assert_eq!(ping.cleared_reason, Some(ClearReason::RoleChanged));
    }
}
