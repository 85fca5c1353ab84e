// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The contacts domain: relationships, roles, and the pings that travel over them.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use lifeline_config::model::PingsConfig;
use lifeline_core::mutation::{MutationPayload, PendingMutation};
use lifeline_core::types::SnapshotSlot;
use lifeline_core::{
    Audience, Contact, ContactId, Domain, LifelineError, NotificationKind, NotificationPayload,
    Ping, PingStatus, RemoteEvent, UserId,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::mutator::{Mutator, MutatorContext, duration_from_secs, misrouted};
use crate::ping::{PingBook, PingCoordinator, role_cleared_notifications};
use crate::snapshot::{Publisher, SnapshotReader};

/// Published state of the contacts domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactsState {
    pub contacts: Vec<Contact>,
    pub pending_pings: Vec<Ping>,
    pub ping_history: Vec<Ping>,
}

impl ContactsState {
    pub fn contact(&self, id: &ContactId) -> Option<&Contact> {
        self.contacts.iter().find(|c| &c.id == id)
    }

    /// Contacts that receive self's alerts and escalations.
    pub fn responders(&self) -> Vec<ContactId> {
        self.contacts
            .iter()
            .filter(|c| c.is_responder_of_self)
            .map(|c| c.id.clone())
            .collect()
    }

    pub fn dependents(&self) -> Vec<ContactId> {
        self.contacts
            .iter()
            .filter(|c| c.is_dependent_of_self)
            .map(|c| c.id.clone())
            .collect()
    }
}

pub(crate) struct ContactsWorking {
    pub(crate) contacts: BTreeMap<ContactId, Contact>,
    pub(crate) confirmed: BTreeMap<ContactId, Contact>,
    pub(crate) book: PingBook,
    pub(crate) self_id: Option<UserId>,
    publisher: Publisher<ContactsState>,
}

impl ContactsWorking {
    fn state(&self) -> ContactsState {
        ContactsState {
            contacts: self.contacts.values().cloned().collect(),
            pending_pings: self.book.pending().to_vec(),
            ping_history: self.book.history().to_vec(),
        }
    }

    /// Insert a contact unless the local copy is newer.
    fn upsert(&mut self, contact: Contact) -> bool {
        if let Some(existing) = self.contacts.get(&contact.id) {
            if existing == &contact || contact.last_updated_at < existing.last_updated_at {
                return false;
            }
        }
        self.contacts.insert(contact.id.clone(), contact);
        true
    }

    /// Merge a server ping. A pending ping its contact's roles do not permit
    /// is never admitted.
    fn merge_ping(&mut self, ping: Ping) -> bool {
        if ping.status == PingStatus::Pending {
            let permitted = self
                .contacts
                .get(&ping.contact_id)
                .is_some_and(|c| ping.is_permitted_by(c));
            if !permitted {
                warn!(
                    ping_id = %ping.id,
                    contact_id = %ping.contact_id,
                    "ignoring ping not permitted by contact roles"
                );
                return false;
            }
        }
        self.book.merge_remote(ping)
    }
}

pub(crate) struct ContactsInner {
    pub(crate) ctx: MutatorContext,
    pub(crate) expiry: Duration,
    pub(crate) state: Mutex<ContactsWorking>,
    pub(crate) reader: SnapshotReader<ContactsState>,
}

impl ContactsInner {
    /// Publish the working state and persist it as the current slot.
    pub(crate) async fn commit(&self, st: &mut ContactsWorking) {
        let state = st.state();
        let snapshot = st.publisher.publish(state, self.ctx.clock.now());
        self.ctx
            .persist(Domain::Contacts, SnapshotSlot::Current, snapshot.version(), snapshot.state())
            .await;
    }

    /// As [`ContactsInner::commit`], also persisting the confirmed contacts.
    async fn commit_confirmed(&self, st: &mut ContactsWorking) {
        self.commit(st).await;
        let version = st.publisher.current().version();
        let confirmed: Vec<&Contact> = st.confirmed.values().collect();
        self.ctx
            .persist(Domain::Contacts, SnapshotSlot::Confirmed, version, &confirmed)
            .await;
    }
}

/// Sole writer of the contacts domain.
#[derive(Clone)]
pub struct ContactsMutator {
    inner: Arc<ContactsInner>,
}

impl ContactsMutator {
    pub fn new(ctx: MutatorContext, pings: &PingsConfig) -> Self {
        let publisher = Publisher::new(ContactsState::default(), 0, ctx.clock.now());
        let reader = publisher.reader();
        let expiry = duration_from_secs(pings.expiry_secs);
        Self {
            inner: Arc::new(ContactsInner {
                ctx,
                expiry,
                state: Mutex::new(ContactsWorking {
                    contacts: BTreeMap::new(),
                    confirmed: BTreeMap::new(),
                    book: PingBook::default(),
                    self_id: None,
                    publisher,
                }),
                reader,
            }),
        }
    }

    pub fn reader(&self) -> SnapshotReader<ContactsState> {
        self.inner.reader.clone()
    }

    /// Ping operations, which share this mutator's working state.
    pub fn pings(&self) -> PingCoordinator {
        PingCoordinator::new(Arc::clone(&self.inner))
    }

    /// Set the signed-in user that outgoing pings are sent from.
    pub async fn set_self_id(&self, id: UserId) {
        self.inner.state.lock().await.self_id = Some(id);
    }

    /// Change a contact's roles.
    ///
    /// Pings the new roles no longer permit are cleared in the same step and
    /// stay cleared even if the server rejects the change, in which case the
    /// roles themselves are rolled back and the error is returned.
    pub async fn set_role(
        &self,
        contact_id: &ContactId,
        is_responder: bool,
        is_dependent: bool,
    ) -> Result<Contact, LifelineError> {
        let ctx = &self.inner.ctx;
        let now = ctx.clock.now();

        let (previous, cleared) = {
            let mut st = self.inner.state.lock().await;
            let previous = st
                .contacts
                .get(contact_id)
                .cloned()
                .ok_or_else(|| LifelineError::not_found("contact", contact_id))?;
            let updated = Contact {
                is_responder_of_self: is_responder,
                is_dependent_of_self: is_dependent,
                ..previous.clone()
            };
            let cleared = st.book.on_role_changed(&updated, now);
            st.contacts.insert(contact_id.clone(), updated);
            self.inner.commit(&mut st).await;
            (previous, cleared)
        };
        if !cleared.is_empty() {
            info!(contact_id = %contact_id, count = cleared.len(), "pings cleared by role change");
            ctx.notify_all(role_cleared_notifications(&cleared)).await;
        }

        match ctx
            .remote
            .set_contact_role(contact_id, is_responder, is_dependent)
            .await
        {
            Ok(contact) => {
                let mut st = self.inner.state.lock().await;
                st.contacts.insert(contact.id.clone(), contact.clone());
                st.confirmed.insert(contact.id.clone(), contact.clone());
                let extra = st.book.on_role_changed(&contact, now);
                self.inner.commit_confirmed(&mut st).await;
                drop(st);

                let mut notifications = role_cleared_notifications(&extra);
                notifications.push((
                    Audience::Contacts(vec![contact.id.clone()]),
                    NotificationPayload::new(
                        NotificationKind::ContactRoleChanged,
                        "Contact roles changed",
                        format!("Your relationship with {} was updated.", contact.name),
                    )
                    .with_contact(contact.id.clone())
                    .with_metadata("is_responder", contact.is_responder_of_self.to_string())
                    .with_metadata("is_dependent", contact.is_dependent_of_self.to_string()),
                ));
                ctx.notify_all(notifications).await;
                debug!(contact_id = %contact_id, "role change confirmed");
                Ok(contact)
            }
            Err(e) => {
                let mut st = self.inner.state.lock().await;
                let restored = st.confirmed.get(contact_id).cloned().unwrap_or(previous);
                st.contacts.insert(contact_id.clone(), restored);
                self.inner.commit(&mut st).await;
                warn!(contact_id = %contact_id, error = %e, "role change rejected, rolled back");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Mutator for ContactsMutator {
    fn domain(&self) -> Domain {
        Domain::Contacts
    }

    async fn restore(&self) -> Result<(), LifelineError> {
        let ctx = &self.inner.ctx;
        let current = ctx
            .load::<ContactsState>(Domain::Contacts, SnapshotSlot::Current)
            .await?;
        let confirmed = ctx
            .load::<Vec<Contact>>(Domain::Contacts, SnapshotSlot::Confirmed)
            .await?;
        let Some((version, state)) = current else {
            return Ok(());
        };

        let mut st = self.inner.state.lock().await;
        st.contacts = state.contacts.iter().map(|c| (c.id.clone(), c.clone())).collect();
        st.confirmed = match confirmed {
            Some((_, contacts)) => contacts.into_iter().map(|c| (c.id.clone(), c)).collect(),
            None => st.contacts.clone(),
        };
        st.book = PingBook::from_parts(state.pending_pings.clone(), state.ping_history.clone());
        st.publisher.resume(state, version, ctx.clock.now());
        info!(version, contacts = st.contacts.len(), "contacts restored");
        Ok(())
    }

    async fn apply_remote(&self, event: RemoteEvent) -> Result<(), LifelineError> {
        let now = self.inner.ctx.clock.now();
        let mut st = self.inner.state.lock().await;
        let mut cleared = Vec::new();

        let changed = match event {
            RemoteEvent::ContactUpserted { contact } => {
                st.confirmed.insert(contact.id.clone(), contact.clone());
                let changed = st.upsert(contact.clone());
                if changed {
                    cleared = st.book.on_role_changed(&contact, now);
                }
                changed
            }
            RemoteEvent::ContactRemoved {
                contact_id,
                server_ts,
            } => {
                st.confirmed.remove(&contact_id);
                match st.contacts.get(&contact_id) {
                    Some(c) if c.last_updated_at <= server_ts => {
                        st.contacts.remove(&contact_id);
                        st.book.remove_contact(&contact_id, now);
                        true
                    }
                    _ => false,
                }
            }
            RemoteEvent::PingUpserted { ping } => st.merge_ping(ping),
            other => {
                debug!(domain = %other.domain(), "ignoring event for another domain");
                false
            }
        };

        if changed {
            self.inner.commit_confirmed(&mut st).await;
        }
        drop(st);
        if !cleared.is_empty() {
            self.inner
                .ctx
                .notify_all(role_cleared_notifications(&cleared))
                .await;
        }
        Ok(())
    }

    async fn refresh(&self) -> Result<(), LifelineError> {
        let payload = self.inner.ctx.remote.fetch_contacts().await?;
        let now = self.inner.ctx.clock.now();
        let mut st = self.inner.state.lock().await;

        let fetched: BTreeMap<ContactId, Contact> = payload
            .contacts
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        let gone: Vec<ContactId> = st
            .contacts
            .keys()
            .filter(|id| !fetched.contains_key(*id))
            .cloned()
            .collect();
        for id in &gone {
            st.contacts.remove(id);
            st.book.remove_contact(id, now);
        }
        for contact in fetched.values() {
            st.upsert(contact.clone());
        }
        st.confirmed = fetched;

        let contacts: Vec<Contact> = st.contacts.values().cloned().collect();
        let mut cleared = Vec::new();
        for contact in &contacts {
            cleared.extend(st.book.on_role_changed(contact, now));
        }
        for ping in payload.pings {
            st.merge_ping(ping);
        }
        self.inner.commit_confirmed(&mut st).await;
        debug!(contacts = st.contacts.len(), removed = gone.len(), "contacts refreshed");
        drop(st);

        if !cleared.is_empty() {
            self.inner
                .ctx
                .notify_all(role_cleared_notifications(&cleared))
                .await;
        }
        Ok(())
    }

    async fn adopt_authoritative(&self) -> Result<(), LifelineError> {
        let payload = self.inner.ctx.remote.fetch_contacts().await?;
        let mut st = self.inner.state.lock().await;
        st.contacts = payload
            .contacts
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        st.confirmed = st.contacts.clone();
        st.book.adopt(payload.pings);
        self.inner.commit_confirmed(&mut st).await;
        info!("adopted authoritative contacts");
        Ok(())
    }

    async fn replay(&self, mutation: &PendingMutation) -> Result<(), LifelineError> {
        let ctx = &self.inner.ctx;
        match &mutation.payload {
            MutationPayload::PingDependent {
                local_id,
                contact_id,
                created_at,
            } => {
                let still_pending = {
                    let st = self.inner.state.lock().await;
                    st.book
                        .get(local_id)
                        .is_some_and(|p| p.status == PingStatus::Pending)
                };
                if !still_pending {
                    debug!(ping_id = %local_id, "queued ping no longer pending, skipping");
                    return Ok(());
                }
                let server = ctx.remote.ping_dependent(contact_id, *created_at).await?;
                self.pings().adopt_server_ping(local_id, server).await?;
                Ok(())
            }
            MutationPayload::RespondToPing {
                ping_id,
                responded_at,
            } => {
                let cleared = {
                    let st = self.inner.state.lock().await;
                    st.book
                        .get(ping_id)
                        .is_some_and(|p| p.status == PingStatus::Cleared)
                };
                if cleared {
                    debug!(ping_id = %ping_id, "queued response for cleared ping, skipping");
                    return Ok(());
                }
                ctx.remote.respond_to_ping(ping_id, *responded_at).await?;
                self.inner.state.lock().await.book.confirm_response(ping_id);
                Ok(())
            }
            MutationPayload::ClearPing { ping_id } => {
                ctx.remote.clear_ping(ping_id).await?;
                Ok(())
            }
            _ => Err(misrouted(Domain::Contacts, mutation)),
        }
    }
}
