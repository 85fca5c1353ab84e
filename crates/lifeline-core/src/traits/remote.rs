// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The remote backend contract and the push subscription.
//!
//! Names are logical operations, not a wire format. Implementations map
//! transport failures onto [`LifelineError::Connectivity`], stale writes onto
//! [`LifelineError::Conflict`], and expired sessions onto
//! [`LifelineError::Authorization`].

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::LifelineError;
use crate::event::RemoteEvent;
use crate::model::{Alert, Contact, Ping, User};
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Ack, BatchAck, CheckInReceipt, CheckInRequest, ContactId, ContactsPayload, Domain, PingId,
};

/// A stream of remote-origin change events for one domain.
pub type RemoteEventStream =
    Pin<Box<dyn futures_core::Stream<Item = Result<RemoteEvent, LifelineError>> + Send>>;

/// Request/response operations against the backend.
#[async_trait]
pub trait RemoteBackend: PluginAdapter {
    /// Records a check-in made at `request.at`.
    async fn check_in(&self, request: CheckInRequest) -> Result<CheckInReceipt, LifelineError>;

    async fn set_check_in_interval(&self, interval: Duration) -> Result<User, LifelineError>;

    async fn set_reminder_lead_time(&self, lead: Duration) -> Result<User, LifelineError>;

    /// Creates a ping from self to the contact's counterpart.
    async fn ping_dependent(
        &self,
        contact_id: &ContactId,
        created_at: DateTime<Utc>,
    ) -> Result<Ping, LifelineError>;

    async fn respond_to_ping(
        &self,
        ping_id: &PingId,
        responded_at: DateTime<Utc>,
    ) -> Result<Ack, LifelineError>;

    /// Responds to every listed ping; the server reports per-ping outcomes.
    async fn respond_to_all_pings(
        &self,
        ping_ids: &[PingId],
        responded_at: DateTime<Utc>,
    ) -> Result<BatchAck, LifelineError>;

    async fn clear_ping(&self, ping_id: &PingId) -> Result<Ack, LifelineError>;

    async fn set_contact_role(
        &self,
        contact_id: &ContactId,
        is_responder: bool,
        is_dependent: bool,
    ) -> Result<Contact, LifelineError>;

    /// Activates the alert. Idempotent on the server for the same activation.
    async fn trigger_alert(&self, at: DateTime<Utc>) -> Result<Alert, LifelineError>;

    async fn cancel_alert(&self, at: DateTime<Utc>) -> Result<Ack, LifelineError>;

    async fn fetch_user(&self) -> Result<User, LifelineError>;

    async fn fetch_contacts(&self) -> Result<ContactsPayload, LifelineError>;

    async fn fetch_alert(&self) -> Result<Alert, LifelineError>;
}

/// Long-lived push subscription delivering remote-origin changes.
#[async_trait]
pub trait SyncSource: PluginAdapter {
    /// Opens a subscription for one domain. The stream ends when the
    /// connection drops; callers reconnect.
    async fn subscribe(&self, domain: Domain) -> Result<RemoteEventStream, LifelineError>;
}
