// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identifiers, adapter metadata, and the request/response shapes of the
//! remote contract.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::model::{Contact, Ping};

/// Unique identifier for a user account.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Unique identifier for a contact relationship.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContactId(pub String);

/// Unique identifier for a ping.
///
/// Pings created locally before the server has confirmed them carry an id
/// with the [`LOCAL_PING_PREFIX`] prefix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PingId(pub String);

/// Prefix for optimistic ping ids that the server has not assigned yet.
pub const LOCAL_PING_PREFIX: &str = "local-";

impl PingId {
    /// Returns `true` if this id was minted locally and never confirmed.
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_PING_PREFIX)
    }
}

macro_rules! display_id {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })*
    };
}

display_id!(UserId, ContactId, PingId);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter plugged into a session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Remote,
    SyncSource,
    Storage,
    Notifier,
}

/// A state domain. Each domain has exactly one mutator.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// The user's own check-in schedule and escalation status.
    CheckIn,
    /// Contacts, their roles, and pings between them.
    Contacts,
    /// The user's manual emergency alert.
    Alert,
}

impl Domain {
    /// All domains in replay order.
    pub const ALL: [Domain; 3] = [Domain::CheckIn, Domain::Alert, Domain::Contacts];
}

/// Which persisted copy of a domain snapshot a record holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum SnapshotSlot {
    /// Last state acknowledged by the server.
    Confirmed,
    /// Last published state, including optimistic changes.
    Current,
}

/// A persisted snapshot body, serialized as JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub domain: Domain,
    pub slot: SnapshotSlot,
    pub version: u64,
    pub body: String,
    pub updated_at: String,
}

/// Lifecycle status of a queued mutation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    /// Waiting for replay.
    Pending,
    /// Handed to the replay routine.
    Processing,
    /// Exhausted its attempts; kept for inspection only.
    Failed,
}

// --- Remote contract shapes ---

/// A check-in submission. Carries the client instant so a replayed check-in
/// is confirmed with the same timestamps an online one would have received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInRequest {
    pub at: DateTime<Utc>,
    #[serde(with = "crate::model::duration_secs")]
    pub interval: Duration,
}

/// Server confirmation of a check-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInReceipt {
    pub last_check_in_at: DateTime<Utc>,
    pub next_deadline_at: DateTime<Utc>,
    pub server_ts: DateTime<Utc>,
}

/// Plain acknowledgement of a remote write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub server_ts: DateTime<Utc>,
}

/// Acknowledgement of a batched ping response, split by outcome.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchAck {
    pub acknowledged: Vec<PingId>,
    /// Rejected pings with the server's reason.
    pub rejected: Vec<(PingId, String)>,
}

/// Full contacts domain as fetched from the server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContactsPayload {
    pub contacts: Vec<Contact>,
    pub pings: Vec<Ping>,
}
