// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serialized intents waiting in the offline queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ContactId, Domain, MutationStatus, PingId};

/// A write intent that could not reach the remote service.
///
/// Every variant carries the instants it was issued at, so a replay reproduces
/// the exact request an online call would have made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MutationPayload {
    CheckIn {
        at: DateTime<Utc>,
        interval_secs: i64,
    },
    SetCheckInInterval {
        interval_secs: i64,
    },
    SetReminderLeadTime {
        lead_secs: i64,
    },
    PingDependent {
        local_id: PingId,
        contact_id: ContactId,
        created_at: DateTime<Utc>,
    },
    RespondToPing {
        ping_id: PingId,
        responded_at: DateTime<Utc>,
    },
    ClearPing {
        ping_id: PingId,
    },
    TriggerAlert {
        at: DateTime<Utc>,
    },
    CancelAlert {
        at: DateTime<Utc>,
    },
}

impl MutationPayload {
    /// The domain whose mutator replays this payload.
    pub fn domain(&self) -> Domain {
        match self {
            Self::CheckIn { .. }
            | Self::SetCheckInInterval { .. }
            | Self::SetReminderLeadTime { .. } => Domain::CheckIn,
            Self::PingDependent { .. } | Self::RespondToPing { .. } | Self::ClearPing { .. } => {
                Domain::Contacts
            }
            Self::TriggerAlert { .. } | Self::CancelAlert { .. } => Domain::Alert,
        }
    }

    /// Short operation name for logs.
    pub fn op_name(&self) -> &'static str {
        match self {
            Self::CheckIn { .. } => "check_in",
            Self::SetCheckInInterval { .. } => "set_check_in_interval",
            Self::SetReminderLeadTime { .. } => "set_reminder_lead_time",
            Self::PingDependent { .. } => "ping_dependent",
            Self::RespondToPing { .. } => "respond_to_ping",
            Self::ClearPing { .. } => "clear_ping",
            Self::TriggerAlert { .. } => "trigger_alert",
            Self::CancelAlert { .. } => "cancel_alert",
        }
    }
}

/// A queued mutation as persisted by the storage adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutation {
    /// Monotonic queue id; replay order within a domain follows it.
    pub id: i64,
    pub domain: Domain,
    pub payload: MutationPayload,
    pub enqueued_at: DateTime<Utc>,
    pub attempt_count: u32,
    pub status: MutationStatus,
}
