// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canned records for tests.

use chrono::{DateTime, Duration, Utc};
use lifeline_core::{
    CheckInStatus, Contact, ContactId, Ping, PingDirection, PingId, PingStatus, User, UserId,
};

use crate::clock::epoch;

pub const SELF_ID: &str = "u-self";

/// The reference instant every fixture is stamped with.
pub fn t0() -> DateTime<Utc> {
    epoch()
}

/// Checked in at [`t0`], 24h interval, 2h reminder lead.
pub fn user() -> User {
    user_with(Duration::hours(24), Duration::hours(2))
}

pub fn user_with(interval: Duration, lead: Duration) -> User {
    User {
        id: UserId(SELF_ID.into()),
        name: "Ada".into(),
        check_in_interval: interval,
        reminder_lead_time: lead,
        last_check_in_at: t0(),
        next_deadline_at: t0() + interval,
        status: CheckInStatus::Active,
        updated_at: t0(),
    }
}

pub fn contact(id: &str, is_responder: bool, is_dependent: bool) -> Contact {
    Contact {
        id: ContactId(id.into()),
        counterpart_user_id: UserId(format!("u-{id}")),
        name: format!("Contact {id}"),
        is_responder_of_self: is_responder,
        is_dependent_of_self: is_dependent,
        last_updated_at: t0(),
    }
}

/// A contact who may ping self and receives self's alerts.
pub fn responder(id: &str) -> Contact {
    contact(id, true, false)
}

/// A contact self may ping.
pub fn dependent(id: &str) -> Contact {
    contact(id, false, true)
}

/// A pending ping from `contact_id`'s counterpart to self.
pub fn incoming_ping(id: &str, contact_id: &str, at: DateTime<Utc>) -> Ping {
    Ping {
        id: PingId(id.into()),
        contact_id: ContactId(contact_id.into()),
        direction: PingDirection::Incoming,
        sender_user_id: UserId(format!("u-{contact_id}")),
        recipient_user_id: UserId(SELF_ID.into()),
        created_at: at,
        status: PingStatus::Pending,
        responded_at: None,
        cleared_reason: None,
        updated_at: at,
    }
}
