// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain entities mirrored from the server: the user, contacts, pings and the
//! alert singleton.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::types::{ContactId, PingId, UserId};

/// Serde adapter storing a [`chrono::Duration`] as whole seconds.
pub mod duration_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = i64::deserialize(deserializer)?;
        Duration::try_seconds(secs)
            .ok_or_else(|| serde::de::Error::custom(format!("duration out of range: {secs}s")))
    }
}

/// Escalation status of the user's check-in schedule.
///
/// Ordered by severity, so `Warning < Overdue` holds.
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
pub enum CheckInStatus {
    Active,
    Warning,
    Overdue,
    NonResponsive,
}

/// The signed-in user and their check-in schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(with = "duration_secs")]
    pub check_in_interval: Duration,
    #[serde(with = "duration_secs")]
    pub reminder_lead_time: Duration,
    pub last_check_in_at: DateTime<Utc>,
    pub next_deadline_at: DateTime<Utc>,
    pub status: CheckInStatus,
    /// Server timestamp of the last change to this record.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Instant at which the check-in reminder fires, saturating at the
    /// earliest representable time.
    pub fn reminder_at(&self) -> DateTime<Utc> {
        self.next_deadline_at
            .checked_sub_signed(self.reminder_lead_time)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// A relationship with another user.
///
/// `is_responder_of_self` and `is_dependent_of_self` are independent; both may
/// be true at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub counterpart_user_id: UserId,
    pub name: String,
    /// The counterpart may ping self and receives self's alerts.
    pub is_responder_of_self: bool,
    /// Self may ping the counterpart and receives the counterpart's alerts.
    pub is_dependent_of_self: bool,
    pub last_updated_at: DateTime<Utc>,
}

/// Which way a ping travels relative to self.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PingDirection {
    /// Self pinged the contact. Requires the contact to be a dependent of self.
    Outgoing,
    /// The contact pinged self. Requires the contact to be a responder of self.
    Incoming,
}

/// Lifecycle status of a ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PingStatus {
    Pending,
    Responded,
    Cleared,
    Expired,
}

impl PingStatus {
    /// Terminal statuses never transition back to `Pending`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, PingStatus::Pending)
    }
}

/// Why a ping was cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ClearReason {
    /// A participant dismissed the ping.
    UserCleared,
    /// A role change made the ping's direction invalid.
    RoleChanged,
}

/// A directed request from a responder to a dependent for an out-of-band check-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub id: PingId,
    /// The relationship this ping travels over.
    pub contact_id: ContactId,
    pub direction: PingDirection,
    pub sender_user_id: UserId,
    pub recipient_user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub status: PingStatus,
    pub responded_at: Option<DateTime<Utc>>,
    pub cleared_reason: Option<ClearReason>,
    /// Timestamp of the last status change, server-assigned once confirmed.
    pub updated_at: DateTime<Utc>,
}

impl Ping {
    /// Returns `true` if the contact's current roles permit this ping's direction.
    pub fn is_permitted_by(&self, contact: &Contact) -> bool {
        match self.direction {
            PingDirection::Outgoing => contact.is_dependent_of_self,
            PingDirection::Incoming => contact.is_responder_of_self,
        }
    }
}

/// The user's emergency alert. At most one activation period is open at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub is_active: bool,
    pub activated_at: Option<DateTime<Utc>>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Instant of the most recent activation or deactivation.
    pub fn last_transition_at(&self) -> Option<DateTime<Utc>> {
        match (self.activated_at, self.deactivated_at) {
            (Some(a), Some(d)) => Some(a.max(d)),
            (a, d) => a.or(d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    fn contact(responder: bool, dependent: bool) -> Contact {
        Contact {
            id: ContactId("c-1".into()),
            counterpart_user_id: UserId("u-2".into()),
            name: "Sam".into(),
            is_responder_of_self: responder,
            is_dependent_of_self: dependent,
            last_updated_at: t(0),
        }
    }

    fn ping(direction: PingDirection) -> Ping {
        Ping {
            id: PingId("p-1".into()),
            contact_id: ContactId("c-1".into()),
            direction,
            sender_user_id: UserId("u-1".into()),
            recipient_user_id: UserId("u-2".into()),
            created_at: t(0),
            status: PingStatus::Pending,
            responded_at: None,
            cleared_reason: None,
            updated_at: t(0),
        }
    }

    #[test]
    fn check_in_status_orders_by_severity() {
        assert!(CheckInStatus::Active < CheckInStatus::Warning);
        assert!(CheckInStatus::Warning < CheckInStatus::Overdue);
        assert!(CheckInStatus::Overdue < CheckInStatus::NonResponsive);
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!PingStatus::Pending.is_terminal());
        assert!(PingStatus::Responded.is_terminal());
        assert!(PingStatus::Cleared.is_terminal());
        assert!(PingStatus::Expired.is_terminal());
    }

    #[test]
    fn ping_direction_follows_roles() {
        let outgoing = ping(PingDirection::Outgoing);
        let incoming = ping(PingDirection::Incoming);

        assert!(outgoing.is_permitted_by(&contact(false, true)));
        assert!(!outgoing.is_permitted_by(&contact(true, false)));
        assert!(incoming.is_permitted_by(&contact(true, false)));
        assert!(!incoming.is_permitted_by(&contact(false, true)));
        // Both roles at once permit both directions.
        assert!(outgoing.is_permitted_by(&contact(true, true)));
        assert!(incoming.is_permitted_by(&contact(true, true)));
    }

    #[test]
    fn clear_reason_uses_kebab_case() {
        assert_eq!(ClearReason::RoleChanged.to_string(), "role-changed");
        let json = serde_json::to_string(&ClearReason::RoleChanged).unwrap();
        assert_eq!(json, "\"role-changed\"");
    }

    #[test]
    fn user_serializes_durations_as_seconds() {
        let user = User {
            id: UserId("u-1".into()),
            name: "Ada".into(),
            check_in_interval: Duration::hours(24),
            reminder_lead_time: Duration::hours(2),
            last_check_in_at: t(0),
            next_deadline_at: t(24),
            status: CheckInStatus::Active,
            updated_at: t(0),
        };
        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["check_in_interval"], 86_400);
        assert_eq!(value["reminder_lead_time"], 7_200);
        assert_eq!(user.reminder_at(), t(22));
    }

    #[test]
    fn alert_last_transition_picks_latest() {
        let alert = Alert {
            is_active: false,
            activated_at: Some(t(1)),
            deactivated_at: Some(t(3)),
        };
        assert_eq!(alert.last_transition_at(), Some(t(3)));
        assert_eq!(Alert::default().last_transition_at(), None);
    }
}
