// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification payloads handed to the delivery transport.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::types::{ContactId, UserId};

/// Kind of notification, matching the push payload `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    CheckInReminder,
    EmergencyAlert,
    ContactPing,
    DependentOverdue,
    AlertCancelled,
    ContactRoleChanged,
    PingCleared,
}

/// Who a notification is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// The signed-in user on this device.
    SelfUser,
    /// The counterparts of the listed contacts.
    Contacts(Vec<ContactId>),
}

/// `{type, title, body, contactId?, userId?, metadata}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub contact_id: Option<ContactId>,
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl NotificationPayload {
    pub fn new(kind: NotificationKind, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            body: body.into(),
            contact_id: None,
            user_id: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_contact(mut self, contact_id: ContactId) -> Self {
        self.contact_id = Some(contact_id);
        self
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_type_field() {
        let payload = NotificationPayload::new(NotificationKind::DependentOverdue, "t", "b")
            .with_user(UserId("u-1".into()))
            .with_metadata("status", "non_responsive");
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["type"], "dependent-overdue");
        assert_eq!(value["user_id"], "u-1");
        assert_eq!(value["metadata"]["status"], "non_responsive");
        assert!(value["contact_id"].is_null());
    }
}
