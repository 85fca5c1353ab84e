// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote-origin change events delivered by a sync subscription.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Alert, Contact, Ping, User};
use crate::types::{ContactId, Domain};

/// A change made elsewhere (another device, another user) and pushed to us.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteEvent {
    UserUpdated { user: User },
    ContactUpserted { contact: Contact },
    ContactRemoved {
        contact_id: ContactId,
        server_ts: DateTime<Utc>,
    },
    PingUpserted { ping: Ping },
    AlertUpdated { alert: Alert },
}

impl RemoteEvent {
    /// The domain whose mutator folds this event.
    pub fn domain(&self) -> Domain {
        match self {
            Self::UserUpdated { .. } => Domain::CheckIn,
            Self::ContactUpserted { .. }
            | Self::ContactRemoved { .. }
            | Self::PingUpserted { .. } => Domain::Contacts,
            Self::AlertUpdated { .. } => Domain::Alert,
        }
    }
}
