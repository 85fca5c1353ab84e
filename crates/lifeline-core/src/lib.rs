// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Lifeline safety coordinator.
//!
//! This crate provides the domain entities (user, contacts, pings, alert), the
//! error taxonomy, the offline mutation and remote event shapes, and the
//! adapter traits for the external collaborators: the remote backend, the push
//! subscription, local storage, and notification delivery.

pub mod clock;
pub mod error;
pub mod event;
pub mod model;
pub mod mutation;
pub mod notification;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use clock::{Clock, SystemClock};
pub use error::LifelineError;
pub use event::RemoteEvent;
pub use model::{Alert, CheckInStatus, ClearReason, Contact, Ping, PingDirection, PingStatus, User};
pub use mutation::{MutationPayload, PendingMutation};
pub use notification::{Audience, NotificationKind, NotificationPayload};
pub use types::{AdapterType, ContactId, Domain, HealthStatus, PingId, UserId};

// Re-export all adapter traits at crate root.
pub use traits::{
    Notifier, PluginAdapter, RemoteBackend, RemoteEventStream, StorageAdapter, SyncSource,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifeline_error_taxonomy_is_constructible() {
        let _role = LifelineError::role_violation("dependent cannot ping a responder");
        let _validation = LifelineError::Validation("interval must be positive".into());
        let _connectivity = LifelineError::connectivity("offline");
        let _conflict = LifelineError::Conflict {
            message: "stale".into(),
        };
        let _auth = LifelineError::Authorization("token expired".into());
        let _unknown = LifelineError::Unknown {
            message: "500".into(),
            source: None,
        };
        let _storage = LifelineError::Storage {
            source: Box::new(std::io::Error::other("disk")),
        };
    }

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_remote_backend<T: RemoteBackend>() {}
        fn _assert_sync_source<T: SyncSource>() {}
        fn _assert_storage_adapter<T: StorageAdapter>() {}
        fn _assert_notifier<T: Notifier>() {}
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
