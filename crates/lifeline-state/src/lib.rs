// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reactive state for the Lifeline safety coordinator.
//!
//! Each state domain has exactly one writer:
//! - [`CheckInScheduler`] owns the user's schedule and escalation status
//! - [`ContactsMutator`] owns contacts and, through [`PingCoordinator`], pings
//! - [`AlertCoordinator`] owns the emergency alert
//!
//! Writers publish immutable, versioned snapshots that any number of
//! [`SnapshotReader`]s observe. Writes that cannot reach the server land in
//! the [`OfflineQueue`] and are replayed in order; remote changes arrive
//! through the [`SyncStream`]. A [`Session`] wires it all together.

pub mod alert;
pub mod checkin;
pub mod contacts;
pub mod mutator;
pub mod ping;
pub mod queue;
pub mod retry;
pub mod session;
pub mod snapshot;
pub mod sync;
pub mod timer;

pub use alert::{AlertCoordinator, AlertOutcome};
pub use checkin::{CheckInOutcome, CheckInScheduler, UserState, status_at};
pub use contacts::{ContactsMutator, ContactsState};
pub use mutator::{Mutator, MutatorContext, WriteOutcome};
pub use ping::{PingCoordinator, RespondAllReport};
pub use queue::{OfflineQueue, ReplayReport, SyncStatus};
pub use retry::{BackoffPolicy, retry_with_backoff};
pub use session::{Session, SessionAdapters, SessionPhase};
pub use snapshot::{Publisher, SnapshotReader, StateSnapshot};
pub use sync::SyncStream;
pub use timer::spawn_escalation_timer;
