// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Immutable, versioned snapshots and the single-writer publish capability.
//!
//! A [`StateSnapshot`] can only be produced by a [`Publisher`], and a
//! `Publisher` can only be constructed inside this crate. Each mutator owns
//! exactly one, so the set of code paths that can change what readers see is
//! closed. Readers subscribe through a [`SnapshotReader`], which never blocks
//! the writer and always holds a complete snapshot.

use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lifeline_core::LifelineError;
use tokio::sync::watch;

/// An immutable view of one domain's state at a given version.
#[derive(Debug)]
pub struct StateSnapshot<T> {
    version: u64,
    published_at: DateTime<Utc>,
    state: T,
}

impl<T> StateSnapshot<T> {
    /// Monotonic per-domain version. Increases by one per publish.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    pub fn state(&self) -> &T {
        &self.state
    }
}

impl<T> Deref for StateSnapshot<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.state
    }
}

/// The write capability for one domain.
///
/// Not `Clone`: whoever holds it is the domain's only writer.
#[derive(Debug)]
pub struct Publisher<T> {
    tx: watch::Sender<Arc<StateSnapshot<T>>>,
}

impl<T> Publisher<T> {
    pub(crate) fn new(initial: T, version: u64, at: DateTime<Utc>) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(StateSnapshot {
            version,
            published_at: at,
            state: initial,
        }));
        Self { tx }
    }

    /// Replace the published snapshot with `state` at the next version.
    pub(crate) fn publish(&mut self, state: T, at: DateTime<Utc>) -> Arc<StateSnapshot<T>> {
        let version = self.tx.borrow().version + 1;
        self.replace(state, version, at)
    }

    /// Publish a restored state, resuming from its persisted version.
    ///
    /// The version never goes backwards: a persisted version older than the
    /// live one is bumped past it.
    pub(crate) fn resume(
        &mut self,
        state: T,
        persisted_version: u64,
        at: DateTime<Utc>,
    ) -> Arc<StateSnapshot<T>> {
        let version = persisted_version.max(self.tx.borrow().version + 1);
        self.replace(state, version, at)
    }

    fn replace(&mut self, state: T, version: u64, at: DateTime<Utc>) -> Arc<StateSnapshot<T>> {
        let snapshot = Arc::new(StateSnapshot {
            version,
            published_at: at,
            state,
        });
        self.tx.send_replace(Arc::clone(&snapshot));
        snapshot
    }

    pub fn current(&self) -> Arc<StateSnapshot<T>> {
        Arc::clone(&self.tx.borrow())
    }

    pub fn reader(&self) -> SnapshotReader<T> {
        SnapshotReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read-only handle on a domain's latest snapshot.
#[derive(Debug)]
pub struct SnapshotReader<T> {
    rx: watch::Receiver<Arc<StateSnapshot<T>>>,
}

impl<T> Clone for SnapshotReader<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T> SnapshotReader<T> {
    /// The latest published snapshot.
    pub fn current(&self) -> Arc<StateSnapshot<T>> {
        Arc::clone(&self.rx.borrow())
    }

    /// Treat the latest snapshot as seen, so [`SnapshotReader::changed`]
    /// waits for a later publish.
    pub fn mark_seen(&mut self) {
        let _ = self.rx.borrow_and_update();
    }

    /// Wait for the next publish and return it.
    ///
    /// Fails once the owning mutator has been dropped.
    pub async fn changed(&mut self) -> Result<Arc<StateSnapshot<T>>, LifelineError> {
        self.rx
            .changed()
            .await
            .map_err(|_| LifelineError::Internal("snapshot publisher dropped".to_string()))?;
        Ok(Arc::clone(&self.rx.borrow_and_update()))
    }
}
