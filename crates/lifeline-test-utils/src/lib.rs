// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Lifeline integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic tests without a real backend.
//!
//! # Components
//!
//! - [`MockBackend`] - Stateful mock server implementing `RemoteBackend` and `SyncSource`
//! - [`MockNotifier`] - Captures delivered notifications
//! - [`ManualClock`] / [`InstantClock`] - Deterministic clocks
//! - [`TestHarness`] - A full session over temp storage and the mocks

pub mod clock;
pub mod fixtures;
pub mod harness;
pub mod mock_backend;
pub mod mock_notifier;

pub use clock::{InstantClock, ManualClock};
pub use harness::{ClockMode, TestHarness, TestHarnessBuilder};
pub use mock_backend::MockBackend;
pub use mock_notifier::MockNotifier;
