// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the external collaborators.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod notifier;
pub mod remote;
pub mod storage;

pub use adapter::PluginAdapter;
pub use notifier::Notifier;
pub use remote::{RemoteBackend, RemoteEventStream, SyncSource};
pub use storage::StorageAdapter;
