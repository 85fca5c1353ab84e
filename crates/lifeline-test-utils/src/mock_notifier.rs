// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock notifier capturing every delivered notification.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use lifeline_core::types::{AdapterType, HealthStatus};
use lifeline_core::{
    Audience, LifelineError, NotificationKind, NotificationPayload, Notifier, PluginAdapter,
};
use tokio::sync::Mutex;

/// Records `(audience, payload)` pairs for assertion in tests.
pub struct MockNotifier {
    delivered: Arc<Mutex<Vec<(Audience, NotificationPayload)>>>,
    failing: AtomicBool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            delivered: Arc::new(Mutex::new(Vec::new())),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every subsequent delivery fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All notifications delivered so far, oldest first.
    pub async fn delivered(&self) -> Vec<(Audience, NotificationPayload)> {
        self.delivered.lock().await.clone()
    }

    /// Delivered notifications of one kind.
    pub async fn of_kind(&self, kind: NotificationKind) -> Vec<(Audience, NotificationPayload)> {
        self.delivered
            .lock()
            .await
            .iter()
            .filter(|(_, p)| p.kind == kind)
            .cloned()
            .collect()
    }

    pub async fn count(&self, kind: NotificationKind) -> usize {
        self.of_kind(kind).await.len()
    }

    pub async fn clear(&self) {
        self.delivered.lock().await.clear();
    }
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockNotifier {
    fn name(&self) -> &str {
        "mock-notifier"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Notifier
    }

    async fn health_check(&self) -> Result<HealthStatus, LifelineError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), LifelineError> {
        Ok(())
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn deliver(
        &self,
        audience: Audience,
        payload: NotificationPayload,
    ) -> Result<(), LifelineError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LifelineError::connectivity("push transport unavailable"));
        }
        self.delivered.lock().await.push((audience, payload));
        Ok(())
    }
}
