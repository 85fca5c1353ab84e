// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification delivery adapter (push transport, local banners, etc.).

use async_trait::async_trait;

use crate::error::LifelineError;
use crate::notification::{Audience, NotificationPayload};
use crate::traits::adapter::PluginAdapter;

/// Delivers notifications produced by the mutators.
#[async_trait]
pub trait Notifier: PluginAdapter {
    async fn deliver(
        &self,
        audience: Audience,
        payload: NotificationPayload,
    ) -> Result<(), LifelineError>;
}
