// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Drives time-based transitions: check-in escalation and ping expiry.

use std::sync::Arc;

use lifeline_core::Clock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::checkin::CheckInScheduler;
use crate::ping::PingCoordinator;

/// Spawn the escalation timer.
///
/// Sleeps until the next deadline and re-arms whenever either domain
/// publishes, so a fresh check-in reschedules it immediately.
pub fn spawn_escalation_timer(
    scheduler: CheckInScheduler,
    pings: PingCoordinator,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut user_rx = scheduler.reader();
        let mut contacts_rx = pings.reader();
        loop {
            match scheduler.tick().await {
                Ok(Some(status)) => debug!(%status, "escalation tick"),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "escalation tick failed"),
            }
            if let Err(e) = pings.expire_pings().await {
                warn!(error = %e, "ping expiry failed");
            }

            let next = match (scheduler.next_transition_at(), pings.next_expiry_at().await) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            // Ticks publish too; only changes after this point should re-arm.
            user_rx.mark_seen();
            contacts_rx.mark_seen();

            let sleep = async {
                match next {
                    Some(at) => {
                        let delay = (at - clock.now()).to_std().unwrap_or_default();
                        tokio::time::sleep(delay).await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = user_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                changed = contacts_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = sleep => {}
            }
        }
    })
}
