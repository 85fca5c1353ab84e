// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-lived push subscriptions feeding remote-origin changes to the mutators.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use lifeline_core::{LifelineError, SyncSource};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::mutator::Mutator;

/// Spawns one subscription loop per domain.
#[derive(Clone)]
pub struct SyncStream {
    source: Arc<dyn SyncSource + Send + Sync>,
    reconnect_delay: Duration,
}

impl SyncStream {
    pub fn new(source: Arc<dyn SyncSource + Send + Sync>, reconnect_delay: Duration) -> Self {
        Self {
            source,
            reconnect_delay,
        }
    }

    /// Subscribe to `mutator`'s domain until `cancel` fires.
    ///
    /// A dropped subscription is re-opened after the reconnect delay, followed
    /// by a full refresh to pick up anything missed. An authorization failure
    /// ends the loop.
    pub fn spawn(&self, mutator: Arc<dyn Mutator>, cancel: CancellationToken) -> JoinHandle<()> {
        let source = Arc::clone(&self.source);
        let delay = self.reconnect_delay;
        tokio::spawn(async move { run(source, mutator, delay, cancel).await })
    }
}

enum Disconnect {
    Retry,
    Stop,
}

async fn run(
    source: Arc<dyn SyncSource + Send + Sync>,
    mutator: Arc<dyn Mutator>,
    delay: Duration,
    cancel: CancellationToken,
) {
    let domain = mutator.domain();
    loop {
        let disconnect = tokio::select! {
            _ = cancel.cancelled() => return,
            d = receive(source.as_ref(), mutator.as_ref(), &cancel) => d,
        };
        if let Disconnect::Stop = disconnect {
            return;
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        if let Err(e) = mutator.refresh().await {
            warn!(%domain, error = %e, "refresh after reconnect failed");
        }
    }
}

async fn receive(
    source: &(dyn SyncSource + Send + Sync),
    mutator: &dyn Mutator,
    cancel: &CancellationToken,
) -> Disconnect {
    let domain = mutator.domain();
    let mut stream = match source.subscribe(domain).await {
        Ok(stream) => stream,
        Err(LifelineError::Authorization(reason)) => {
            error!(%domain, %reason, "subscription unauthorized, stopping");
            return Disconnect::Stop;
        }
        Err(e) => {
            warn!(%domain, error = %e, "subscribe failed");
            return Disconnect::Retry;
        }
    };
    info!(%domain, "subscribed to remote changes");

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Disconnect::Stop,
            next = stream.next() => next,
        };
        match next {
            Some(Ok(event)) => {
                if let Err(e) = mutator.apply_remote(event).await {
                    warn!(%domain, error = %e, "failed to apply remote change");
                }
            }
            Some(Err(LifelineError::Authorization(reason))) => {
                error!(%domain, %reason, "subscription unauthorized, stopping");
                return Disconnect::Stop;
            }
            Some(Err(e)) => {
                warn!(%domain, error = %e, "subscription error, reconnecting");
                return Disconnect::Retry;
            }
            None => {
                debug!(%domain, "subscription closed, reconnecting");
                return Disconnect::Retry;
            }
        }
    }
}
