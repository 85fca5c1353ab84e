// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session lifecycle: owns the mutators and the background tasks that feed them.
//!
//! A session moves through [`SessionPhase`]s. While `Active` or `Background`
//! it runs one sync subscription per domain plus the escalation timer, all
//! under a single [`CancellationToken`]. Staying in the background past the
//! configured threshold tears those tasks down; [`Session::resume`]
//! re-establishes them from the last snapshot and a fresh fetch.

use std::sync::Arc;
use std::time::Duration;

use lifeline_config::model::LifelineConfig;
use lifeline_core::{
    Clock, Domain, LifelineError, Notifier, RemoteBackend, StorageAdapter, SyncSource,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::alert::AlertCoordinator;
use crate::checkin::CheckInScheduler;
use crate::contacts::ContactsMutator;
use crate::mutator::{Mutator, MutatorContext};
use crate::ping::PingCoordinator;
use crate::queue::{OfflineQueue, ReplayReport, SyncStatus};
use crate::retry::BackoffPolicy;
use crate::snapshot::SnapshotReader;
use crate::sync::SyncStream;
use crate::timer::spawn_escalation_timer;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Not started, or signed out.
    SignedOut,
    /// Foreground with tasks running.
    Active,
    /// Backgrounded with a teardown armed.
    Background,
    /// Backgrounded long enough that tasks were torn down.
    Suspended,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::SignedOut => write!(f, "signed-out"),
            SessionPhase::Active => write!(f, "active"),
            SessionPhase::Background => write!(f, "background"),
            SessionPhase::Suspended => write!(f, "suspended"),
        }
    }
}

/// External collaborators a session is built from.
#[derive(Clone)]
pub struct SessionAdapters {
    pub remote: Arc<dyn RemoteBackend + Send + Sync>,
    pub sync: Arc<dyn SyncSource + Send + Sync>,
    pub storage: Arc<dyn StorageAdapter + Send + Sync>,
    pub notifier: Arc<dyn Notifier + Send + Sync>,
    pub clock: Arc<dyn Clock>,
}

struct RunningTasks {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl RunningTasks {
    async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "session task ended abnormally");
            }
        }
    }
}

struct Lifecycle {
    phase: SessionPhase,
    tasks: Option<RunningTasks>,
    teardown: Option<CancellationToken>,
}

struct SessionInner {
    clock: Arc<dyn Clock>,
    teardown_after: Duration,
    queue: OfflineQueue,
    checkin: CheckInScheduler,
    contacts: ContactsMutator,
    alerts: AlertCoordinator,
    sync: SyncStream,
    lifecycle: Mutex<Lifecycle>,
}

/// A signed-in user's coordinator. Cheap to clone.
///
/// Storage must be initialized before the session is started.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(config: &LifelineConfig, adapters: SessionAdapters) -> Self {
        let SessionAdapters {
            remote,
            sync,
            storage,
            notifier,
            clock,
        } = adapters;

        let queue = OfflineQueue::new(
            Arc::clone(&storage),
            Arc::clone(&clock),
            config.sync.replay_max_attempts,
        );
        let ctx = MutatorContext {
            remote,
            storage,
            notifier,
            clock: Arc::clone(&clock),
            backoff: BackoffPolicy::from_config(&config.sync),
            queue: queue.clone(),
        };
        let contacts = ContactsMutator::new(ctx.clone(), &config.pings);
        let checkin = CheckInScheduler::new(ctx.clone(), &config.checkin, contacts.reader());
        let alerts = AlertCoordinator::new(ctx, contacts.reader());

        Self {
            inner: Arc::new(SessionInner {
                clock,
                teardown_after: Duration::from_secs(config.sync.background_teardown_secs),
                queue,
                checkin,
                contacts,
                alerts,
                sync: SyncStream::new(sync, Duration::from_millis(config.sync.reconnect_delay_ms)),
                lifecycle: Mutex::new(Lifecycle {
                    phase: SessionPhase::SignedOut,
                    tasks: None,
                    teardown: None,
                }),
            }),
        }
    }

    pub fn checkin(&self) -> &CheckInScheduler {
        &self.inner.checkin
    }

    pub fn contacts(&self) -> &ContactsMutator {
        &self.inner.contacts
    }

    pub fn pings(&self) -> PingCoordinator {
        self.inner.contacts.pings()
    }

    pub fn alerts(&self) -> &AlertCoordinator {
        &self.inner.alerts
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.inner.queue
    }

    /// The pending-sync indicator.
    pub fn sync_status(&self) -> SnapshotReader<SyncStatus> {
        self.inner.queue.status()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.inner.lifecycle.lock().await.phase
    }

    /// Restore persisted state, fetch fresh remote state, spawn the session
    /// tasks and replay anything queued.
    ///
    /// Fails when there is neither a persisted nor a fetchable user.
    pub async fn start(&self) -> Result<(), LifelineError> {
        {
            let mut life = self.inner.lifecycle.lock().await;
            if life.phase != SessionPhase::SignedOut {
                debug!(phase = %life.phase, "session already started");
                return Ok(());
            }
            for mutator in self.mutators() {
                mutator.restore().await?;
            }
            self.inner.queue.refresh_status(None).await?;
            self.establish(&mut life).await?;
        }
        info!("session started");
        self.replay_now().await?;
        Ok(())
    }

    /// Cancel every task and disarm any pending teardown.
    pub async fn sign_out(&self) {
        let mut life = self.inner.lifecycle.lock().await;
        if let Some(token) = life.teardown.take() {
            token.cancel();
        }
        if let Some(tasks) = life.tasks.take() {
            tasks.shutdown().await;
        }
        life.phase = SessionPhase::SignedOut;
        info!("signed out");
    }

    /// Arm a teardown that fires after the configured background threshold.
    pub async fn enter_background(&self) {
        let mut life = self.inner.lifecycle.lock().await;
        if life.phase != SessionPhase::Active {
            debug!(phase = %life.phase, "ignoring background transition");
            return;
        }
        let token = CancellationToken::new();
        life.teardown = Some(token.clone());
        life.phase = SessionPhase::Background;

        let session = self.clone();
        let delay = self.inner.teardown_after;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => session.suspend(&token).await,
            }
        });
        debug!(teardown_secs = delay.as_secs(), "entered background");
    }

    async fn suspend(&self, token: &CancellationToken) {
        let mut life = self.inner.lifecycle.lock().await;
        // A resume between the timer firing and this lock disarms the token.
        if token.is_cancelled() || life.phase != SessionPhase::Background {
            return;
        }
        life.teardown = None;
        if let Some(tasks) = life.tasks.take() {
            tasks.shutdown().await;
        }
        life.phase = SessionPhase::Suspended;
        info!("background teardown complete");
    }

    /// Return to the foreground.
    ///
    /// Disarms a pending teardown, or re-establishes a torn-down session and
    /// replays the queue.
    pub async fn resume(&self) -> Result<(), LifelineError> {
        {
            let mut life = self.inner.lifecycle.lock().await;
            match life.phase {
                SessionPhase::Active => return Ok(()),
                SessionPhase::SignedOut => {
                    return Err(LifelineError::Validation(
                        "cannot resume a signed-out session".into(),
                    ));
                }
                SessionPhase::Background => {
                    if let Some(token) = life.teardown.take() {
                        token.cancel();
                    }
                    life.phase = SessionPhase::Active;
                    debug!("resumed before teardown");
                    return Ok(());
                }
                SessionPhase::Suspended => self.establish(&mut life).await?,
            }
        }
        info!("session re-established");
        self.replay_now().await?;
        Ok(())
    }

    /// Feed a connectivity change. Coming online replays every domain.
    pub async fn set_online(
        &self,
        online: bool,
    ) -> Result<Option<Vec<ReplayReport>>, LifelineError> {
        if self.inner.queue.set_online(online).await? {
            return self.replay_now().await.map(Some);
        }
        Ok(None)
    }

    /// Replay every domain's queue, in [`Domain::ALL`] order.
    pub async fn replay_now(&self) -> Result<Vec<ReplayReport>, LifelineError> {
        let mut reports = Vec::new();
        for domain in Domain::ALL {
            let mutator = self.mutator(domain);
            let report = self.inner.queue.replay(mutator.as_ref()).await?;
            if report.replayed + report.discarded + report.failed > 0 {
                info!(
                    domain = %report.domain,
                    replayed = report.replayed,
                    discarded = report.discarded,
                    failed = report.failed,
                    remaining = report.remaining,
                    "replay pass finished"
                );
            }
            reports.push(report);
        }
        Ok(reports)
    }

    fn mutator(&self, domain: Domain) -> Arc<dyn Mutator> {
        match domain {
            Domain::CheckIn => Arc::new(self.inner.checkin.clone()),
            Domain::Contacts => Arc::new(self.inner.contacts.clone()),
            Domain::Alert => Arc::new(self.inner.alerts.clone()),
        }
    }

    /// Contacts first, so escalations fan out to a fresh responder list.
    fn mutators(&self) -> Vec<Arc<dyn Mutator>> {
        [Domain::Contacts, Domain::CheckIn, Domain::Alert]
            .into_iter()
            .map(|d| self.mutator(d))
            .collect()
    }

    async fn establish(&self, life: &mut Lifecycle) -> Result<(), LifelineError> {
        for mutator in self.mutators() {
            let domain = mutator.domain();
            match mutator.refresh().await {
                Ok(()) => debug!(%domain, "fetched remote state"),
                Err(e) if e.is_connectivity() => {
                    warn!(%domain, error = %e, "remote unreachable, using persisted state");
                }
                Err(e) => return Err(e),
            }
        }

        let Some(user) = self.inner.checkin.user() else {
            return Err(LifelineError::not_found("user", "self"));
        };
        self.inner.contacts.set_self_id(user.id.clone()).await;
        self.inner.checkin.ensure_schedule().await?;

        let cancel = CancellationToken::new();
        let mut handles: Vec<JoinHandle<()>> = self
            .mutators()
            .into_iter()
            .map(|m| self.inner.sync.spawn(m, cancel.child_token()))
            .collect();
        handles.push(spawn_escalation_timer(
            self.inner.checkin.clone(),
            self.inner.contacts.pings(),
            Arc::clone(&self.inner.clock),
            cancel.child_token(),
        ));
        life.tasks = Some(RunningTasks { cancel, handles });
        life.phase = SessionPhase::Active;
        Ok(())
    }
}
