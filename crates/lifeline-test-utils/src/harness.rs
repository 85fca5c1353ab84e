// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end session tests.
//!
//! `TestHarness` assembles a full [`Session`] over a temp SQLite database,
//! the [`MockBackend`] and the [`MockNotifier`], with retry delays shrunk to
//! milliseconds.

use std::sync::Arc;

use chrono::Duration;
use lifeline_config::model::{LifelineConfig, StorageConfig};
use lifeline_core::{Alert, Clock, Contact, LifelineError, Ping, StorageAdapter, User};
use lifeline_state::{Mutator, Session, SessionAdapters};
use lifeline_storage::SqliteStorage;

use crate::clock::{InstantClock, ManualClock, epoch};
use crate::fixtures;
use crate::mock_backend::MockBackend;
use crate::mock_notifier::MockNotifier;

/// Which clock the harness drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    /// Moves only through [`TestHarness::advance`].
    Manual,
    /// Follows tokio's clock; pair with `start_paused = true`.
    Tokio,
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    user: Option<User>,
    contacts: Vec<Contact>,
    pings: Vec<Ping>,
    alert: Alert,
    clock: ClockMode,
    config: LifelineConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = LifelineConfig::default();
        config.sync.retry_initial_backoff_ms = 1;
        config.sync.retry_max_backoff_ms = 4;
        config.sync.retry_max_attempts = 3;
        config.sync.replay_max_attempts = 3;
        config.sync.reconnect_delay_ms = 10;
        config.sync.background_teardown_secs = 60;
        Self {
            user: Some(fixtures::user()),
            contacts: Vec::new(),
            pings: Vec::new(),
            alert: Alert::default(),
            clock: ClockMode::Manual,
            config,
        }
    }

    /// Seed the server with this user instead of [`fixtures::user`].
    pub fn with_user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    /// Start with no user on the server.
    pub fn without_user(mut self) -> Self {
        self.user = None;
        self
    }

    pub fn with_contact(mut self, contact: Contact) -> Self {
        self.contacts.push(contact);
        self
    }

    pub fn with_ping(mut self, ping: Ping) -> Self {
        self.pings.push(ping);
        self
    }

    pub fn with_alert(mut self, alert: Alert) -> Self {
        self.alert = alert;
        self
    }

    pub fn with_clock(mut self, mode: ClockMode) -> Self {
        self.clock = mode;
        self
    }

    /// Adjust the configuration before the session is built.
    pub fn configure(mut self, f: impl FnOnce(&mut LifelineConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Build the harness. The session is created but not started.
    pub async fn build(self) -> Result<TestHarness, LifelineError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| LifelineError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");

        let mut config = self.config;
        config.storage = StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        };
        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await?;
        let storage: Arc<dyn StorageAdapter + Send + Sync> = Arc::new(storage);

        let manual_clock = match self.clock {
            ClockMode::Manual => Some(Arc::new(ManualClock::new(epoch()))),
            ClockMode::Tokio => None,
        };
        let clock: Arc<dyn Clock> = match &manual_clock {
            Some(manual) => Arc::clone(manual) as Arc<dyn Clock>,
            None => Arc::new(InstantClock::new(epoch())),
        };

        let backend = Arc::new(MockBackend::new(Arc::clone(&clock)));
        if let Some(user) = self.user {
            backend.set_user(user).await;
        }
        for contact in self.contacts {
            backend.add_contact(contact).await;
        }
        for ping in self.pings {
            backend.add_ping(ping).await;
        }
        backend.set_alert(self.alert).await;

        let notifier = Arc::new(MockNotifier::new());
        let session = build_session(&config, &backend, &notifier, &storage, &clock);
        Ok(TestHarness {
            session,
            backend,
            notifier,
            storage,
            clock,
            manual_clock,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with mock adapters and temp storage.
pub struct TestHarness {
    session: Session,
    /// The mock server.
    pub backend: Arc<MockBackend>,
    /// Captures every notification.
    pub notifier: Arc<MockNotifier>,
    /// SQLite storage adapter (temp DB, cleaned up on drop).
    pub storage: Arc<dyn StorageAdapter + Send + Sync>,
    pub clock: Arc<dyn Clock>,
    manual_clock: Option<Arc<ManualClock>>,
    pub config: LifelineConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Build and start a harness with the default fixtures.
    pub async fn started() -> Result<Self, LifelineError> {
        let harness = Self::builder().build().await?;
        harness.session().start().await?;
        Ok(harness)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Fetch every domain into the session without spawning its background
    /// tasks, so tests drive ticks and replays by hand.
    pub async fn load(&self) -> Result<(), LifelineError> {
        let session = &self.session;
        session.contacts().refresh().await?;
        session.checkin().refresh().await?;
        session.alerts().refresh().await?;
        if let Some(user) = session.checkin().user() {
            session.contacts().set_self_id(user.id).await;
        }
        Ok(())
    }

    /// Build and load a harness; see [`TestHarness::load`].
    pub async fn loaded(builder: TestHarnessBuilder) -> Result<Self, LifelineError> {
        let harness = builder.build().await?;
        harness.load().await?;
        Ok(harness)
    }

    /// Move the clock forward.
    ///
    /// With [`ClockMode::Tokio`] this advances tokio's paused clock, which
    /// also fires any timers due in between.
    pub async fn advance(&self, by: Duration) {
        match &self.manual_clock {
            Some(manual) => manual.advance(by),
            None => tokio::time::advance(by.to_std().unwrap_or_default()).await,
        }
    }

    /// Sign out and start a brand-new session over the same database, as
    /// after a process restart.
    pub async fn restart(&mut self) -> Result<(), LifelineError> {
        self.session.sign_out().await;
        let session = self.new_session();
        session.start().await?;
        self.session = session;
        Ok(())
    }

    /// A session over this harness's adapters, not started.
    pub fn new_session(&self) -> Session {
        build_session(
            &self.config,
            &self.backend,
            &self.notifier,
            &self.storage,
            &self.clock,
        )
    }

    /// Yield until spawned tasks have had a chance to run.
    pub async fn settle(&self) {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }
}

fn build_session(
    config: &LifelineConfig,
    backend: &Arc<MockBackend>,
    notifier: &Arc<MockNotifier>,
    storage: &Arc<dyn StorageAdapter + Send + Sync>,
    clock: &Arc<dyn Clock>,
) -> Session {
    Session::new(
        config,
        SessionAdapters {
            remote: backend.clone(),
            sync: backend.clone(),
            storage: Arc::clone(storage),
            notifier: notifier.clone(),
            clock: Arc::clone(clock),
        },
    )
}
