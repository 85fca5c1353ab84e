// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Lifeline safety coordinator.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Longest interval, lead time, grace period or ping expiry accepted
/// anywhere: ten years, in seconds.
pub const MAX_SPAN_SECS: u64 = 10 * 366 * 86_400;

/// Top-level Lifeline configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LifelineConfig {
    /// Process-level settings.
    #[serde(default)]
    pub app: AppConfig,

    /// Check-in schedule defaults and escalation timing.
    #[serde(default)]
    pub checkin: CheckInConfig,

    /// Ping lifecycle settings.
    #[serde(default)]
    pub pings: PingsConfig,

    /// Remote retry, offline replay and session teardown settings.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Local persistence settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Process-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Id of the signed-in user. `None` until the first sign-in.
    #[serde(default)]
    pub user_id: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            user_id: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Check-in schedule configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CheckInConfig {
    /// Interval between required check-ins, in seconds.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// How long before the deadline the reminder fires, in seconds.
    #[serde(default = "default_reminder_lead_secs")]
    pub reminder_lead_secs: u64,

    /// Time between Overdue and NonResponsive, in seconds.
    /// Defaults to `reminder_lead_secs` when unset.
    #[serde(default)]
    pub grace_period_secs: Option<u64>,
}

impl CheckInConfig {
    /// The effective grace period.
    pub fn grace_period_secs(&self) -> u64 {
        self.grace_period_secs.unwrap_or(self.reminder_lead_secs)
    }
}

impl Default for CheckInConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            reminder_lead_secs: default_reminder_lead_secs(),
            grace_period_secs: None,
        }
    }
}

fn default_interval_secs() -> u64 {
    24 * 60 * 60
}

fn default_reminder_lead_secs() -> u64 {
    2 * 60 * 60
}

/// Ping lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PingsConfig {
    /// Age after which an unanswered ping expires, in seconds.
    #[serde(default = "default_ping_expiry_secs")]
    pub expiry_secs: u64,
}

impl Default for PingsConfig {
    fn default() -> Self {
        Self {
            expiry_secs: default_ping_expiry_secs(),
        }
    }
}

fn default_ping_expiry_secs() -> u64 {
    24 * 60 * 60
}

/// Remote retry and offline replay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// First backoff delay for safety-critical remote calls, in milliseconds.
    #[serde(default = "default_retry_initial_backoff_ms")]
    pub retry_initial_backoff_ms: u64,

    /// Upper bound on a single backoff delay, in milliseconds.
    #[serde(default = "default_retry_max_backoff_ms")]
    pub retry_max_backoff_ms: u64,

    /// Attempts (including the first) before a call is handed to the offline queue.
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// Non-connectivity replay failures before a queued mutation is marked failed.
    #[serde(default = "default_replay_max_attempts")]
    pub replay_max_attempts: u32,

    /// Time in the background after which subscriptions and timers are torn down.
    #[serde(default = "default_background_teardown_secs")]
    pub background_teardown_secs: u64,

    /// Delay before re-opening a dropped sync subscription, in milliseconds.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_initial_backoff_ms: default_retry_initial_backoff_ms(),
            retry_max_backoff_ms: default_retry_max_backoff_ms(),
            retry_max_attempts: default_retry_max_attempts(),
            replay_max_attempts: default_replay_max_attempts(),
            background_teardown_secs: default_background_teardown_secs(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

fn default_retry_initial_backoff_ms() -> u64 {
    500
}

fn default_retry_max_backoff_ms() -> u64 {
    8_000
}

fn default_retry_max_attempts() -> u32 {
    4
}

fn default_replay_max_attempts() -> u32 {
    5
}

fn default_background_teardown_secs() -> u64 {
    300
}

fn default_reconnect_delay_ms() -> u64 {
    2_000
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("lifeline").join("lifeline.db"))
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "lifeline.db".to_string())
}

fn default_wal_mode() -> bool {
    true
}
