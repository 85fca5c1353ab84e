// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks the relationships serde cannot express: the reminder must fire
//! before the deadline, backoff bounds must be ordered, and so on.

use crate::diagnostic::ConfigError;
use crate::model::{LifelineConfig, MAX_SPAN_SECS};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure rather than stopping at the first.
pub fn validate_config(config: &LifelineConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |key: &str, message: String| errors.push(ConfigError::invalid(key, message));

    if !LOG_LEVELS.contains(&config.app.log_level.as_str()) {
        fail(
            "app.log_level",
            format!("`{}` is not one of {}", config.app.log_level, LOG_LEVELS.join(", ")),
        );
    }

    if let Some(user_id) = &config.app.user_id {
        if user_id.trim().is_empty() {
            fail("app.user_id", "must not be empty when set".to_string());
        }
    }

    let checkin = &config.checkin;
    if checkin.interval_secs == 0 {
        fail("checkin.interval_secs", "must be positive".to_string());
    }
    if checkin.reminder_lead_secs == 0 {
        fail("checkin.reminder_lead_secs", "must be positive".to_string());
    } else if checkin.reminder_lead_secs >= checkin.interval_secs {
        fail(
            "checkin.reminder_lead_secs",
            format!(
                "{} must be less than checkin.interval_secs ({}) or the reminder fires before the check-in",
                checkin.reminder_lead_secs, checkin.interval_secs
            ),
        );
    }
    if checkin.grace_period_secs == Some(0) {
        fail("checkin.grace_period_secs", "must be positive when set".to_string());
    }

    if config.pings.expiry_secs == 0 {
        fail("pings.expiry_secs", "must be positive".to_string());
    }

    let spans = [
        ("checkin.interval_secs", checkin.interval_secs),
        ("checkin.reminder_lead_secs", checkin.reminder_lead_secs),
        ("checkin.grace_period_secs", checkin.grace_period_secs()),
        ("pings.expiry_secs", config.pings.expiry_secs),
    ];
    for (key, secs) in spans {
        if secs > MAX_SPAN_SECS {
            fail(key, format!("{secs} exceeds the {MAX_SPAN_SECS}s (ten year) limit"));
        }
    }

    let sync = &config.sync;
    if sync.retry_max_attempts < 1 {
        fail("sync.retry_max_attempts", "must be at least 1".to_string());
    }
    if sync.replay_max_attempts < 1 {
        fail("sync.replay_max_attempts", "must be at least 1".to_string());
    }
    if sync.retry_initial_backoff_ms > sync.retry_max_backoff_ms {
        fail(
            "sync.retry_initial_backoff_ms",
            format!(
                "{} must not exceed sync.retry_max_backoff_ms ({})",
                sync.retry_initial_backoff_ms, sync.retry_max_backoff_ms
            ),
        );
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path", "must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
