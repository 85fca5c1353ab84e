// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `lifeline status` command implementation.
//!
//! Reads the last published snapshot of every domain from the local
//! database. Nothing is fetched from the server, so this works offline and
//! shows exactly what the device would restore on its next start.

use std::io::IsTerminal;

use chrono::{DateTime, Duration, Utc};
use lifeline_config::LifelineConfig;
use lifeline_core::types::SnapshotSlot;
use lifeline_core::{
    Alert, CheckInStatus, Clock, Contact, Domain, LifelineError, Ping, StorageAdapter,
    SystemClock,
};
use lifeline_state::{ContactsState, UserState, status_at};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

/// The signed-in user's schedule as persisted, plus where the clock puts it now.
#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub name: String,
    /// Status in the last published snapshot.
    pub status: CheckInStatus,
    /// Status the escalation timer will move to on its next tick.
    pub due_status: CheckInStatus,
    pub last_check_in_at: DateTime<Utc>,
    pub next_deadline_at: DateTime<Utc>,
    pub next_transition_at: Option<DateTime<Utc>>,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub user: Option<UserSummary>,
    pub contacts: Vec<Contact>,
    pub pending_pings: Vec<Ping>,
    pub alert: Alert,
    /// Mutations still waiting for replay.
    pub pending_sync: usize,
}

async fn load_current<T: DeserializeOwned>(
    storage: &dyn StorageAdapter,
    domain: Domain,
) -> Result<Option<T>, LifelineError> {
    let Some(record) = storage.load_snapshot(domain, SnapshotSlot::Current).await? else {
        return Ok(None);
    };
    match serde_json::from_str(&record.body) {
        Ok(state) => Ok(Some(state)),
        Err(e) => {
            warn!(%domain, version = record.version, error = %e, "unreadable snapshot");
            Ok(None)
        }
    }
}

/// Assemble the report from persisted snapshots.
pub async fn collect_status(
    storage: &dyn StorageAdapter,
    now: DateTime<Utc>,
) -> Result<StatusReport, LifelineError> {
    let user_state: Option<UserState> = load_current(storage, Domain::CheckIn).await?;
    let contacts: ContactsState = load_current(storage, Domain::Contacts)
        .await?
        .unwrap_or_default();
    let alert: Alert = load_current(storage, Domain::Alert).await?.unwrap_or_default();
    let pending_sync = storage.count_pending_mutations(None).await?;

    let user = user_state.and_then(|state| {
        let next_transition_at = state.next_transition_at();
        state.user.map(|user| UserSummary {
            due_status: status_at(&user, state.grace_period, now).max(user.status),
            name: user.name,
            status: user.status,
            last_check_in_at: user.last_check_in_at,
            next_deadline_at: user.next_deadline_at,
            next_transition_at,
        })
    });

    Ok(StatusReport {
        user,
        contacts: contacts.contacts,
        pending_pings: contacts.pending_pings,
        alert,
        pending_sync,
    })
}

/// Run the `lifeline status` command.
pub async fn run_status(
    config: &LifelineConfig,
    json: bool,
    plain: bool,
) -> Result<(), LifelineError> {
    let storage = crate::open_storage(config).await?;
    let report = collect_status(&storage, SystemClock.now()).await;
    storage.close().await?;
    let report = report?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print_report(&report, SystemClock.now(), use_color);
    }
    Ok(())
}

/// "in 3h 20m" before `at`, "2d 1h ago" after it.
fn format_relative(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = at - now;
    if delta >= Duration::zero() {
        format!("in {}", format_span(delta))
    } else {
        format!("{} ago", format_span(-delta))
    }
}

fn format_span(span: Duration) -> String {
    let days = span.num_days();
    let hours = span.num_hours() % 24;
    let minutes = span.num_minutes() % 60;

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

fn paint_status(status: CheckInStatus, use_color: bool) -> String {
    if !use_color {
        return status.to_string();
    }
    use colored::Colorize;
    match status {
        CheckInStatus::Active => status.to_string().green().to_string(),
        CheckInStatus::Warning => status.to_string().yellow().to_string(),
        CheckInStatus::Overdue | CheckInStatus::NonResponsive => {
            status.to_string().red().bold().to_string()
        }
    }
}

fn print_report(report: &StatusReport, now: DateTime<Utc>, use_color: bool) {
    println!();
    println!("  lifeline status");
    println!("  {}", "-".repeat(40));

    match &report.user {
        Some(user) => {
            println!("    User:      {} ({})", user.name, paint_status(user.status, use_color));
            if user.due_status != user.status {
                println!("    Due:       {}", paint_status(user.due_status, use_color));
            }
            println!(
                "    Checked:   {} ({})",
                user.last_check_in_at.format("%Y-%m-%d %H:%M UTC"),
                format_relative(user.last_check_in_at, now)
            );
            println!(
                "    Deadline:  {} ({})",
                user.next_deadline_at.format("%Y-%m-%d %H:%M UTC"),
                format_relative(user.next_deadline_at, now)
            );
        }
        None => println!("    User:      not signed in"),
    }

    let responders = report.contacts.iter().filter(|c| c.is_responder_of_self).count();
    let dependents = report.contacts.iter().filter(|c| c.is_dependent_of_self).count();
    println!(
        "    Contacts:  {} ({responders} responders, {dependents} dependents)",
        report.contacts.len()
    );
    println!("    Pings:     {} pending", report.pending_pings.len());

    let alert = match (report.alert.is_active, report.alert.activated_at) {
        (true, Some(at)) => format!("ACTIVE since {}", at.format("%Y-%m-%d %H:%M UTC")),
        (true, None) => "ACTIVE".to_string(),
        (false, _) => "inactive".to_string(),
    };
    if use_color && report.alert.is_active {
        use colored::Colorize;
        println!("    Alert:     {}", alert.red().bold());
    } else {
        println!("    Alert:     {alert}");
    }

    match (report.pending_sync, use_color) {
        (0, true) => {
            use colored::Colorize;
            println!("    Sync:      {} up to date", "✓".green());
        }
        (0, false) => println!("    Sync:      [OK] up to date"),
        (n, true) => {
            use colored::Colorize;
            println!("    Sync:      {} {n} pending", "!".yellow());
        }
        (n, false) => println!("    Sync:      [PENDING] {n} pending"),
    }
    println!();
}
