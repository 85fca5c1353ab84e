// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Offline mutation queue operations.
//!
//! Rows move `pending -> processing -> (deleted | pending | failed)`. Replay
//! order within a domain follows the autoincrement id.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use lifeline_core::LifelineError;
use lifeline_core::mutation::{MutationPayload, PendingMutation};
use lifeline_core::types::{Domain, MutationStatus};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params};

use crate::database::Database;

const SELECT_COLUMNS: &str =
    "SELECT id, domain, payload, status, attempts, enqueued_at FROM pending_mutations";

fn conversion_err<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn row_to_mutation(row: &Row<'_>) -> rusqlite::Result<PendingMutation> {
    let domain: String = row.get(1)?;
    let payload: String = row.get(2)?;
    let status: String = row.get(3)?;
    let enqueued_at: String = row.get(5)?;
    Ok(PendingMutation {
        id: row.get(0)?,
        domain: Domain::from_str(&domain).map_err(|e| conversion_err(1, e))?,
        payload: serde_json::from_str(&payload).map_err(|e| conversion_err(2, e))?,
        status: MutationStatus::from_str(&status).map_err(|e| conversion_err(3, e))?,
        attempt_count: row.get(4)?,
        enqueued_at: DateTime::parse_from_rfc3339(&enqueued_at)
            .map_err(|e| conversion_err(5, e))?
            .with_timezone(&Utc),
    })
}

/// Append a mutation to its domain's queue.
pub async fn enqueue(
    db: &Database,
    payload: &MutationPayload,
    enqueued_at: DateTime<Utc>,
    max_attempts: u32,
) -> Result<PendingMutation, LifelineError> {
    let domain = payload.domain();
    let body = serde_json::to_string(payload)?;
    let at = enqueued_at.to_rfc3339_opts(SecondsFormat::Millis, true);
    let payload = payload.clone();
    let id = db
        .connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO pending_mutations (domain, payload, max_attempts, enqueued_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![domain.to_string(), body, max_attempts, at],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    Ok(PendingMutation {
        id,
        domain,
        payload,
        enqueued_at,
        attempt_count: 0,
        status: MutationStatus::Pending,
    })
}

/// Take the oldest pending mutation of a domain and mark it processing.
pub async fn next_pending(
    db: &Database,
    domain: Domain,
) -> Result<Option<PendingMutation>, LifelineError> {
    db.connection()
        .call(move |conn| -> Result<Option<PendingMutation>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let entry = tx
                .query_row(
                    &format!(
                        "{SELECT_COLUMNS} WHERE domain = ?1 AND status = 'pending'
                         ORDER BY id ASC LIMIT 1"
                    ),
                    params![domain.to_string()],
                    row_to_mutation,
                )
                .optional()?;

            if let Some(entry) = &entry {
                tx.execute(
                    "UPDATE pending_mutations SET status = 'processing',
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?1",
                    params![entry.id],
                )?;
            }
            tx.commit()?;

            Ok(entry.map(|entry| PendingMutation {
                status: MutationStatus::Processing,
                ..entry
            }))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete a mutation once its replay has been resolved.
pub async fn ack(db: &Database, id: i64) -> Result<(), LifelineError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute("DELETE FROM pending_mutations WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Return a mutation to pending after a connectivity failure.
///
/// The attempt is counted for diagnostics but never exhausts the mutation.
pub async fn release(db: &Database, id: i64) -> Result<(), LifelineError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE pending_mutations SET status = 'pending', attempts = attempts + 1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a failed replay attempt.
///
/// Increments attempts. At `max_attempts` the row becomes `failed` and stays
/// for inspection; otherwise it goes back to `pending`.
pub async fn fail(db: &Database, id: i64) -> Result<MutationStatus, LifelineError> {
    db.connection()
        .call(move |conn| -> Result<MutationStatus, rusqlite::Error> {
            let (attempts, max_attempts): (u32, u32) = conn.query_row(
                "SELECT attempts, max_attempts FROM pending_mutations WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let new_attempts = attempts + 1;
            let status = if new_attempts >= max_attempts {
                MutationStatus::Failed
            } else {
                MutationStatus::Pending
            };
            conn.execute(
                "UPDATE pending_mutations SET status = ?1, attempts = ?2,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?3",
                params![status.to_string(), new_attempts, id],
            )?;
            Ok(status)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List mutations in replay order, optionally filtered by domain.
pub async fn list(
    db: &Database,
    domain: Option<Domain>,
) -> Result<Vec<PendingMutation>, LifelineError> {
    let domain = domain.map(|d| d.to_string());
    db.connection()
        .call(move |conn| -> Result<Vec<PendingMutation>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS} WHERE (?1 IS NULL OR domain = ?1) ORDER BY id ASC"
            ))?;
            let rows = stmt.query_map(params![domain], row_to_mutation)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Count mutations still awaiting replay (pending or processing).
pub async fn count_pending(db: &Database, domain: Option<Domain>) -> Result<usize, LifelineError> {
    let domain = domain.map(|d| d.to_string());
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.query_row(
                "SELECT COUNT(*) FROM pending_mutations
                 WHERE status IN ('pending', 'processing')
                 AND (?1 IS NULL OR domain = ?1)",
                params![domain],
                |row| row.get(0),
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}
