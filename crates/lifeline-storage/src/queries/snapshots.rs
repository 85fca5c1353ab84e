// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Snapshot persistence: one row per (domain, slot).

use lifeline_core::LifelineError;
use lifeline_core::types::{Domain, SnapshotRecord, SnapshotSlot};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;

/// Load the stored snapshot for a domain slot, if any.
pub async fn load_snapshot(
    db: &Database,
    domain: Domain,
    slot: SnapshotSlot,
) -> Result<Option<SnapshotRecord>, LifelineError> {
    db.connection()
        .call(move |conn| -> Result<Option<SnapshotRecord>, rusqlite::Error> {
            conn.query_row(
                "SELECT version, body, updated_at FROM snapshots
                 WHERE domain = ?1 AND slot = ?2",
                params![domain.to_string(), slot.to_string()],
                |row| {
                    let version: i64 = row.get(0)?;
                    Ok(SnapshotRecord {
                        domain,
                        slot,
                        version: version.max(0) as u64,
                        body: row.get(1)?,
                        updated_at: row.get(2)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert or overwrite the snapshot for the record's domain slot.
///
/// A write carrying an older version than the stored row is ignored, so a
/// late persist from a slow task never rolls the slot back.
pub async fn save_snapshot(db: &Database, record: &SnapshotRecord) -> Result<(), LifelineError> {
    let domain = record.domain.to_string();
    let slot = record.slot.to_string();
    let version = i64::try_from(record.version).map_err(|e| LifelineError::Storage {
        source: Box::new(e),
    })?;
    let body = record.body.clone();
    let updated_at = record.updated_at.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO snapshots (domain, slot, version, body, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(domain, slot) DO UPDATE SET
                    version = excluded.version,
                    body = excluded.body,
                    updated_at = excluded.updated_at
                 WHERE excluded.version >= snapshots.version",
                params![domain, slot, version, body, updated_at],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
