// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;

use lifeline_core::LifelineError;
use tracing::{debug, info};

use crate::migrations;

/// Handle to the Lifeline SQLite database.
///
/// Owns the single writer connection. Query modules take `&Database` and go
/// through [`Database::connection`].
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path` in WAL mode.
    pub async fn open(path: &str) -> Result<Self, LifelineError> {
        Self::open_with(path, true).await
    }

    /// Open the database, run migrations and recover interrupted replays.
    ///
    /// Mutations left `processing` by a crashed replay are returned to
    /// `pending` so the next replay picks them up again.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, LifelineError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| LifelineError::Storage {
                    source: Box::new(e),
                })?;
            }
        }

        let setup_path = path.to_string();
        let recovered = tokio::task::spawn_blocking(move || prepare(&setup_path, wal_mode))
            .await
            .map_err(|e| LifelineError::Internal(format!("database setup task failed: {e}")))??;
        if recovered > 0 {
            info!(recovered, "returned interrupted mutations to the queue");
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| storage_message(e.to_string()))?;
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch(
                "PRAGMA busy_timeout = 5000;
                 PRAGMA foreign_keys = ON;
                 PRAGMA synchronous = NORMAL;",
            )
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The single writer connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), LifelineError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            })
            .await
            .map_err(map_tr_err)?;
        self.conn
            .close()
            .await
            .map_err(|e| storage_message(e.to_string()))
    }
}

/// Synchronous setup on a short-lived connection: journal mode, schema,
/// crash recovery. Returns how many mutations were recovered.
fn prepare(path: &str, wal_mode: bool) -> Result<usize, LifelineError> {
    let mut conn = rusqlite::Connection::open(path).map_err(map_rusqlite_err)?;
    let journal = if wal_mode { "WAL" } else { "DELETE" };
    conn.pragma_update(None, "journal_mode", journal)
        .map_err(map_rusqlite_err)?;
    migrations::run_migrations(&mut conn)?;
    conn.execute(
        "UPDATE pending_mutations SET status = 'pending',
         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE status = 'processing'",
        [],
    )
    .map_err(map_rusqlite_err)
}

/// Convert a tokio-rusqlite error into a storage error.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> LifelineError {
    storage_message(e.to_string())
}

pub(crate) fn map_rusqlite_err(e: rusqlite::Error) -> LifelineError {
    LifelineError::Storage {
        source: Box::new(e),
    }
}

fn storage_message(message: String) -> LifelineError {
    LifelineError::Storage {
        source: message.into(),
    }
}
