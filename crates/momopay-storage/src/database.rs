// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use momopay_core::MomopayError;
use tracing::debug;

use crate::migrations::run_migrations;

/// Convert a tokio-rusqlite error into the crate-wide storage error.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> MomopayError {
    MomopayError::Storage {
        source: Box::new(e),
    }
}

fn apply_pragmas(conn: &rusqlite::Connection, wal_mode: bool) -> Result<(), rusqlite::Error> {
    if wal_mode {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
    }
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    Ok(())
}

/// The single-writer SQLite handle.
///
/// Query modules take `&Database` and go through [`Database::connection`],
/// so every statement runs on the one tokio-rusqlite background thread.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Opens (creating if needed) the database at `path` with WAL enabled and
    /// runs pending migrations.
    pub async fn open(path: &str) -> Result<Self, MomopayError> {
        Self::open_with(path, true).await
    }

    /// Opens the database, choosing the journal mode.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, MomopayError> {
        if let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(MomopayError::storage)?;
        }

        // Migrations run once on a short-lived synchronous connection before the
        // writer thread starts.
        let migrate_path = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), MomopayError> {
            let mut conn =
                rusqlite::Connection::open(&migrate_path).map_err(MomopayError::storage)?;
            apply_pragmas(&conn, wal_mode).map_err(MomopayError::storage)?;
            run_migrations(&mut conn)
        })
        .await
        .map_err(|e| MomopayError::Internal(format!("migration task failed: {e}")))??;

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| MomopayError::Storage {
                source: Box::new(e),
            })?;
        conn.call(move |conn| -> Result<(), rusqlite::Error> { apply_pragmas(conn, wal_mode) })
            .await
            .map_err(map_tr_err)?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The shared writer connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Folds the WAL back into the main database file.
    pub async fn checkpoint(&self) -> Result<(), MomopayError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoints the WAL and closes the connection.
    pub async fn close(self) -> Result<(), MomopayError> {
        self.checkpoint().await?;
        self.conn.close().await.map_err(|e| MomopayError::Storage {
            source: Box::new(e),
        })
    }
}
