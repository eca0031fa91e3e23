// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. The process holds exactly one [`Database`] handle; repositories
//! share it via cheap clones.

use charla_core::CharlaError;
use tracing::debug;

use crate::schema;

/// Shared handle to the SQLite database.
///
/// Cloning is cheap: all clones funnel into the same background connection.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Opens (creating if needed) the database at `path`, applies PRAGMAs,
    /// and brings the schema up to date.
    pub async fn open(path: &str) -> Result<Self, CharlaError> {
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(map_tr_err)?;

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )?;
            schema::apply_schema(conn)
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path, "database opened");
        Ok(Self { conn })
    }

    /// Returns the underlying async connection for query closures.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoints the WAL. Called on graceful shutdown.
    pub async fn close(&self) -> Result<(), CharlaError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Bridges tokio-rusqlite errors into the workspace error type.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error) -> CharlaError {
    CharlaError::Storage {
        source: Box::new(e),
    }
}

/// Current timestamp in the ISO 8601 form stored everywhere.
pub(crate) fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
