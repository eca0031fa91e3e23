// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User lookups and the phone-keyed upsert.

use charla_core::{CharlaError, User};
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::database::{map_tr_err, now_iso, Database};

/// Repository over the `users` table.
#[derive(Clone)]
pub struct UserRepository {
    db: Database,
}

fn row_to_user(row: &Row<'_>) -> Result<User, rusqlite::Error> {
    Ok(User {
        id: row.get(0)?,
        phone_number: row.get(1)?,
        display_name: row.get(2)?,
        language: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

const USER_COLUMNS: &str = "id, phone_number, display_name, language, created_at, updated_at";

impl UserRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Looks up a user by canonical phone.
    pub async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, CharlaError> {
        let phone = phone.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE phone_number = ?1"
                ))?;
                match stmt.query_row(params![phone], row_to_user) {
                    Ok(user) => Ok(Some(user)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    /// Looks up a user by id.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>, CharlaError> {
        let id = id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?;
                match stmt.query_row(params![id], row_to_user) {
                    Ok(user) => Ok(Some(user)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    /// Atomic create-or-update keyed on the phone number.
    ///
    /// On create the language defaults to `es`; on update only the supplied
    /// fields change. Runs as a single statement so two concurrent first
    /// messages from the same phone yield exactly one row.
    pub async fn upsert(
        &self,
        phone: &str,
        display_name: Option<&str>,
        language: Option<&str>,
    ) -> Result<User, CharlaError> {
        let phone = phone.to_string();
        let display_name = display_name.map(String::from);
        let language = language.map(String::from);
        self.db
            .connection()
            .call(move |conn| {
                let now = now_iso();
                conn.execute(
                    "INSERT INTO users (id, phone_number, display_name, language, created_at, updated_at)
                     VALUES (?1, ?2, ?3, COALESCE(?4, 'es'), ?5, ?5)
                     ON CONFLICT(phone_number) DO UPDATE SET
                         display_name = COALESCE(excluded.display_name, users.display_name),
                         language = CASE WHEN ?4 IS NULL THEN users.language
                                         ELSE excluded.language END,
                         updated_at = excluded.updated_at",
                    params![
                        Uuid::now_v7().to_string(),
                        phone,
                        display_name,
                        language,
                        now,
                    ],
                )?;
                let mut stmt = conn.prepare(&format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE phone_number = ?1"
                ))?;
                stmt.query_row(params![phone], row_to_user)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Total number of users.
    pub async fn count(&self) -> Result<i64, CharlaError> {
        self.db
            .connection()
            .call(|conn| conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0)))
            .await
            .map_err(map_tr_err)
    }
}
