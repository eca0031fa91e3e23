// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only message inserts, idempotency probes, and window retrieval.

use std::str::FromStr;

use charla_core::{CharlaError, Message, MessageRole, TokenStats};
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::database::{map_tr_err, now_iso, Database};

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, role, content, provider_sid, metadata, tokens_used, latency_ms, created_at";

fn row_to_message(row: &Row<'_>) -> Result<Message, rusqlite::Error> {
    let role_str: String = row.get(2)?;
    let role = MessageRole::from_str(&role_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role,
        content: row.get(3)?,
        provider_sid: row.get(4)?,
        metadata: row.get(5)?,
        tokens_used: row.get(6)?,
        latency_ms: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Fields of a turn about to be appended.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub conversation_id: String,
    pub content: String,
    pub provider_sid: Option<String>,
    pub metadata: Option<String>,
    pub tokens_used: Option<i64>,
    pub latency_ms: Option<i64>,
}

/// Repository over the `messages` table.
#[derive(Clone)]
pub struct MessageRepository {
    db: Database,
}

impl MessageRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Appends a turn.
    ///
    /// When the insert trips the `provider_sid` uniqueness constraint the
    /// existing row is re-read and returned, which resolves the
    /// lookup-then-insert race between two deliveries of the same SID.
    pub async fn create(&self, role: MessageRole, new: NewMessage) -> Result<Message, CharlaError> {
        let role_str = role.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let id = Uuid::now_v7().to_string();
                let now = now_iso();
                let inserted = conn.execute(
                    "INSERT INTO messages
                         (id, conversation_id, role, content, provider_sid,
                          metadata, tokens_used, latency_ms, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        id,
                        new.conversation_id,
                        role_str,
                        new.content,
                        new.provider_sid,
                        new.metadata,
                        new.tokens_used,
                        new.latency_ms,
                        now,
                    ],
                );
                let lookup_id = match inserted {
                    Ok(_) => id,
                    Err(rusqlite::Error::SqliteFailure(failure, _))
                        if failure.code == rusqlite::ErrorCode::ConstraintViolation
                            && new.provider_sid.is_some() =>
                    {
                        // Another delivery won the race; hand back its row.
                        let sid = new.provider_sid.as_deref().unwrap_or_default();
                        match conn.query_row(
                            "SELECT id FROM messages WHERE provider_sid = ?1",
                            params![sid],
                            |row| row.get::<_, String>(0),
                        ) {
                            Ok(existing_id) => existing_id,
                            // Not a SID collision after all (e.g. FK failure).
                            Err(rusqlite::Error::QueryReturnedNoRows) => {
                                return Err(rusqlite::Error::SqliteFailure(failure, None))
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    Err(e) => return Err(e),
                };
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"
                ))?;
                stmt.query_row(params![lookup_id], row_to_message)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Idempotency probe by provider message id.
    pub async fn find_by_provider_sid(&self, sid: &str) -> Result<Option<Message>, CharlaError> {
        let sid = sid.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE provider_sid = ?1"
                ))?;
                match stmt.query_row(params![sid], row_to_message) {
                    Ok(message) => Ok(Some(message)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    /// Looks up a message by id.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Message>, CharlaError> {
        let id = id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"
                ))?;
                match stmt.query_row(params![id], row_to_message) {
                    Ok(message) => Ok(Some(message)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    /// All messages of a conversation in chronological order, optionally
    /// capped to the first `limit`.
    pub async fn find_by_conversation(
        &self,
        conversation_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, CharlaError> {
        let conversation_id = conversation_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut messages = Vec::new();
                match limit {
                    Some(lim) => {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT {MESSAGE_COLUMNS} FROM messages
                             WHERE conversation_id = ?1
                             ORDER BY created_at ASC, id ASC LIMIT ?2"
                        ))?;
                        let rows = stmt.query_map(params![conversation_id, lim], row_to_message)?;
                        for row in rows {
                            messages.push(row?);
                        }
                    }
                    None => {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT {MESSAGE_COLUMNS} FROM messages
                             WHERE conversation_id = ?1
                             ORDER BY created_at ASC, id ASC"
                        ))?;
                        let rows = stmt.query_map(params![conversation_id], row_to_message)?;
                        for row in rows {
                            messages.push(row?);
                        }
                    }
                }
                Ok(messages)
            })
            .await
            .map_err(map_tr_err)
    }

    /// The `n` most recent messages, returned oldest-first.
    pub async fn find_recent_by_conversation(
        &self,
        conversation_id: &str,
        n: i64,
    ) -> Result<Vec<Message>, CharlaError> {
        let conversation_id = conversation_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM (
                         SELECT {MESSAGE_COLUMNS} FROM messages
                         WHERE conversation_id = ?1
                         ORDER BY created_at DESC, id DESC LIMIT ?2
                     ) ORDER BY created_at ASC, id ASC"
                ))?;
                let mut messages = Vec::new();
                let rows = stmt.query_map(params![conversation_id, n], row_to_message)?;
                for row in rows {
                    messages.push(row?);
                }
                Ok(messages)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Replaces the free-form metadata blob, the only mutable field.
    pub async fn update_metadata(
        &self,
        id: &str,
        metadata: &str,
    ) -> Result<Message, CharlaError> {
        let id_owned = id.to_string();
        let metadata = metadata.to_string();
        let found = self
            .db
            .connection()
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE messages SET metadata = ?1 WHERE id = ?2",
                    params![metadata, id_owned],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"
                ))?;
                stmt.query_row(params![id_owned], row_to_message).map(Some)
            })
            .await
            .map_err(map_tr_err)?;
        found.ok_or_else(|| CharlaError::NotFound {
            entity: "message",
            id: id.to_string(),
        })
    }

    /// Aggregate over rows with a non-null token count.
    pub async fn token_stats(&self, conversation_id: &str) -> Result<TokenStats, CharlaError> {
        let conversation_id = conversation_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let (total, count): (i64, i64) = conn.query_row(
                    "SELECT COALESCE(SUM(tokens_used), 0), COUNT(tokens_used)
                     FROM messages
                     WHERE conversation_id = ?1 AND tokens_used IS NOT NULL",
                    params![conversation_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                let avg = if count > 0 {
                    total as f64 / count as f64
                } else {
                    0.0
                };
                Ok(TokenStats { total, count, avg })
            })
            .await
            .map_err(map_tr_err)
    }

    /// Deletes all but the `keep_n` most recent messages; returns the
    /// number deleted.
    pub async fn delete_older_than(
        &self,
        conversation_id: &str,
        keep_n: i64,
    ) -> Result<i64, CharlaError> {
        let conversation_id = conversation_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM messages
                     WHERE conversation_id = ?1 AND id NOT IN (
                         SELECT id FROM messages
                         WHERE conversation_id = ?1
                         ORDER BY created_at DESC, id DESC LIMIT ?2
                     )",
                    params![conversation_id, keep_n],
                )?;
                Ok(deleted as i64)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Number of messages in a conversation.
    pub async fn count_by_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<i64, CharlaError> {
        let conversation_id = conversation_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
                    params![conversation_id],
                    |row| row.get(0),
                )
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::ConversationRepository;
    use crate::users::UserRepository;
    use tempfile::tempdir;

    async fn setup() -> (MessageRepository, String, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let user = UserRepository::new(db.clone())
            .upsert("+1", None, None)
            .await
            .unwrap();
        let conversation = ConversationRepository::new(db.clone())
            .create(&user.id)
            .await
            .unwrap();
        (MessageRepository::new(db), conversation.id, dir)
    }

    fn user_turn(conversation_id: &str, content: &str) -> NewMessage {
        NewMessage {
            conversation_id: conversation_id.to_string(),
            content: content.to_string(),
            ..NewMessage::default()
        }
    }

    #[tokio::test]
    async fn create_and_read_back_in_order() {
        let (messages, conv, _dir) = setup().await;

        for i in 0..3 {
            messages
                .create(MessageRole::User, user_turn(&conv, &format!("msg {i}")))
                .await
                .unwrap();
        }

        let all = messages.find_by_conversation(&conv, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].content, "msg 0");
        assert_eq!(all[2].content, "msg 2");
    }

    #[tokio::test]
    async fn duplicate_sid_returns_first_row_unchanged() {
        let (messages, conv, _dir) = setup().await;
        let sid = "SMaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

        let first = messages
            .create(
                MessageRole::User,
                NewMessage {
                    provider_sid: Some(sid.to_string()),
                    ..user_turn(&conv, "hola")
                },
            )
            .await
            .unwrap();

        let second = messages
            .create(
                MessageRole::User,
                NewMessage {
                    provider_sid: Some(sid.to_string()),
                    ..user_turn(&conv, "different body is ignored")
                },
            )
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.content, "hola");
        assert_eq!(messages.count_by_conversation(&conv).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn fk_violation_is_not_masked_as_sid_duplicate() {
        let (messages, _conv, _dir) = setup().await;
        let err = messages
            .create(
                MessageRole::User,
                NewMessage {
                    provider_sid: Some("SMbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".to_string()),
                    ..user_turn("no-such-conversation", "x")
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CharlaError::Storage { .. }));
    }

    #[tokio::test]
    async fn find_by_provider_sid_probe() {
        let (messages, conv, _dir) = setup().await;
        let sid = "SMcccccccccccccccccccccccccccccccc";

        assert!(messages.find_by_provider_sid(sid).await.unwrap().is_none());

        messages
            .create(
                MessageRole::User,
                NewMessage {
                    provider_sid: Some(sid.to_string()),
                    ..user_turn(&conv, "hola")
                },
            )
            .await
            .unwrap();

        let found = messages.find_by_provider_sid(sid).await.unwrap().unwrap();
        assert_eq!(found.content, "hola");
    }

    #[tokio::test]
    async fn recent_returns_ascending_window() {
        let (messages, conv, _dir) = setup().await;

        for i in 0..15 {
            messages
                .create(MessageRole::User, user_turn(&conv, &format!("m{i}")))
                .await
                .unwrap();
        }

        // 15 present, ask for 10: the 10 most recent, oldest first.
        let recent = messages
            .find_recent_by_conversation(&conv, 10)
            .await
            .unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].content, "m5");
        assert_eq!(recent[9].content, "m14");

        // Exactly as many as asked for.
        let recent = messages
            .find_recent_by_conversation(&conv, 15)
            .await
            .unwrap();
        assert_eq!(recent.len(), 15);
        assert_eq!(recent[0].content, "m0");

        // Fewer than asked for: all of them.
        let recent = messages
            .find_recent_by_conversation(&conv, 100)
            .await
            .unwrap();
        assert_eq!(recent.len(), 15);
    }

    #[tokio::test]
    async fn token_stats_aggregates_metered_rows() {
        let (messages, conv, _dir) = setup().await;

        messages
            .create(MessageRole::User, user_turn(&conv, "hola"))
            .await
            .unwrap();
        messages
            .create(
                MessageRole::Assistant,
                NewMessage {
                    tokens_used: Some(120),
                    latency_ms: Some(900),
                    ..user_turn(&conv, "respuesta 1")
                },
            )
            .await
            .unwrap();

        let stats = messages.token_stats(&conv).await.unwrap();
        assert_eq!(stats.total, 120);
        assert_eq!(stats.count, 1);

        messages
            .create(
                MessageRole::Assistant,
                NewMessage {
                    tokens_used: Some(80),
                    ..user_turn(&conv, "respuesta 2")
                },
            )
            .await
            .unwrap();

        let stats = messages.token_stats(&conv).await.unwrap();
        assert_eq!(stats.total, 200);
        assert_eq!(stats.count, 2);
        assert!((stats.avg - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn token_stats_empty_conversation_is_zero() {
        let (messages, conv, _dir) = setup().await;
        let stats = messages.token_stats(&conv).await.unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.avg, 0.0);
    }

    #[tokio::test]
    async fn update_metadata_only_touches_metadata() {
        let (messages, conv, _dir) = setup().await;
        let created = messages
            .create(MessageRole::User, user_turn(&conv, "hola"))
            .await
            .unwrap();

        let updated = messages
            .update_metadata(&created.id, r#"{"flagged":true}"#)
            .await
            .unwrap();
        assert_eq!(updated.metadata.as_deref(), Some(r#"{"flagged":true}"#));
        assert_eq!(updated.content, "hola");
        assert_eq!(updated.created_at, created.created_at);

        let err = messages
            .update_metadata("missing", "{}")
            .await
            .unwrap_err();
        assert!(matches!(err, CharlaError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_older_than_keeps_newest_n() {
        let (messages, conv, _dir) = setup().await;

        for i in 0..12 {
            messages
                .create(MessageRole::User, user_turn(&conv, &format!("m{i}")))
                .await
                .unwrap();
        }

        let deleted = messages.delete_older_than(&conv, 10).await.unwrap();
        assert_eq!(deleted, 2);

        let remaining = messages.find_by_conversation(&conv, None).await.unwrap();
        assert_eq!(remaining.len(), 10);
        assert_eq!(remaining[0].content, "m2");

        // Nothing further to trim.
        assert_eq!(messages.delete_older_than(&conv, 10).await.unwrap(), 0);
    }
}
