// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation lookups, creation, and ownership-checked state transitions.

use std::str::FromStr;

use charla_core::{CharlaError, Conversation, ConversationStatus};
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::database::{map_tr_err, now_iso, Database};

const CONVERSATION_COLUMNS: &str =
    "id, user_id, status, context_summary, last_message_at, created_at, updated_at";

fn row_to_conversation(row: &Row<'_>) -> Result<Conversation, rusqlite::Error> {
    let status_str: String = row.get(2)?;
    let status = ConversationStatus::from_str(&status_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Conversation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        status,
        context_summary: row.get(3)?,
        last_message_at: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Outcome of an ownership-checked mutation, resolved to a domain error
/// outside the query closure.
enum MutationOutcome {
    Missing,
    Denied,
    NotActive,
    Done(Conversation),
}

/// Repository over the `conversations` table.
#[derive(Clone)]
pub struct ConversationRepository {
    db: Database,
}

impl ConversationRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// The user's current conversation: the ACTIVE one with the greatest
    /// last-activity, or `None`.
    pub async fn find_active_by_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Conversation>, CharlaError> {
        let user_id = user_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE user_id = ?1 AND status = 'ACTIVE'
                     ORDER BY last_message_at DESC, id DESC LIMIT 1"
                ))?;
                match stmt.query_row(params![user_id], row_to_conversation) {
                    Ok(conversation) => Ok(Some(conversation)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    /// Looks up a conversation by id.
    ///
    /// When `as_user` is supplied, an ownership mismatch returns `None`,
    /// deliberately indistinguishable from not-found on the read path.
    pub async fn find_by_id(
        &self,
        id: &str,
        as_user: Option<&str>,
    ) -> Result<Option<Conversation>, CharlaError> {
        let id = id.to_string();
        let as_user = as_user.map(String::from);
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"
                ))?;
                let found = match stmt.query_row(params![id], row_to_conversation) {
                    Ok(conversation) => Some(conversation),
                    Err(rusqlite::Error::QueryReturnedNoRows) => None,
                    Err(e) => return Err(e),
                };
                Ok(found.filter(|c| {
                    as_user
                        .as_deref()
                        .map(|caller| caller == c.user_id)
                        .unwrap_or(true)
                }))
            })
            .await
            .map_err(map_tr_err)
    }

    /// Creates a fresh ACTIVE conversation for `user_id`.
    pub async fn create(&self, user_id: &str) -> Result<Conversation, CharlaError> {
        let user_id = user_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let now = now_iso();
                let id = Uuid::now_v7().to_string();
                conn.execute(
                    "INSERT INTO conversations
                         (id, user_id, status, last_message_at, created_at, updated_at)
                     VALUES (?1, ?2, 'ACTIVE', ?3, ?3, ?3)",
                    params![id, user_id, now],
                )?;
                let mut stmt = conn.prepare(&format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"
                ))?;
                stmt.query_row(params![id], row_to_conversation)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Bumps last-activity to now.
    pub async fn touch(&self, id: &str) -> Result<Conversation, CharlaError> {
        let id_owned = id.to_string();
        let found = self
            .db
            .connection()
            .call(move |conn| {
                let now = now_iso();
                let changed = conn.execute(
                    "UPDATE conversations SET last_message_at = ?1, updated_at = ?1
                     WHERE id = ?2",
                    params![now, id_owned],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                let mut stmt = conn.prepare(&format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"
                ))?;
                stmt.query_row(params![id_owned], row_to_conversation).map(Some)
            })
            .await
            .map_err(map_tr_err)?;
        found.ok_or_else(|| CharlaError::NotFound {
            entity: "conversation",
            id: id.to_string(),
        })
    }

    /// Ownership-checked summary update.
    pub async fn set_summary(
        &self,
        id: &str,
        summary: &str,
        as_user: &str,
    ) -> Result<Conversation, CharlaError> {
        let id_owned = id.to_string();
        let summary = summary.to_string();
        let as_user = as_user.to_string();
        let outcome = self
            .db
            .connection()
            .call(move |conn| {
                let owner: Option<String> = match conn.query_row(
                    "SELECT user_id FROM conversations WHERE id = ?1",
                    params![id_owned],
                    |row| row.get(0),
                ) {
                    Ok(owner) => Some(owner),
                    Err(rusqlite::Error::QueryReturnedNoRows) => None,
                    Err(e) => return Err(e),
                };
                let Some(owner) = owner else {
                    return Ok(MutationOutcome::Missing);
                };
                if owner != as_user {
                    return Ok(MutationOutcome::Denied);
                }
                let now = now_iso();
                conn.execute(
                    "UPDATE conversations SET context_summary = ?1, updated_at = ?2
                     WHERE id = ?3",
                    params![summary, now, id_owned],
                )?;
                let mut stmt = conn.prepare(&format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"
                ))?;
                stmt.query_row(params![id_owned], row_to_conversation)
                    .map(MutationOutcome::Done)
            })
            .await
            .map_err(map_tr_err)?;
        self.resolve(outcome, id)
    }

    /// Ownership-checked ACTIVE → CLOSED transition.
    pub async fn close(&self, id: &str, as_user: &str) -> Result<Conversation, CharlaError> {
        self.transition(id, as_user, ConversationStatus::Closed).await
    }

    /// Ownership-checked ACTIVE → ARCHIVED transition.
    pub async fn archive(&self, id: &str, as_user: &str) -> Result<Conversation, CharlaError> {
        self.transition(id, as_user, ConversationStatus::Archived).await
    }

    async fn transition(
        &self,
        id: &str,
        as_user: &str,
        target: ConversationStatus,
    ) -> Result<Conversation, CharlaError> {
        let id_owned = id.to_string();
        let as_user = as_user.to_string();
        let target_str = target.to_string();
        let outcome = self
            .db
            .connection()
            .call(move |conn| {
                let row: Option<(String, String)> = match conn.query_row(
                    "SELECT user_id, status FROM conversations WHERE id = ?1",
                    params![id_owned],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                ) {
                    Ok(row) => Some(row),
                    Err(rusqlite::Error::QueryReturnedNoRows) => None,
                    Err(e) => return Err(e),
                };
                let Some((owner, status)) = row else {
                    return Ok(MutationOutcome::Missing);
                };
                if owner != as_user {
                    return Ok(MutationOutcome::Denied);
                }
                if status != "ACTIVE" {
                    return Ok(MutationOutcome::NotActive);
                }
                let now = now_iso();
                conn.execute(
                    "UPDATE conversations SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    params![target_str, now, id_owned],
                )?;
                let mut stmt = conn.prepare(&format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"
                ))?;
                stmt.query_row(params![id_owned], row_to_conversation)
                    .map(MutationOutcome::Done)
            })
            .await
            .map_err(map_tr_err)?;
        self.resolve(outcome, id)
    }

    fn resolve(&self, outcome: MutationOutcome, id: &str) -> Result<Conversation, CharlaError> {
        match outcome {
            MutationOutcome::Missing => Err(CharlaError::NotFound {
                entity: "conversation",
                id: id.to_string(),
            }),
            MutationOutcome::Denied => Err(CharlaError::AccessDenied {
                entity: "conversation",
                id: id.to_string(),
            }),
            MutationOutcome::NotActive => Err(CharlaError::ValidationFailed(format!(
                "conversation {id} is not active"
            ))),
            MutationOutcome::Done(conversation) => Ok(conversation),
        }
    }

    /// All conversations for a user, optionally filtered by state, newest
    /// activity first.
    pub async fn find_by_user(
        &self,
        user_id: &str,
        state: Option<ConversationStatus>,
    ) -> Result<Vec<Conversation>, CharlaError> {
        let user_id = user_id.to_string();
        let state = state.map(|s| s.to_string());
        self.db
            .connection()
            .call(move |conn| {
                let mut conversations = Vec::new();
                match &state {
                    Some(state_filter) => {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT {CONVERSATION_COLUMNS} FROM conversations
                             WHERE user_id = ?1 AND status = ?2
                             ORDER BY last_message_at DESC, id DESC"
                        ))?;
                        let rows =
                            stmt.query_map(params![user_id, state_filter], row_to_conversation)?;
                        for row in rows {
                            conversations.push(row?);
                        }
                    }
                    None => {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT {CONVERSATION_COLUMNS} FROM conversations
                             WHERE user_id = ?1
                             ORDER BY last_message_at DESC, id DESC"
                        ))?;
                        let rows = stmt.query_map(params![user_id], row_to_conversation)?;
                        for row in rows {
                            conversations.push(row?);
                        }
                    }
                }
                Ok(conversations)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Number of conversations in a given state.
    pub async fn count_by_state(&self, state: ConversationStatus) -> Result<i64, CharlaError> {
        let state = state.to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM conversations WHERE status = ?1",
                    params![state],
                    |row| row.get(0),
                )
            })
            .await
            .map_err(map_tr_err)
    }

    /// Total number of conversations.
    pub async fn count(&self) -> Result<i64, CharlaError> {
        self.db
            .connection()
            .call(|conn| {
                conn.query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::UserRepository;
    use tempfile::tempdir;

    async fn setup() -> (ConversationRepository, UserRepository, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (
            ConversationRepository::new(db.clone()),
            UserRepository::new(db),
            dir,
        )
    }

    #[tokio::test]
    async fn create_starts_active() {
        let (conversations, users, _dir) = setup().await;
        let user = users.upsert("+1", None, None).await.unwrap();

        let conversation = conversations.create(&user.id).await.unwrap();
        assert_eq!(conversation.status, ConversationStatus::Active);
        assert_eq!(conversation.user_id, user.id);
        assert!(conversation.context_summary.is_none());
    }

    #[tokio::test]
    async fn find_active_returns_most_recent_activity() {
        let (conversations, users, _dir) = setup().await;
        let user = users.upsert("+1", None, None).await.unwrap();

        let older = conversations.create(&user.id).await.unwrap();
        let newer = conversations.create(&user.id).await.unwrap();
        // Bump the older conversation so it becomes current.
        conversations.touch(&older.id).await.unwrap();

        let current = conversations
            .find_active_by_user(&user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.id, older.id);

        conversations.touch(&newer.id).await.unwrap();
        let current = conversations
            .find_active_by_user(&user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.id, newer.id);
    }

    #[tokio::test]
    async fn find_active_ignores_closed() {
        let (conversations, users, _dir) = setup().await;
        let user = users.upsert("+1", None, None).await.unwrap();

        let conversation = conversations.create(&user.id).await.unwrap();
        conversations.close(&conversation.id, &user.id).await.unwrap();

        assert!(conversations
            .find_active_by_user(&user.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn find_by_id_with_wrong_user_is_indistinguishable_from_missing() {
        let (conversations, users, _dir) = setup().await;
        let alice = users.upsert("+1", None, None).await.unwrap();
        let bob = users.upsert("+2", None, None).await.unwrap();
        let conversation = conversations.create(&alice.id).await.unwrap();

        let as_owner = conversations
            .find_by_id(&conversation.id, Some(&alice.id))
            .await
            .unwrap();
        assert!(as_owner.is_some());

        let as_stranger = conversations
            .find_by_id(&conversation.id, Some(&bob.id))
            .await
            .unwrap();
        assert!(as_stranger.is_none());

        let missing = conversations
            .find_by_id("no-such-conversation", Some(&alice.id))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn close_rejects_non_owner_without_side_effects() {
        let (conversations, users, _dir) = setup().await;
        let alice = users.upsert("+1", None, None).await.unwrap();
        let bob = users.upsert("+2", None, None).await.unwrap();
        let conversation = conversations.create(&alice.id).await.unwrap();

        let err = conversations
            .close(&conversation.id, &bob.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CharlaError::AccessDenied { .. }));

        let unchanged = conversations
            .find_by_id(&conversation.id, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unchanged.status, ConversationStatus::Active);
    }

    #[tokio::test]
    async fn transitions_only_leave_active() {
        let (conversations, users, _dir) = setup().await;
        let user = users.upsert("+1", None, None).await.unwrap();
        let conversation = conversations.create(&user.id).await.unwrap();

        conversations.close(&conversation.id, &user.id).await.unwrap();

        // CLOSED -> ARCHIVED is not a transition the gateway performs.
        let err = conversations
            .archive(&conversation.id, &user.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CharlaError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn set_summary_checks_ownership() {
        let (conversations, users, _dir) = setup().await;
        let alice = users.upsert("+1", None, None).await.unwrap();
        let bob = users.upsert("+2", None, None).await.unwrap();
        let conversation = conversations.create(&alice.id).await.unwrap();

        let updated = conversations
            .set_summary(&conversation.id, "habla de cocina", &alice.id)
            .await
            .unwrap();
        assert_eq!(updated.context_summary.as_deref(), Some("habla de cocina"));

        let err = conversations
            .set_summary(&conversation.id, "intruso", &bob.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CharlaError::AccessDenied { .. }));

        let err = conversations
            .set_summary("missing", "x", &alice.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CharlaError::NotFound { .. }));
    }

    #[tokio::test]
    async fn touch_missing_conversation_is_not_found() {
        let (conversations, _users, _dir) = setup().await;
        let err = conversations.touch("missing").await.unwrap_err();
        assert!(matches!(err, CharlaError::NotFound { .. }));
    }

    #[tokio::test]
    async fn find_by_user_filters_and_orders() {
        let (conversations, users, _dir) = setup().await;
        let user = users.upsert("+1", None, None).await.unwrap();

        let first = conversations.create(&user.id).await.unwrap();
        let second = conversations.create(&user.id).await.unwrap();
        conversations.close(&first.id, &user.id).await.unwrap();

        let all = conversations.find_by_user(&user.id, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let active = conversations
            .find_by_user(&user.id, Some(ConversationStatus::Active))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);

        assert_eq!(
            conversations
                .count_by_state(ConversationStatus::Closed)
                .await
                .unwrap(),
            1
        );
        assert_eq!(conversations.count().await.unwrap(), 2);
    }
}
