// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turn appends and the cache-first context reader.
//!
//! Owns both the message and conversation repositories: appending a turn
//! bumps the conversation's last-activity here, so no service depends on
//! another service.

use std::sync::Arc;

use charla_core::{CharlaError, ContextEntry, KeyValueStore, Message, MessageRole, TokenStats};
use charla_storage::{ConversationRepository, MessageRepository, NewMessage};
use tracing::debug;

use crate::cache_doc::{self, ContextDocument, CONTEXT_WINDOW};

/// Service over the append-only message log.
#[derive(Clone)]
pub struct MessageService {
    messages: MessageRepository,
    conversations: ConversationRepository,
    kv: Arc<dyn KeyValueStore>,
}

impl MessageService {
    pub fn new(
        messages: MessageRepository,
        conversations: ConversationRepository,
        kv: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            messages,
            conversations,
            kv,
        }
    }

    /// Appends a user turn, at most once per provider SID.
    ///
    /// An existing row with the same SID is returned unchanged; the
    /// lookup-then-insert race is closed by the store's uniqueness
    /// constraint with a re-read on violation.
    pub async fn save_user(
        &self,
        conversation_id: &str,
        content: &str,
        provider_sid: Option<&str>,
    ) -> Result<Message, CharlaError> {
        if let Some(sid) = provider_sid {
            if let Some(existing) = self.messages.find_by_provider_sid(sid).await? {
                debug!(conversation_id, "duplicate provider SID, returning existing turn");
                return Ok(existing);
            }
        }

        let message = self
            .messages
            .create(
                MessageRole::User,
                NewMessage {
                    conversation_id: conversation_id.to_string(),
                    content: content.to_string(),
                    provider_sid: provider_sid.map(String::from),
                    ..NewMessage::default()
                },
            )
            .await?;

        self.conversations.touch(conversation_id).await?;
        cache_doc::invalidate(self.kv.as_ref(), conversation_id).await;
        Ok(message)
    }

    /// Appends an assistant turn with its usage metrics.
    pub async fn save_assistant(
        &self,
        conversation_id: &str,
        content: &str,
        tokens_used: Option<i64>,
        latency_ms: Option<i64>,
    ) -> Result<Message, CharlaError> {
        let message = self
            .messages
            .create(
                MessageRole::Assistant,
                NewMessage {
                    conversation_id: conversation_id.to_string(),
                    content: content.to_string(),
                    tokens_used,
                    latency_ms,
                    ..NewMessage::default()
                },
            )
            .await?;

        self.conversations.touch(conversation_id).await?;
        cache_doc::invalidate(self.kv.as_ref(), conversation_id).await;
        Ok(message)
    }

    /// Appends a system turn.
    pub async fn save_system(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> Result<Message, CharlaError> {
        let message = self
            .messages
            .create(
                MessageRole::System,
                NewMessage {
                    conversation_id: conversation_id.to_string(),
                    content: content.to_string(),
                    ..NewMessage::default()
                },
            )
            .await?;

        self.conversations.touch(conversation_id).await?;
        cache_doc::invalidate(self.kv.as_ref(), conversation_id).await;
        Ok(message)
    }

    /// The context window as `(role, content)` pairs.
    ///
    /// Cache-first: a readable cache entry is used as-is — only role and
    /// content are consumed, so no full schema validation is needed here.
    /// Anything else falls back to the store.
    pub async fn recent_context(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ContextEntry>, CharlaError> {
        let key = cache_doc::cache_key(conversation_id);
        match self.kv.get(&key).await {
            Ok(Some(raw)) => {
                if let Ok(doc) = serde_json::from_str::<ContextDocument>(&raw) {
                    debug!(conversation_id, "recent context served from cache");
                    return Ok(doc.context_entries());
                }
            }
            Ok(None) => {}
            Err(e) => {
                debug!(conversation_id, error = %e, "cache unavailable for recent context");
            }
        }

        let window = self
            .messages
            .find_recent_by_conversation(conversation_id, CONTEXT_WINDOW)
            .await?;
        Ok(window
            .into_iter()
            .map(|m| ContextEntry {
                role: m.role,
                content: m.content,
            })
            .collect())
    }

    /// Number of turns in the conversation.
    pub async fn count(&self, conversation_id: &str) -> Result<i64, CharlaError> {
        self.messages.count_by_conversation(conversation_id).await
    }

    /// Token aggregate over metered turns.
    pub async fn token_stats(&self, conversation_id: &str) -> Result<TokenStats, CharlaError> {
        self.messages.token_stats(conversation_id).await
    }

    /// Whether a provider SID has already been persisted.
    pub async fn exists(&self, provider_sid: &str) -> Result<bool, CharlaError> {
        Ok(self
            .messages
            .find_by_provider_sid(provider_sid)
            .await?
            .is_some())
    }

    /// Trims the conversation to its `keep_n` most recent turns and
    /// invalidates the cache. Returns the number deleted.
    pub async fn cleanup_old(
        &self,
        conversation_id: &str,
        keep_n: i64,
    ) -> Result<i64, CharlaError> {
        let deleted = self
            .messages
            .delete_older_than(conversation_id, keep_n)
            .await?;
        cache_doc::invalidate(self.kv.as_ref(), conversation_id).await;
        Ok(deleted)
    }
}
