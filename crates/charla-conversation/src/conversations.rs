// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation orchestration: user upsert, current-conversation
//! resolution, and the cache-validated context reader.

use std::sync::Arc;

use charla_core::{CharlaError, ContextEntry, Conversation, KeyValueStore, User};
use charla_storage::{ConversationRepository, MessageRepository, UserRepository};
use tracing::{debug, info};

use crate::cache_doc::{self, ContextDocument, CONTEXT_WINDOW};

/// Service over users and conversations. Owns the context cache: every
/// mutation that goes through here invalidates the conversation's entry.
#[derive(Clone)]
pub struct ConversationService {
    users: UserRepository,
    conversations: ConversationRepository,
    messages: MessageRepository,
    kv: Arc<dyn KeyValueStore>,
}

impl ConversationService {
    pub fn new(
        users: UserRepository,
        conversations: ConversationRepository,
        messages: MessageRepository,
        kv: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            users,
            conversations,
            messages,
            kv,
        }
    }

    /// Upserts the user behind `phone` and returns their current
    /// conversation, creating a fresh one when no active conversation
    /// exists.
    pub async fn get_or_create(
        &self,
        phone: &str,
        profile_name: Option<&str>,
    ) -> Result<(Conversation, User), CharlaError> {
        let user = self.users.upsert(phone, profile_name, None).await?;

        let conversation = match self.conversations.find_active_by_user(&user.id).await? {
            Some(active) => active,
            None => {
                let created = self.conversations.create(&user.id).await?;
                info!(
                    conversation_id = %created.id,
                    user_id = %user.id,
                    "started new conversation"
                );
                created
            }
        };

        Ok((conversation, user))
    }

    /// Cache-first read of the conversation with its recent messages.
    ///
    /// A hit is deserialized and schema-validated; invalid entries are
    /// deleted and the store is consulted. The store fallback trims to the
    /// last [`CONTEXT_WINDOW`] messages before re-populating the cache.
    pub async fn get_with_context(
        &self,
        conversation_id: &str,
    ) -> Result<ContextDocument, CharlaError> {
        if let Some(doc) = cache_doc::read_validated(self.kv.as_ref(), conversation_id).await {
            debug!(conversation_id, "context cache hit");
            return Ok(doc);
        }

        let conversation = self
            .conversations
            .find_by_id(conversation_id, None)
            .await?
            .ok_or_else(|| CharlaError::NotFound {
                entity: "conversation",
                id: conversation_id.to_string(),
            })?;
        let window = self
            .messages
            .find_recent_by_conversation(conversation_id, CONTEXT_WINDOW)
            .await?;

        let doc = ContextDocument::from_store(&conversation, &window);
        cache_doc::write(self.kv.as_ref(), &doc).await;
        debug!(conversation_id, messages = doc.messages.len(), "context rebuilt from store");
        Ok(doc)
    }

    /// Bumps last-activity and invalidates the cache entry.
    pub async fn touch(&self, conversation_id: &str) -> Result<Conversation, CharlaError> {
        let conversation = self.conversations.touch(conversation_id).await?;
        cache_doc::invalidate(self.kv.as_ref(), conversation_id).await;
        Ok(conversation)
    }

    /// Ownership-checked ACTIVE → CLOSED; invalidates on success.
    pub async fn close(
        &self,
        conversation_id: &str,
        as_user: &str,
    ) -> Result<Conversation, CharlaError> {
        let conversation = self.conversations.close(conversation_id, as_user).await?;
        cache_doc::invalidate(self.kv.as_ref(), conversation_id).await;
        Ok(conversation)
    }

    /// Ownership-checked ACTIVE → ARCHIVED; invalidates on success.
    pub async fn archive(
        &self,
        conversation_id: &str,
        as_user: &str,
    ) -> Result<Conversation, CharlaError> {
        let conversation = self.conversations.archive(conversation_id, as_user).await?;
        cache_doc::invalidate(self.kv.as_ref(), conversation_id).await;
        Ok(conversation)
    }

    /// Ownership-checked summary update; invalidates on success.
    pub async fn update_summary(
        &self,
        conversation_id: &str,
        summary: &str,
        as_user: &str,
    ) -> Result<Conversation, CharlaError> {
        let conversation = self
            .conversations
            .set_summary(conversation_id, summary, as_user)
            .await?;
        cache_doc::invalidate(self.kv.as_ref(), conversation_id).await;
        Ok(conversation)
    }

    /// The context window as `(role, content)` pairs, straight from the
    /// store.
    pub async fn recent_context(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ContextEntry>, CharlaError> {
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

    /// Drops the cache entry.
    pub async fn invalidate(&self, conversation_id: &str) {
        cache_doc::invalidate(self.kv.as_ref(), conversation_id).await;
    }
}
