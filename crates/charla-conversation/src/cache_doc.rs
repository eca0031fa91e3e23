// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The cached context document and its schema.
//!
//! Key `conversation:{id}:context` holds a JSON snapshot of the
//! conversation plus its bounded recent messages. The cache is
//! non-authoritative: readers validate on read and delete on mismatch,
//! writers re-populate from the store. Timestamps are written as ISO 8601
//! strings and accepted as either strings or native epoch-millisecond
//! numbers on read.

use charla_core::{
    ContextEntry, Conversation, ConversationStatus, KeyValueStore, Message, MessageRole,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Cache entry lifetime.
pub const CACHE_TTL_SECS: u64 = 3600;

/// Maximum number of messages carried in the document — the context
/// window supplied to the LLM.
pub const CONTEXT_WINDOW: i64 = 10;

/// Cache key for a conversation's context document.
pub fn cache_key(conversation_id: &str) -> String {
    format!("conversation:{conversation_id}:context")
}

/// A timestamp as stored in the cache document.
///
/// Always serialized as an ISO 8601 string; tolerates native
/// epoch-millisecond numbers on read and normalizes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheTimestamp(pub String);

impl<'de> Deserialize<'de> for CacheTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Iso(String),
            EpochMillis(i64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Iso(s) => Ok(CacheTimestamp(s)),
            Repr::EpochMillis(ms) => {
                let dt = chrono::DateTime::from_timestamp_millis(ms).ok_or_else(|| {
                    serde::de::Error::custom(format!("timestamp {ms} out of range"))
                })?;
                Ok(CacheTimestamp(
                    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                ))
            }
        }
    }
}

impl From<String> for CacheTimestamp {
    fn from(value: String) -> Self {
        CacheTimestamp(value)
    }
}

/// One message inside the context document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CachedMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: CacheTimestamp,
    pub tokens_used: Option<i64>,
    pub latency_ms: Option<i64>,
}

/// The full cached snapshot of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContextDocument {
    pub id: String,
    pub user_id: String,
    pub status: ConversationStatus,
    pub context_summary: Option<String>,
    pub last_message_at: CacheTimestamp,
    pub created_at: CacheTimestamp,
    pub updated_at: CacheTimestamp,
    pub messages: Vec<CachedMessage>,
}

impl ContextDocument {
    /// Builds the document from store rows. `messages` must already be the
    /// trimmed ascending window.
    pub fn from_store(conversation: &Conversation, messages: &[Message]) -> Self {
        Self {
            id: conversation.id.clone(),
            user_id: conversation.user_id.clone(),
            status: conversation.status,
            context_summary: conversation.context_summary.clone(),
            last_message_at: conversation.last_message_at.clone().into(),
            created_at: conversation.created_at.clone().into(),
            updated_at: conversation.updated_at.clone().into(),
            messages: messages
                .iter()
                .map(|m| CachedMessage {
                    id: m.id.clone(),
                    role: m.role,
                    content: m.content.clone(),
                    created_at: m.created_at.clone().into(),
                    tokens_used: m.tokens_used,
                    latency_ms: m.latency_ms,
                })
                .collect(),
        }
    }

    /// Field checks the typed parse cannot express: the document must
    /// describe the requested conversation and carry a bounded window.
    pub fn validate(&self, conversation_id: &str) -> bool {
        self.id == conversation_id
            && !self.user_id.is_empty()
            && self.messages.len() as i64 <= CONTEXT_WINDOW
    }

    /// The `(role, content)` pairs supplied to the LLM, oldest first.
    pub fn context_entries(&self) -> Vec<ContextEntry> {
        self.messages
            .iter()
            .map(|m| ContextEntry {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }
}

/// Drops a conversation's cache entry.
///
/// Cache failures are logged, never propagated: invalidation is
/// best-effort and the validated read path reconciles against the store.
pub async fn invalidate(kv: &dyn KeyValueStore, conversation_id: &str) {
    if let Err(e) = kv.del(&cache_key(conversation_id)).await {
        warn!(conversation_id, error = %e, "context cache invalidation failed");
    }
}

/// Reads and revalidates a cached document; deletes the entry when it
/// fails to parse or validate. Returns `None` on miss, mismatch, or cache
/// unavailability.
pub async fn read_validated(
    kv: &dyn KeyValueStore,
    conversation_id: &str,
) -> Option<ContextDocument> {
    let key = cache_key(conversation_id);
    let raw = match kv.get(&key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(conversation_id, error = %e, "context cache unavailable, bypassing");
            return None;
        }
    };

    match serde_json::from_str::<ContextDocument>(&raw) {
        Ok(doc) if doc.validate(conversation_id) => Some(doc),
        Ok(_) | Err(_) => {
            warn!(conversation_id, "invalid context cache entry, deleting");
            if let Err(e) = kv.del(&key).await {
                warn!(conversation_id, error = %e, "failed to delete invalid cache entry");
            }
            None
        }
    }
}

/// Serializes and stores a document with the standard TTL. Failures are
/// logged and swallowed; the store remains the source of truth.
pub async fn write(kv: &dyn KeyValueStore, doc: &ContextDocument) {
    let key = cache_key(&doc.id);
    match serde_json::to_string(doc) {
        Ok(json) => {
            if let Err(e) = kv.set_ex(&key, &json, CACHE_TTL_SECS).await {
                warn!(conversation_id = %doc.id, error = %e, "context cache write failed");
            }
        }
        Err(e) => {
            warn!(conversation_id = %doc.id, error = %e, "context document serialization failed");
        }
    }
}
