// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the charla workspace.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle state of a conversation.
///
/// `Closed` and `Archived` are terminal for the inbound path: the next
/// message from the same phone starts a fresh active conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationStatus {
    Active,
    Closed,
    Archived,
}

/// Author of a single turn.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    /// Lowercase role string in the vendor `{role, content}` wire format.
    pub fn as_api_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

/// A messaging endpoint identity, created on first inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Surrogate identifier.
    pub id: String,
    /// Canonical phone in `+<digits>` form. Unique.
    pub phone_number: String,
    /// Optional display name from the provider profile.
    pub display_name: Option<String>,
    /// BCP-47-ish language tag; defaults to "es".
    pub language: String,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-update timestamp.
    pub updated_at: String,
}

/// A bounded session grouping messages for exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Surrogate identifier.
    pub id: String,
    /// Owning user. Never shared.
    pub user_id: String,
    /// Lifecycle state.
    pub status: ConversationStatus,
    /// Optional rolling textual summary.
    pub context_summary: Option<String>,
    /// ISO 8601 timestamp of the latest appended turn.
    pub last_message_at: String,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-update timestamp.
    pub updated_at: String,
}

/// A single turn within a conversation. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Surrogate identifier.
    pub id: String,
    /// Conversation this turn belongs to.
    pub conversation_id: String,
    /// Author role.
    pub role: MessageRole,
    /// Turn text.
    pub content: String,
    /// Provider message id. Globally unique when present; the
    /// at-most-once key for inbound appends.
    pub provider_sid: Option<String>,
    /// Optional JSON metadata blob. The only mutable field.
    pub metadata: Option<String>,
    /// Total tokens attributed to this turn (assistant turns only).
    pub tokens_used: Option<i64>,
    /// Wall-clock latency of the producing LLM call in milliseconds.
    pub latency_ms: Option<i64>,
    /// ISO 8601 creation timestamp. Ordering key (ties broken by id).
    pub created_at: String,
}

/// A `(role, content)` pair as supplied to the LLM context window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub role: MessageRole,
    pub content: String,
}

/// Aggregate token usage over a conversation's metered turns.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TokenStats {
    /// Sum of non-null token counts.
    pub total: i64,
    /// Number of metered turns.
    pub count: i64,
    /// Mean tokens per metered turn; 0.0 when count is 0.
    pub avg: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_round_trips_screaming_case() {
        for status in [
            ConversationStatus::Active,
            ConversationStatus::Closed,
            ConversationStatus::Archived,
        ] {
            let s = status.to_string();
            assert_eq!(s, s.to_uppercase());
            assert_eq!(ConversationStatus::from_str(&s).unwrap(), status);
        }
    }

    #[test]
    fn role_round_trips_and_maps_to_api_form() {
        for (role, api) in [
            (MessageRole::User, "user"),
            (MessageRole::Assistant, "assistant"),
            (MessageRole::System, "system"),
        ] {
            assert_eq!(MessageRole::from_str(&role.to_string()).unwrap(), role);
            assert_eq!(role.as_api_str(), api);
        }
    }

    #[test]
    fn role_serde_uses_store_form() {
        let json = serde_json::to_string(&MessageRole::Assistant).unwrap();
        assert_eq!(json, "\"ASSISTANT\"");
        let back: MessageRole = serde_json::from_str(&json).unwrap();
        assert_eq!(back, MessageRole::Assistant);
    }
}
