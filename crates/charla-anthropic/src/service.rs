// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Completion service: validation, token-budget truncation, and metrics.
//!
//! Sits between the conversation engine and the raw API client. Input is
//! the context window as `(role, content)` pairs; output is the assistant
//! text plus the usage numbers the message store persists.

use std::time::Instant;

use charla_core::{CharlaError, ContextEntry, MessageRole};
use tracing::debug;

use crate::client::AnthropicClient;
use crate::pricing::PriceTable;
use crate::types::{ApiMessage, MessageRequest};

/// Default system prompt when the deployment does not configure one.
const DEFAULT_SYSTEM_PROMPT: &str =
    "Eres un asistente amable que responde mensajes de WhatsApp. \
     Responde de forma breve, clara y en el idioma del usuario.";

/// Estimated-token ceiling for the request context.
const CONTEXT_TOKEN_CEILING: usize = 8000;

/// Options for the completion service, mapped from configuration.
#[derive(Debug, Clone)]
pub struct LlmOptions {
    /// Model identifier.
    pub model: String,
    /// Maximum output tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// System prompt override.
    pub system_prompt: Option<String>,
    /// Price table for cost attribution.
    pub pricing: PriceTable,
}

impl Default for LlmOptions {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 1024,
            temperature: 0.7,
            system_prompt: None,
            pricing: PriceTable::default(),
        }
    }
}

/// Result of one completion, with the usage numbers persisted alongside
/// the assistant turn.
#[derive(Debug, Clone)]
pub struct CompletionMetrics {
    /// Assistant text: all text blocks joined with newlines.
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// `input_tokens + output_tokens`.
    pub tokens_used: u32,
    /// Wall-clock time of the whole call, retries included.
    pub latency_ms: i64,
    pub model: String,
    pub stop_reason: Option<String>,
    /// USD cost per the configured price table.
    pub cost_usd: f64,
}

/// Validated, budgeted completion requests over [`AnthropicClient`].
#[derive(Debug, Clone)]
pub struct LlmService {
    client: AnthropicClient,
    options: LlmOptions,
}

impl LlmService {
    pub fn new(client: AnthropicClient, options: LlmOptions) -> Self {
        Self { client, options }
    }

    /// Requests a completion for the given context window.
    ///
    /// The list is validated, truncated from the oldest end to the token
    /// budget, and converted to the vendor format. System-role entries are
    /// folded into the system prompt since the Messages API only accepts
    /// user/assistant roles in the message list.
    pub async fn complete_with_metrics(
        &self,
        entries: &[ContextEntry],
    ) -> Result<CompletionMetrics, CharlaError> {
        validate_entries(entries)?;
        let window = truncate_to_budget(entries, CONTEXT_TOKEN_CEILING);
        if window.len() < entries.len() {
            debug!(
                dropped = entries.len() - window.len(),
                kept = window.len(),
                "context window truncated to token budget"
            );
        }

        let mut system = self
            .options
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        let mut messages = Vec::with_capacity(window.len());
        for entry in window {
            match entry.role {
                MessageRole::System => {
                    system.push_str("\n\n");
                    system.push_str(&entry.content);
                }
                role => messages.push(ApiMessage {
                    role: role.as_api_str().to_string(),
                    content: entry.content.clone(),
                }),
            }
        }

        let request = MessageRequest {
            model: self.options.model.clone(),
            messages,
            system: Some(system),
            max_tokens: self.options.max_tokens,
            temperature: Some(self.options.temperature),
        };

        let started = Instant::now();
        let response = self.client.complete(&request).await?;
        let latency_ms = started.elapsed().as_millis() as i64;

        let input_tokens = response.usage.input_tokens;
        let output_tokens = response.usage.output_tokens;
        Ok(CompletionMetrics {
            content: response.joined_text(),
            input_tokens,
            output_tokens,
            tokens_used: input_tokens + output_tokens,
            latency_ms,
            model: response.model,
            stop_reason: response.stop_reason,
            cost_usd: self.options.pricing.cost(input_tokens, output_tokens),
        })
    }
}

/// Rejects empty lists, blank content, and windows that do not end on a
/// user turn. Role membership is enforced by the type.
fn validate_entries(entries: &[ContextEntry]) -> Result<(), CharlaError> {
    if entries.is_empty() {
        return Err(CharlaError::ValidationFailed(
            "message list is empty".into(),
        ));
    }
    for (i, entry) in entries.iter().enumerate() {
        if entry.content.trim().is_empty() {
            return Err(CharlaError::ValidationFailed(format!(
                "message {i} has empty content"
            )));
        }
    }
    let last = entries.last().expect("checked non-empty above");
    if last.role != MessageRole::User {
        return Err(CharlaError::ValidationFailed(
            "last message must have role user".into(),
        ));
    }
    Ok(())
}

/// Estimated token count: one token per four characters, rounded up.
fn estimate_tokens(content: &str) -> usize {
    content.len().div_ceil(4)
}

/// Largest suffix whose estimated token sum fits the ceiling.
///
/// The most recent message is always kept, even if it alone exceeds the
/// budget; sending nothing would be worse than sending an oversized turn.
fn truncate_to_budget(entries: &[ContextEntry], ceiling: usize) -> &[ContextEntry] {
    let mut total = 0usize;
    let mut start = entries.len();
    for (i, entry) in entries.iter().enumerate().rev() {
        let tokens = estimate_tokens(&entry.content);
        if total + tokens > ceiling && start < entries.len() {
            break;
        }
        total += tokens;
        start = i;
        if total > ceiling {
            break;
        }
    }
    &entries[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry(role: MessageRole, content: &str) -> ContextEntry {
        ContextEntry {
            role,
            content: content.to_string(),
        }
    }

    fn user(content: &str) -> ContextEntry {
        entry(MessageRole::User, content)
    }

    async fn service_against(server: &MockServer) -> LlmService {
        let client = AnthropicClient::new("test-key")
            .unwrap()
            .with_base_url(server.uri());
        LlmService::new(client, LlmOptions::default())
    }

    #[test]
    fn validation_rejects_empty_list() {
        let err = validate_entries(&[]).unwrap_err();
        assert!(matches!(err, CharlaError::ValidationFailed(_)));
    }

    #[test]
    fn validation_rejects_blank_content() {
        let err = validate_entries(&[user("   ")]).unwrap_err();
        assert!(matches!(err, CharlaError::ValidationFailed(_)));
    }

    #[test]
    fn validation_requires_trailing_user_turn() {
        let window = [user("hola"), entry(MessageRole::Assistant, "¡hola!")];
        let err = validate_entries(&window).unwrap_err();
        assert!(err.to_string().contains("last message"));

        let window = [entry(MessageRole::Assistant, "¡hola!"), user("hola")];
        assert!(validate_entries(&window).is_ok());
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn truncation_keeps_most_recent_suffix() {
        // Each entry is 40 chars = 10 estimated tokens.
        let entries: Vec<ContextEntry> =
            (0..10).map(|i| user(&format!("{:040}", i))).collect();

        // Budget for exactly four entries.
        let window = truncate_to_budget(&entries, 40);
        assert_eq!(window.len(), 4);
        assert_eq!(window[3].content, entries[9].content);
        assert_eq!(window[0].content, entries[6].content);

        // Budget for everything: untouched.
        let window = truncate_to_budget(&entries, 1000);
        assert_eq!(window.len(), 10);
    }

    #[test]
    fn truncation_always_keeps_last_entry() {
        let oversized = "x".repeat(100_000);
        let entries = vec![user("short"), user(&oversized)];
        let window = truncate_to_budget(&entries, 8000);
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].content.len(), 100_000);
    }

    #[tokio::test]
    async fn complete_with_metrics_returns_usage_and_cost() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "claro"}, {"type": "text", "text": "que sí"}],
            "model": "claude-sonnet-4-20250514",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 2000, "output_tokens": 1000}
        });
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let service = service_against(&server).await;
        let metrics = service
            .complete_with_metrics(&[user("¿puedes ayudarme?")])
            .await
            .unwrap();

        assert_eq!(metrics.content, "claro\nque sí");
        assert_eq!(metrics.input_tokens, 2000);
        assert_eq!(metrics.output_tokens, 1000);
        assert_eq!(metrics.tokens_used, 3000);
        assert_eq!(metrics.stop_reason.as_deref(), Some("end_turn"));
        // 2000/1M * 3.0 + 1000/1M * 15.0
        assert!((metrics.cost_usd - 0.021).abs() < 1e-10);
    }

    #[tokio::test]
    async fn system_entries_fold_into_system_prompt() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "ok"}],
            "model": "claude-sonnet-4-20250514",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 1, "output_tokens": 1}
        });
        Mock::given(method("POST"))
            .and(path("/"))
            .and(wiremock::matchers::body_string_contains("resumen previo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .expect(1)
            .mount(&server)
            .await;

        let service = service_against(&server).await;
        let window = [
            entry(MessageRole::System, "resumen previo de la conversación"),
            user("sigamos"),
        ];
        let metrics = service.complete_with_metrics(&window).await.unwrap();
        assert_eq!(metrics.content, "ok");
    }

    #[tokio::test]
    async fn validation_error_skips_the_api_call() {
        let server = MockServer::start().await;
        // No mounts: any request would 404 and fail differently.
        let service = service_against(&server).await;
        let err = service.complete_with_metrics(&[]).await.unwrap_err();
        assert!(matches!(err, CharlaError::ValidationFailed(_)));
    }
}
