// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the charla gateway.

use thiserror::Error;

/// The primary error type used across all charla components.
///
/// Variants are semantic kinds, not transport codes: the HTTP layer maps
/// them to status codes and reply bodies, services match on them to decide
/// what is recoverable.
#[derive(Debug, Error)]
pub enum CharlaError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Request shape is wrong (missing fields, pattern mismatch).
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Provider signature check failed or credentials are wrong.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Request carried an unsupported content type.
    #[error("unsupported media type: {0}")]
    UnsupportedMedia(String),

    /// An inbound rate-limit axis was exceeded.
    #[error("rate limited: {scope}")]
    RateLimited {
        /// Which axis tripped: "phone" or "ip".
        scope: String,
    },

    /// An identifier did not resolve to a row.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Caller user id does not match the owning user id.
    #[error("access denied to {entity} {id}")]
    AccessDenied { entity: &'static str, id: String },

    /// The LLM API returned 429.
    #[error("upstream rate limited: {0}")]
    UpstreamRateLimited(String),

    /// The LLM API rejected the request as malformed (400).
    #[error("upstream rejected request: {0}")]
    BadRequest(String),

    /// The LLM API rejected our credentials (401/403).
    #[error("upstream authentication failed: {0}")]
    UpstreamAuth(String),

    /// The LLM API is unreachable or returned a 5xx after retries.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Any other LLM failure after retries are exhausted.
    #[error("upstream error: {message}")]
    UpstreamError {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Relational store errors (connection, query, constraint we cannot recover).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Key-value store errors. Callers fail open (rate limiter) or fall
    /// back to the relational store (context reader).
    #[error("cache error: {message}")]
    Cache {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CharlaError {
    /// True when the error came from the key-value store and the caller
    /// should degrade rather than reject.
    pub fn is_cache(&self) -> bool {
        matches!(self, CharlaError::Cache { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_context() {
        let err = CharlaError::NotFound {
            entity: "conversation",
            id: "c-1".into(),
        };
        assert_eq!(err.to_string(), "conversation not found: c-1");

        let err = CharlaError::AccessDenied {
            entity: "conversation",
            id: "c-2".into(),
        };
        assert_eq!(err.to_string(), "access denied to conversation c-2");
    }

    #[test]
    fn is_cache_only_matches_cache_variant() {
        let cache = CharlaError::Cache {
            message: "redis down".into(),
            source: None,
        };
        assert!(cache.is_cache());

        let storage = CharlaError::Storage {
            source: Box::new(std::io::Error::other("disk")),
        };
        assert!(!storage.is_cache());
    }
}
