// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the charla gateway.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Placeholder salt shipped for local development only. Production startup
/// refuses to run with it.
pub const PLACEHOLDER_SALT: &str = "default-salt-CHANGE-IN-PRODUCTION";

/// Deployment environment, selecting dev-only shortcuts such as the
/// signature-verification skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    /// Lowercase name as reported by the health endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

/// Top-level charla configuration.
///
/// Loaded from a TOML file with environment variable overrides; all
/// sections are optional and default to sensible development values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CharlaConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Relational store settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Key-value store settings.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Messaging provider credentials.
    #[serde(default)]
    pub twilio: TwilioConfig,

    /// LLM API settings.
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Dual-axis rate limiter tuning.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Privacy hashing settings.
    #[serde(default)]
    pub privacy: PrivacyConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment environment.
    #[serde(default = "default_environment")]
    pub environment: Environment,

    /// Comma-separated CORS origin whitelist. Empty means no browser origins.
    #[serde(default)]
    pub allowed_origins: String,

    /// Trust a single upstream proxy for client-IP extraction.
    #[serde(default)]
    pub trust_proxy: bool,
}

impl ServerConfig {
    /// Parsed CORS whitelist.
    pub fn origins(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            allowed_origins: String::new(),
            trust_proxy: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_environment() -> Environment {
    Environment::Development
}

/// Relational store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite database path.
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "charla.db".to_string()
}

/// Key-value store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RedisConfig {
    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

/// Messaging provider credentials and sender address.
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TwilioConfig {
    /// Account SID.
    #[serde(default)]
    pub account_sid: Option<String>,

    /// Auth token; the HMAC secret for signature verification.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Sender address (`whatsapp:+...`).
    #[serde(default)]
    pub phone_number: Option<String>,
}

impl std::fmt::Debug for TwilioConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioConfig")
            .field("account_sid", &self.account_sid.as_ref().map(|_| "[redacted]"))
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[redacted]"))
            .field("phone_number", &self.phone_number.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// LLM API configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnthropicConfig {
    /// API key. `None` only works in tests with a mock endpoint.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model identifier for completions.
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum output tokens per completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// System prompt override; a built-in default is used when absent.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl std::fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("system_prompt", &self.system_prompt)
            .finish()
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_prompt: None,
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.7
}

/// Dual-axis rate limiter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Requests allowed per phone per window.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Phone-axis window in seconds.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    /// Requests allowed per client IP per window.
    #[serde(default = "default_max_ip_requests")]
    pub max_ip_requests: u32,

    /// IP-axis window in seconds.
    #[serde(default = "default_window_seconds")]
    pub ip_window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_seconds: default_window_seconds(),
            max_ip_requests: default_max_ip_requests(),
            ip_window_seconds: default_window_seconds(),
        }
    }
}

fn default_max_requests() -> u32 {
    10
}

fn default_max_ip_requests() -> u32 {
    30
}

fn default_window_seconds() -> u64 {
    60
}

/// Privacy hashing configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrivacyConfig {
    /// Process-wide salt for the privacy hash. Must be at least 32
    /// characters and not the placeholder outside development.
    #[serde(default = "default_hash_salt")]
    pub hash_salt: String,
}

impl std::fmt::Debug for PrivacyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivacyConfig")
            .field("hash_salt", &"[redacted]")
            .finish()
    }
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            hash_salt: default_hash_salt(),
        }
    }
}

fn default_hash_salt() -> String {
    PLACEHOLDER_SALT.to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, or debug.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CharlaConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.environment, Environment::Development);
        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.rate_limit.max_ip_requests, 30);
        assert_eq!(config.rate_limit.window_seconds, 60);
        assert_eq!(config.anthropic.max_tokens, 1024);
        assert_eq!(config.privacy.hash_salt, PLACEHOLDER_SALT);
    }

    #[test]
    fn origins_splits_and_trims() {
        let server = ServerConfig {
            allowed_origins: "https://a.example, https://b.example ,".to_string(),
            ..ServerConfig::default()
        };
        assert_eq!(server.origins(), vec!["https://a.example", "https://b.example"]);
        assert!(ServerConfig::default().origins().is_empty());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let twilio = TwilioConfig {
            account_sid: Some("AC123".into()),
            auth_token: Some("tok-secret".into()),
            phone_number: Some("whatsapp:+15550100".into()),
        };
        let out = format!("{twilio:?}");
        assert!(!out.contains("tok-secret"));
        assert!(!out.contains("AC123"));
        assert!(out.contains("[redacted]"));

        let anthropic = AnthropicConfig {
            api_key: Some("sk-ant-xyz".into()),
            ..AnthropicConfig::default()
        };
        let out = format!("{anthropic:?}");
        assert!(!out.contains("sk-ant-xyz"));

        let privacy = PrivacyConfig {
            hash_salt: "super-secret-salt".into(),
        };
        let out = format!("{privacy:?}");
        assert!(!out.contains("super-secret-salt"));
    }

    #[test]
    fn environment_deserializes_lowercase() {
        let env: Environment = serde_json::from_str("\"production\"").unwrap();
        assert_eq!(env, Environment::Production);
        assert_eq!(env.as_str(), "production");
    }
}
