// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as required production credentials and the privacy
//! salt policy.

use charla_core::CharlaError;

use crate::model::{CharlaConfig, Environment, PLACEHOLDER_SALT};

/// Minimum length of a usable privacy salt.
const MIN_SALT_LEN: usize = 32;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<String>)` with all
/// collected validation errors (does not fail fast).
pub fn validate_config(config: &CharlaConfig) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if config.server.host.trim().is_empty() {
        errors.push("server.host must not be empty".to_string());
    } else {
        let addr = config.server.host.trim();
        let is_valid_ip = addr.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = addr
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(format!(
                "server.host `{addr}` is not a valid IP address or hostname"
            ));
        }
    }

    if config.database.url.trim().is_empty() {
        errors.push("database.url must not be empty".to_string());
    }

    if config.redis.url.trim().is_empty() {
        errors.push("redis.url must not be empty".to_string());
    }

    if config.rate_limit.max_requests == 0 {
        errors.push("rate_limit.max_requests must be at least 1".to_string());
    }
    if config.rate_limit.max_ip_requests == 0 {
        errors.push("rate_limit.max_ip_requests must be at least 1".to_string());
    }
    if config.rate_limit.window_seconds == 0 {
        errors.push("rate_limit.window_seconds must be at least 1".to_string());
    }
    if config.rate_limit.ip_window_seconds == 0 {
        errors.push("rate_limit.ip_window_seconds must be at least 1".to_string());
    }

    if config.anthropic.max_tokens == 0 {
        errors.push("anthropic.max_tokens must be at least 1".to_string());
    }
    if !(0.0..=1.0).contains(&config.anthropic.temperature) {
        errors.push(format!(
            "anthropic.temperature must be within [0.0, 1.0], got {}",
            config.anthropic.temperature
        ));
    }

    match config.logging.level.as_str() {
        "error" | "warn" | "info" | "debug" | "trace" => {}
        other => errors.push(format!(
            "logging.level must be one of error/warn/info/debug/trace, got `{other}`"
        )),
    }

    // Production hardening: real credentials and a real salt are mandatory.
    if config.server.environment == Environment::Production {
        if config.twilio.auth_token.as_deref().unwrap_or("").is_empty() {
            errors.push("twilio.auth_token is required in production".to_string());
        }
        if config.anthropic.api_key.as_deref().unwrap_or("").is_empty() {
            errors.push("anthropic.api_key is required in production".to_string());
        }
        if config.privacy.hash_salt == PLACEHOLDER_SALT {
            errors.push(
                "privacy.hash_salt is still the development placeholder; set PRIVACY_HASH_SALT"
                    .to_string(),
            );
        }
        if config.privacy.hash_salt.len() < MIN_SALT_LEN {
            errors.push(format!(
                "privacy.hash_salt must be at least {MIN_SALT_LEN} characters, got {}",
                config.privacy.hash_salt.len()
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate and collapse issues into a single [`CharlaError::Config`].
pub fn ensure_valid(config: &CharlaConfig) -> Result<(), CharlaError> {
    validate_config(config).map_err(|issues| CharlaError::Config(issues.join("; ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnthropicConfig, PrivacyConfig, ServerConfig, TwilioConfig};

    fn production_config() -> CharlaConfig {
        CharlaConfig {
            server: ServerConfig {
                environment: Environment::Production,
                ..ServerConfig::default()
            },
            twilio: TwilioConfig {
                auth_token: Some("twilio-auth-token".into()),
                ..TwilioConfig::default()
            },
            anthropic: AnthropicConfig {
                api_key: Some("sk-ant-test".into()),
                ..AnthropicConfig::default()
            },
            privacy: PrivacyConfig {
                hash_salt: "a-genuinely-random-salt-of-32+-chars!".into(),
            },
            ..CharlaConfig::default()
        }
    }

    #[test]
    fn default_config_is_valid_in_development() {
        assert!(validate_config(&CharlaConfig::default()).is_ok());
    }

    #[test]
    fn valid_production_config_passes() {
        assert!(validate_config(&production_config()).is_ok());
    }

    #[test]
    fn production_rejects_placeholder_salt() {
        let mut config = production_config();
        config.privacy.hash_salt = PLACEHOLDER_SALT.to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("placeholder")));
    }

    #[test]
    fn production_rejects_short_salt() {
        let mut config = production_config();
        config.privacy.hash_salt = "short".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("at least 32")));
    }

    #[test]
    fn production_requires_credentials() {
        let mut config = production_config();
        config.twilio.auth_token = None;
        config.anthropic.api_key = None;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn development_allows_placeholder_salt() {
        let config = CharlaConfig::default();
        assert_eq!(config.privacy.hash_salt, PLACEHOLDER_SALT);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn collects_multiple_errors_without_failing_fast() {
        let mut config = CharlaConfig::default();
        config.database.url = String::new();
        config.rate_limit.max_requests = 0;
        config.logging.level = "verbose".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn ensure_valid_maps_to_config_error() {
        let mut config = CharlaConfig::default();
        config.redis.url = String::new();
        let err = ensure_valid(&config).unwrap_err();
        assert!(matches!(err, CharlaError::Config(_)));
        assert!(err.to_string().contains("redis.url"));
    }

    #[test]
    fn temperature_outside_range_rejected() {
        let mut config = CharlaConfig::default();
        config.anthropic.temperature = 1.5;
        assert!(validate_config(&config).is_err());
    }
}
