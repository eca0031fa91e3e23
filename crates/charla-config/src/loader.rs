// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Merge order (later overrides earlier): compiled defaults, `charla.toml`
//! in the working directory, `CHARLA_*` prefixed environment variables,
//! and finally the well-known operational variables (`DATABASE_URL`,
//! `ANTHROPIC_API_KEY`, ...).

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::CharlaConfig;

/// Load configuration from `charla.toml` plus environment overrides.
pub fn load_config() -> Result<CharlaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CharlaConfig::default()))
        .merge(Toml::file("charla.toml"))
        .merge(prefixed_provider())
        .merge(alias_provider())
        .extract()
}

/// Load configuration from inline TOML only (no env lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<CharlaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CharlaConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CharlaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CharlaConfig::default()))
        .merge(Toml::file(path))
        .merge(prefixed_provider())
        .merge(alias_provider())
        .extract()
}

/// `CHARLA_*` prefixed environment provider with explicit section mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `CHARLA_RATE_LIMIT_MAX_REQUESTS` must
/// map to `rate_limit.max_requests`, not `rate.limit.max.requests`.
fn prefixed_provider() -> Env {
    Env::prefixed("CHARLA_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("server_", "server.", 1)
            .replacen("database_", "database.", 1)
            .replacen("redis_", "redis.", 1)
            .replacen("twilio_", "twilio.", 1)
            .replacen("anthropic_", "anthropic.", 1)
            .replacen("rate_limit_", "rate_limit.", 1)
            .replacen("privacy_", "privacy.", 1)
            .replacen("logging_", "logging.", 1);
        mapped.into()
    })
}

/// Un-prefixed operational variables, mapped onto their dotted config keys.
///
/// These are the names deployment platforms conventionally inject
/// (`DATABASE_URL`, `PORT`, provider credentials), so they work without the
/// `CHARLA_` prefix.
fn alias_provider() -> Env {
    Env::raw()
        .only(&[
            "DATABASE_URL",
            "REDIS_URL",
            "PORT",
            "APP_ENV",
            "LOG_LEVEL",
            "PRIVACY_HASH_SALT",
            "ALLOWED_ORIGINS",
            "TRUST_PROXY",
            "TWILIO_ACCOUNT_SID",
            "TWILIO_AUTH_TOKEN",
            "TWILIO_PHONE_NUMBER",
            "ANTHROPIC_API_KEY",
            "RATE_LIMIT_MAX_REQUESTS",
            "RATE_LIMIT_WINDOW_SECONDS",
            "RATE_LIMIT_MAX_IP_REQUESTS",
            "RATE_LIMIT_IP_WINDOW_SECONDS",
        ])
        .map(|key| {
            match key.as_str().to_ascii_lowercase().as_str() {
                "database_url" => "database.url".into(),
                "redis_url" => "redis.url".into(),
                "port" => "server.port".into(),
                "app_env" => "server.environment".into(),
                "log_level" => "logging.level".into(),
                "privacy_hash_salt" => "privacy.hash_salt".into(),
                "allowed_origins" => "server.allowed_origins".into(),
                "trust_proxy" => "server.trust_proxy".into(),
                "twilio_account_sid" => "twilio.account_sid".into(),
                "twilio_auth_token" => "twilio.auth_token".into(),
                "twilio_phone_number" => "twilio.phone_number".into(),
                "anthropic_api_key" => "anthropic.api_key".into(),
                "rate_limit_max_requests" => "rate_limit.max_requests".into(),
                "rate_limit_window_seconds" => "rate_limit.window_seconds".into(),
                "rate_limit_max_ip_requests" => "rate_limit.max_ip_requests".into(),
                "rate_limit_ip_window_seconds" => "rate_limit.ip_window_seconds".into(),
                other => other.to_string().into(),
            }
        })
}
