// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dual-axis rate limiter, the third pipeline stage.
//!
//! Two independent fixed-window counters in the key-value store: one per
//! hashed phone, one per client IP. Counters are mutated only through
//! atomic INCR; the window expiry is attached when a counter is created.
//!
//! **Fail-open**: if the store is unreachable the request proceeds and the
//! degradation is audit-logged. Store unavailability never rejects users.

use std::sync::Arc;

use charla_config::model::RateLimitConfig;
use charla_core::{CharlaError, KeyValueStore};
use tracing::warn;

/// Which axis rejected the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    Phone,
    Ip,
}

/// Result of checking both axes.
#[derive(Debug, Clone)]
pub struct RateOutcome {
    /// `None` means allowed (including fail-open).
    pub limited: Option<LimitScope>,
    /// `X-RateLimit-*` headers to attach to the response. Empty when the
    /// limiter failed open and no quota numbers are known.
    pub headers: Vec<(&'static str, String)>,
}

impl RateOutcome {
    fn allowed_without_headers() -> Self {
        Self {
            limited: None,
            headers: Vec::new(),
        }
    }
}

struct AxisStatus {
    count: i64,
    reset_unix: i64,
}

/// Fixed-window limiter over the shared key-value store.
#[derive(Clone)]
pub struct RateLimiter {
    kv: Arc<dyn KeyValueStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(kv: Arc<dyn KeyValueStore>, config: RateLimitConfig) -> Self {
        Self { kv, config }
    }

    /// Bumps both axes and reports the decision.
    ///
    /// `phone_hash` is the privacy-hashed phone, never the raw value; the
    /// IP is keyed raw. When both axes are over their ceiling the phone
    /// axis is reported, which is the one operators triage by.
    pub async fn check(&self, phone_hash: &str, client_ip: &str) -> RateOutcome {
        let phone_key = format!("ratelimit:phone:{phone_hash}");
        let ip_key = format!("ratelimit:ip:{client_ip}");

        let phone = match self
            .bump(&phone_key, self.config.window_seconds)
            .await
        {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, axis = "phone", "rate limiter failing open");
                return RateOutcome::allowed_without_headers();
            }
        };
        let ip = match self.bump(&ip_key, self.config.ip_window_seconds).await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, axis = "ip", "rate limiter failing open");
                return RateOutcome::allowed_without_headers();
            }
        };

        let phone_limit = i64::from(self.config.max_requests);
        let ip_limit = i64::from(self.config.max_ip_requests);

        let headers = vec![
            ("X-RateLimit-Limit", phone_limit.to_string()),
            (
                "X-RateLimit-Remaining",
                (phone_limit - phone.count).max(0).to_string(),
            ),
            ("X-RateLimit-Reset", phone.reset_unix.to_string()),
            ("X-RateLimit-IP-Limit", ip_limit.to_string()),
            (
                "X-RateLimit-IP-Remaining",
                (ip_limit - ip.count).max(0).to_string(),
            ),
        ];

        let limited = if phone.count > phone_limit {
            Some(LimitScope::Phone)
        } else if ip.count > ip_limit {
            Some(LimitScope::Ip)
        } else {
            None
        };

        RateOutcome { limited, headers }
    }

    async fn bump(&self, key: &str, window_secs: u64) -> Result<AxisStatus, CharlaError> {
        let count = self.kv.incr(key).await?;
        if count == 1 {
            self.kv.expire(key, window_secs).await?;
        }
        let ttl = self.kv.ttl(key).await?.unwrap_or(window_secs);
        let reset_unix = chrono::Utc::now().timestamp() + ttl as i64;
        Ok(AxisStatus { count, reset_unix })
    }
}
