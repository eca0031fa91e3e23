// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sensitive-value redaction for structured log output.
//!
//! Payload echoes and error contexts are JSON values; before they reach a
//! log line they pass through [`redact_value`], which replaces any value
//! stored under a sensitive key name with `[REDACTED]`, recursively through
//! objects and arrays.

use serde_json::Value;

/// The redaction placeholder.
const REDACTED: &str = "[REDACTED]";

/// Key names whose values are always redacted, compared case-insensitively.
///
/// Covers credentials, auth headers, the provider message id, and the
/// sender/recipient phone fields of the webhook payload.
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "token",
    "secret",
    "authorization",
    "api_key",
    "auth_token",
    "messagesid",
    "message_sid",
    "from",
    "to",
    "phone",
    "phone_number",
    "waid",
];

/// Recursively redacts sensitive values in place.
pub fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if is_sensitive(key) {
                    *val = Value::String(REDACTED.to_string());
                } else {
                    redact_value(val);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_value(item);
            }
        }
        _ => {}
    }
}

/// Redacts a clone of `value`, leaving the original untouched.
pub fn redacted(value: &Value) -> Value {
    let mut copy = value.clone();
    redact_value(&mut copy);
    copy
}

fn is_sensitive(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_KEYS.contains(&lower.as_str())
}
