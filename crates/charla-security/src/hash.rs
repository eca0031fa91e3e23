// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyed one-way hashing of PII for log fields and cache keys.
//!
//! Phone numbers and names never enter logs or rate-limit keys in the
//! clear; they pass through [`hash_value`] first. The digest is keyed with
//! a process-wide salt so values cannot be brute-forced offline from a
//! leaked log, and truncated to 16 hex characters, which is plenty for
//! correlation.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Number of hex characters kept from the digest.
const HASH_PREFIX_LEN: usize = 16;

/// Sentinel returned for empty input.
const UNKNOWN: &str = "unknown";

/// Deterministically hashes `value` with `salt`.
///
/// Same input, same salt, same output within a process lifetime; never
/// reversible. Empty input returns the literal `"unknown"`.
pub fn hash_value(value: &str, salt: &str) -> String {
    if value.is_empty() {
        return UNKNOWN.to_string();
    }

    let mut mac = HmacSha256::new_from_slice(salt.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(value.as_bytes());
    let digest = mac.finalize().into_bytes();

    let mut hexed = hex::encode(digest);
    hexed.truncate(HASH_PREFIX_LEN);
    hexed
}
