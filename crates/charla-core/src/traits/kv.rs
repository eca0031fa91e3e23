// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key-value store seam for counters and the context cache.

use async_trait::async_trait;

use crate::error::CharlaError;

/// Async key-value store used for atomic rate-limit counters and the
/// short-lived context cache.
///
/// Counters are mutated exclusively through [`incr`](Self::incr); the
/// service never reads-then-writes them. Cache coherence is maintained by
/// invalidate-on-write and validate-on-read, not by locks, so every
/// operation here is independent.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Atomically increments the integer at `key`, creating it at 1.
    async fn incr(&self, key: &str) -> Result<i64, CharlaError>;

    /// Attaches an expiry to `key`.
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), CharlaError>;

    /// Remaining time-to-live of `key`, or `None` when the key has no expiry
    /// or does not exist.
    async fn ttl(&self, key: &str) -> Result<Option<u64>, CharlaError>;

    /// Reads the string value at `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, CharlaError>;

    /// Writes `value` at `key` with an expiry.
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CharlaError>;

    /// Deletes `key`. Deleting a missing key is not an error.
    async fn del(&self, key: &str) -> Result<(), CharlaError>;

    /// Round-trip liveness probe for health checks.
    async fn ping(&self) -> Result<(), CharlaError>;
}
