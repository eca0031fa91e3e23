// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process [`KeyValueStore`] for tests and local development.
//!
//! Mirrors the Redis semantics the gateway relies on: INCR creates at 1,
//! TTL counts down in real time, expired entries read as missing. A fail
//! mode turns every operation into a `Cache` error so fail-open paths can
//! be exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use charla_core::{CharlaError, KeyValueStore};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Mutexed in-memory key-value store.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    fail_mode: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When enabled, every operation fails with a `Cache` error.
    pub fn set_fail_mode(&self, fail: bool) {
        self.fail_mode.store(fail, Ordering::SeqCst);
    }

    fn check_fail(&self) -> Result<(), CharlaError> {
        if self.fail_mode.load(Ordering::SeqCst) {
            return Err(CharlaError::Cache {
                message: "memory store in fail mode".into(),
                source: None,
            });
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        // A poisoned lock only happens after a panic in another test thread;
        // the inner map is still structurally sound.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn incr(&self, key: &str) -> Result<i64, CharlaError> {
        self.check_fail()?;
        let mut entries = self.lock();
        let next = match entries.get(key) {
            Some(entry) if !entry.expired() => {
                entry.value.parse::<i64>().unwrap_or(0) + 1
            }
            _ => 1,
        };
        let expires_at = entries
            .get(key)
            .filter(|e| !e.expired())
            .and_then(|e| e.expires_at);
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), CharlaError> {
        self.check_fail()?;
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key) {
            if !entry.expired() {
                entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
            }
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, CharlaError> {
        self.check_fail()?;
        let entries = self.lock();
        Ok(entries
            .get(key)
            .filter(|e| !e.expired())
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(Instant::now()).as_secs()))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CharlaError> {
        self.check_fail()?;
        let entries = self.lock();
        Ok(entries
            .get(key)
            .filter(|e| !e.expired())
            .map(|e| e.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CharlaError> {
        self.check_fail()?;
        let mut entries = self.lock();
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CharlaError> {
        self.check_fail()?;
        let mut entries = self.lock();
        entries.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), CharlaError> {
        self.check_fail()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incr_creates_at_one_and_counts_up() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("k").await.unwrap(), 1);
        assert_eq!(store.incr("k").await.unwrap(), 2);
        assert_eq!(store.incr("other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn set_ex_then_get_round_trips() {
        let store = MemoryStore::new();
        store.set_ex("k", "value", 60).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("value"));
        assert!(store.ttl("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn del_removes_and_missing_get_is_none() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", 60).await.unwrap();
        store.del("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
        // Deleting again is not an error.
        store.del("k").await.unwrap();
    }

    #[tokio::test]
    async fn expired_entries_read_as_missing() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", 0).await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.ttl("k").await.unwrap().is_none());
        // INCR on an expired counter restarts at 1.
        assert_eq!(store.incr("k").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn expire_attaches_ttl_to_counter() {
        let store = MemoryStore::new();
        store.incr("counter").await.unwrap();
        assert!(store.ttl("counter").await.unwrap().is_none());
        store.expire("counter", 60).await.unwrap();
        assert!(store.ttl("counter").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn fail_mode_errors_every_operation() {
        let store = MemoryStore::new();
        store.set_fail_mode(true);
        assert!(store.incr("k").await.unwrap_err().is_cache());
        assert!(store.get("k").await.unwrap_err().is_cache());
        assert!(store.ping().await.unwrap_err().is_cache());

        store.set_fail_mode(false);
        assert_eq!(store.incr("k").await.unwrap(), 1);
    }
}
