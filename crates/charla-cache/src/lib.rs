// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key-value store implementations: Redis for deployments, an in-memory
//! twin for tests and local development.

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;
