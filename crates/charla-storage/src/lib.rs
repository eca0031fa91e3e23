// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the charla gateway.
//!
//! WAL-mode SQLite with a single-writer concurrency model via
//! `tokio-rusqlite`, an idempotent embedded schema, and typed repositories
//! for users, conversations, and messages.

pub mod conversations;
pub mod database;
pub mod messages;
pub mod schema;
pub mod users;

pub use conversations::ConversationRepository;
pub use database::Database;
pub use messages::{MessageRepository, NewMessage};
pub use users::UserRepository;
