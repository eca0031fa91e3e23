// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the charla WhatsApp gateway.
//!
//! Provides the error type, the domain entities (users, conversations,
//! messages), and the key-value store seam used by the rate limiter and
//! the context cache.

pub mod error;
pub mod traits;
pub mod types;

pub use error::CharlaError;
pub use traits::KeyValueStore;
pub use types::{
    ContextEntry, Conversation, ConversationStatus, Message, MessageRole, TokenStats, User,
};
