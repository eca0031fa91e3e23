// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation engine: the cache-validated context reader, the
//! conversation service, and the turn-append message service.

pub mod cache_doc;
pub mod conversations;
pub mod messages;

pub use cache_doc::{ContextDocument, CACHE_TTL_SECS, CONTEXT_WINDOW};
pub use conversations::ConversationService;
pub use messages::MessageService;
