// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Twilio WhatsApp channel integration: payload validation, webhook
//! signature verification, TwiML reply serialization, and the localized
//! reply texts.

pub mod payload;
pub mod replies;
pub mod signature;
pub mod twiml;

pub use payload::{validate_media, validate_message_length, MediaItem, WebhookPayload};
pub use replies::ReplyLanguage;
pub use signature::SignatureVerifier;
