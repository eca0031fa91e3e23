// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Localized user-facing reply texts.
//!
//! Spanish is the canonical language of the service; English is kept for
//! users whose profile says so. Failure texts never carry internal detail.

/// Reply language, derived from the user's language tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyLanguage {
    #[default]
    Spanish,
    English,
}

impl ReplyLanguage {
    /// Maps a stored language tag; anything unrecognized falls back to
    /// Spanish.
    pub fn from_tag(tag: &str) -> Self {
        match tag.split(['-', '_']).next().unwrap_or("") {
            "en" => ReplyLanguage::English,
            _ => ReplyLanguage::Spanish,
        }
    }
}

/// Apology for internal failures on the synchronous path.
pub fn technical_difficulties(lang: ReplyLanguage) -> &'static str {
    match lang {
        ReplyLanguage::Spanish => {
            "Lo sentimos, estamos experimentando dificultades técnicas. \
             Por favor, intenta de nuevo en unos momentos."
        }
        ReplyLanguage::English => {
            "Sorry, we are experiencing technical difficulties. \
             Please try again shortly."
        }
    }
}

/// Reply for requests that cannot be processed at all (empty sender or
/// body, malformed payload).
pub fn cannot_process(lang: ReplyLanguage) -> &'static str {
    match lang {
        ReplyLanguage::Spanish => {
            "Lo sentimos, no pudimos procesar tu mensaje. \
             Por favor, revísalo e intenta de nuevo."
        }
        ReplyLanguage::English => {
            "Sorry, we could not process your message. \
             Please check it and try again."
        }
    }
}

/// Phone-axis rate limit reply.
pub fn rate_limited_phone(lang: ReplyLanguage) -> &'static str {
    match lang {
        ReplyLanguage::Spanish => {
            "Has enviado demasiados mensajes en poco tiempo. \
             Por favor, espera un momento antes de escribir de nuevo."
        }
        ReplyLanguage::English => {
            "You have sent too many messages in a short time. \
             Please wait a moment before writing again."
        }
    }
}

/// IP-axis rate limit reply. Distinct wording so an operator can tell the
/// axes apart from logs and screenshots.
pub fn rate_limited_ip(lang: ReplyLanguage) -> &'static str {
    match lang {
        ReplyLanguage::Spanish => {
            "Demasiadas solicitudes desde esta conexión. \
             Por favor, espera un momento e intenta de nuevo."
        }
        ReplyLanguage::English => {
            "Too many requests from this connection. \
             Please wait a moment and try again."
        }
    }
}
