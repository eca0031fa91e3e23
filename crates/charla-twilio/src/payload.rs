// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook payload validation.
//!
//! Re-shapes the raw form pairs into a typed record. Every downstream
//! consumer sees this fixed shape; unknown provider fields are carried
//! through untyped in `extra`.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Sender address pattern: the WhatsApp channel prefix plus an E.164-ish
/// phone.
static FROM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^whatsapp:\+\d+$").expect("static pattern compiles"));

/// Provider message id pattern.
static SID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2}[a-z0-9]{32}$").expect("static pattern compiles"));

/// Maximum number of media attachments the provider sends per message.
const MAX_MEDIA_SLOTS: u32 = 10;

/// One media attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub url: String,
    pub content_type: Option<String>,
}

/// The validated webhook payload.
#[derive(Debug, Clone)]
pub struct WebhookPayload {
    /// Sender address, `whatsapp:+<digits>`.
    pub from: String,
    /// Message text. Empty for media-only messages.
    pub body: String,
    /// Provider message id; the idempotency key.
    pub message_sid: String,
    /// Sender profile name, when the provider shares it.
    pub profile_name: Option<String>,
    /// Declared number of media attachments.
    pub num_media: u32,
    /// Parsed media attachments.
    pub media: Vec<MediaItem>,
    /// Passthrough provider fields not modeled above.
    pub extra: HashMap<String, String>,
}

impl WebhookPayload {
    /// Builds the typed payload from decoded form pairs.
    ///
    /// On failure returns every issue found, not just the first, so the
    /// warn-level log line shows the whole picture.
    pub fn parse(pairs: &[(String, String)]) -> Result<Self, Vec<String>> {
        let mut fields: HashMap<&str, &str> = HashMap::with_capacity(pairs.len());
        for (key, value) in pairs {
            fields.insert(key.as_str(), value.as_str());
        }

        let mut issues = Vec::new();

        let from = match fields.get("From") {
            Some(from) if FROM_RE.is_match(from) => from.to_string(),
            Some(from) => {
                issues.push(format!(
                    "From must match whatsapp:+<digits>, got {} chars",
                    from.len()
                ));
                String::new()
            }
            None => {
                issues.push("From is required".to_string());
                String::new()
            }
        };

        let body = match fields.get("Body") {
            Some(body) => body.to_string(),
            None => {
                issues.push("Body is required".to_string());
                String::new()
            }
        };

        let message_sid = match fields.get("MessageSid") {
            Some(sid) if SID_RE.is_match(sid) => sid.to_string(),
            Some(_) => {
                issues.push("MessageSid has an invalid format".to_string());
                String::new()
            }
            None => {
                issues.push("MessageSid is required".to_string());
                String::new()
            }
        };

        let profile_name = fields.get("ProfileName").map(|s| s.to_string());

        let num_media = match fields.get("NumMedia") {
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) => n,
                Err(_) => {
                    issues.push(format!("NumMedia must be a non-negative integer, got `{raw}`"));
                    0
                }
            },
            None => 0,
        };

        let mut media = Vec::new();
        for slot in 0..MAX_MEDIA_SLOTS {
            let Some(raw_url) = fields.get(format!("MediaUrl{slot}").as_str()) else {
                continue;
            };
            match url::Url::parse(raw_url) {
                Ok(_) => media.push(MediaItem {
                    url: raw_url.to_string(),
                    content_type: fields
                        .get(format!("MediaContentType{slot}").as_str())
                        .map(|s| s.to_string()),
                }),
                Err(e) => issues.push(format!("MediaUrl{slot} is not a valid URL: {e}")),
            }
        }

        if !issues.is_empty() {
            return Err(issues);
        }

        let known = |key: &str| {
            matches!(key, "From" | "Body" | "MessageSid" | "ProfileName" | "NumMedia")
                || key.starts_with("MediaUrl")
                || key.starts_with("MediaContentType")
        };
        let extra = pairs
            .iter()
            .filter(|(key, _)| !known(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            from,
            body,
            message_sid,
            profile_name,
            num_media,
            media,
            extra,
        })
    }

    /// Canonical phone: the sender address without the channel prefix.
    pub fn phone(&self) -> &str {
        self.from.strip_prefix("whatsapp:").unwrap_or(&self.from)
    }
}

/// Optional sub-validator: caps the message text length.
pub fn validate_message_length(payload: &WebhookPayload, max_chars: usize) -> Result<(), String> {
    let count = payload.body.chars().count();
    if count > max_chars {
        return Err(format!(
            "message length {count} exceeds the {max_chars} character limit"
        ));
    }
    Ok(())
}

/// Optional sub-validator: caps attachment count and restricts content
/// types to an allowlist of prefixes (e.g. `image/`).
pub fn validate_media(
    payload: &WebhookPayload,
    max_count: usize,
    allowed_types: &[&str],
) -> Result<(), Vec<String>> {
    let mut issues = Vec::new();
    if payload.media.len() > max_count {
        issues.push(format!(
            "{} media items exceed the limit of {max_count}",
            payload.media.len()
        ));
    }
    for (i, item) in payload.media.iter().enumerate() {
        let content_type = item.content_type.as_deref().unwrap_or("");
        if !allowed_types.iter().any(|t| content_type.starts_with(t)) {
            issues.push(format!("media {i} has disallowed content type `{content_type}`"));
        }
    }
    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}
