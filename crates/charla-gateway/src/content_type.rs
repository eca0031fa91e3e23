// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content-type gate, the first pipeline stage.

use axum::http::HeaderMap;
use charla_core::CharlaError;

/// The only media type the webhook accepts.
const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Accepts requests whose `Content-Type` contains the form media type.
///
/// Parameterization such as `; charset=utf-8` is permitted. The substring
/// match is byte-exact: the provider sends the lowercase form, and
/// uppercase spellings are rejected.
pub fn check(headers: &HeaderMap) -> Result<(), CharlaError> {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if content_type.contains(FORM_URLENCODED) {
        Ok(())
    } else {
        Err(CharlaError::UnsupportedMedia(format!(
            "expected {FORM_URLENCODED}"
        )))
    }
}
