// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TwiML reply serialization.
//!
//! The reply grammar is a `Response` root with zero or more `Message`
//! children; the gateway only ever emits exactly one.

/// Serializes a single-message reply document.
pub fn message_response(text: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{}</Message></Response>",
        escape_xml(text)
    )
}

/// An empty reply document (acknowledge without answering).
pub fn empty_response() -> String {
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response></Response>".to_string()
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_response_wraps_text() {
        let xml = message_response("Hola, ¿en qué puedo ayudarte?");
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>"));
        assert!(xml.contains("Hola, ¿en qué puedo ayudarte?"));
        assert!(xml.ends_with("</Message></Response>"));
    }

    #[test]
    fn special_characters_are_escaped() {
        let xml = message_response("a < b & c > \"d\" 'e'");
        assert!(xml.contains("a &lt; b &amp; c &gt; &quot;d&quot; &apos;e&apos;"));
        assert!(!xml.contains("< b"));
    }

    #[test]
    fn empty_response_has_no_message() {
        let xml = empty_response();
        assert!(xml.contains("<Response></Response>"));
        assert!(!xml.contains("<Message>"));
    }

    #[test]
    fn prolog_declares_utf8() {
        assert!(message_response("x").starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    }
}
