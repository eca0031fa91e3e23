// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook signature verification.
//!
//! Twilio signs each webhook with HMAC-SHA1 over the full request URL
//! followed by the sorted body parameters, each key immediately followed
//! by its value, base64-encoded into the `X-Twilio-Signature` header.
//! Verification uses `Mac::verify_slice`, which compares in constant time.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use charla_core::CharlaError;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Verifier bound to one auth token.
#[derive(Clone)]
pub struct SignatureVerifier {
    auth_token: SecretString,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("auth_token", &"[redacted]")
            .finish()
    }
}

impl SignatureVerifier {
    pub fn new(auth_token: SecretString) -> Self {
        Self { auth_token }
    }

    /// Computes the expected signature for `url` and the form `params`.
    ///
    /// Exposed so tests and local tooling can produce valid requests.
    pub fn sign(&self, url: &str, params: &[(String, String)]) -> String {
        let mut mac = self.mac();
        mac.update(canonical_string(url, params).as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    /// Verifies a signature header against the reconstructed canonical
    /// string. Any failure — bad base64, wrong length, mismatch — is the
    /// same `Unauthenticated` error.
    pub fn verify(
        &self,
        url: &str,
        params: &[(String, String)],
        signature_header: &str,
    ) -> Result<(), CharlaError> {
        let provided = BASE64
            .decode(signature_header)
            .map_err(|_| CharlaError::Unauthenticated("malformed signature header".into()))?;

        let mut mac = self.mac();
        mac.update(canonical_string(url, params).as_bytes());
        mac.verify_slice(&provided)
            .map_err(|_| CharlaError::Unauthenticated("signature mismatch".into()))
    }

    fn mac(&self) -> HmacSha1 {
        HmacSha1::new_from_slice(self.auth_token.expose_secret().as_bytes())
            .expect("HMAC accepts keys of any length")
    }
}

/// The signable string: full request URL, then each body key in sorted
/// order immediately followed by its value.
fn canonical_string(url: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = String::with_capacity(url.len() + params.len() * 16);
    out.push_str(url);
    for (key, value) in sorted {
        out.push_str(key);
        out.push_str(value);
    }
    out
}
