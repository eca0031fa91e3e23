// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The inbound webhook route.
//!
//! Runs the pipeline stages in a fixed order — content-type gate,
//! signature verifier, rate limiter, payload validator — and then the
//! conversation flow: upsert user and conversation, append the user turn
//! idempotently, assemble the context window, request the completion, and
//! persist the assistant turn before answering with TwiML.
//!
//! Any failure after validation produces a status-200 apology document;
//! internals go to the structured log only.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, request::Parts, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use charla_core::{CharlaError, MessageRole};
use charla_security::hash_value;
use charla_twilio::{
    payload::validate_message_length, replies, twiml, ReplyLanguage, WebhookPayload,
};
use serde_json::json;
use tracing::{error, info, warn};

use crate::container::AppContainer;
use crate::content_type;
use crate::rate_limit::{LimitScope, RateLimiter, RateOutcome};

/// Upper bound on the form body; provider payloads are a few KB.
const MAX_BODY_SIZE: usize = 100 * 1024;

/// Maximum accepted message text length.
const MAX_MESSAGE_CHARS: usize = 4096;

/// The signature header the provider sends.
const SIGNATURE_HEADER: &str = "x-twilio-signature";

/// POST /webhook/whatsapp
pub async fn whatsapp_webhook(
    State(app): State<Arc<AppContainer>>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();

    // Stage 1: content-type gate.
    if content_type::check(&parts.headers).is_err() {
        return unsupported_media_response();
    }

    let bytes = match axum::body::to_bytes(body, MAX_BODY_SIZE).await {
        Ok(bytes) => bytes,
        Err(_) => return cannot_process_response(StatusCode::BAD_REQUEST, &[]),
    };
    let pairs = parse_form(&bytes);

    // Stage 2: signature verifier. Mandatory outside development.
    if !app.dev_mode() {
        if let Err(e) = verify_signature(&app, &parts, &pairs) {
            warn!(error = %e, "webhook signature rejected");
            return forbidden_response();
        }
    }

    // Stage 3: dual-axis rate limiter.
    let phone = form_value(&pairs, "From")
        .map(|from| from.strip_prefix("whatsapp:").unwrap_or(from).to_string())
        .unwrap_or_default();
    let phone_hash = hash_value(&phone, &app.config.privacy.hash_salt);
    let client_ip = client_ip(&app, &parts);

    let limiter = RateLimiter::new(app.kv.clone(), app.config.rate_limit.clone());
    let outcome = limiter.check(&phone_hash, &client_ip).await;
    match outcome.limited {
        Some(LimitScope::Phone) => {
            info!(phone = %phone_hash, "phone rate limit exceeded");
            return rate_limited_response(&outcome, LimitScope::Phone);
        }
        Some(LimitScope::Ip) => {
            info!(client_ip = %client_ip, "ip rate limit exceeded");
            return rate_limited_response(&outcome, LimitScope::Ip);
        }
        None => {}
    }

    // Stage 4: payload validator.
    let payload = match WebhookPayload::parse(&pairs) {
        Ok(payload) => payload,
        Err(issues) => {
            warn!(issues = ?issues, "webhook payload rejected");
            return cannot_process_response(StatusCode::BAD_REQUEST, &outcome.headers);
        }
    };
    if let Err(issue) = validate_message_length(&payload, MAX_MESSAGE_CHARS) {
        warn!(issue = %issue, "webhook payload rejected");
        return cannot_process_response(StatusCode::BAD_REQUEST, &outcome.headers);
    }

    // Early-return rule: nothing to answer without a sender and a body.
    if payload.phone().is_empty() || payload.body.trim().is_empty() {
        return xml_response(
            StatusCode::OK,
            twiml::message_response(replies::cannot_process(ReplyLanguage::default())),
            &outcome.headers,
        );
    }

    // The conversation flow; any error collapses into the apology reply.
    let reply_text = match process_message(&app, &payload).await {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, phone = %phone_hash, "webhook processing failed");
            replies::technical_difficulties(ReplyLanguage::default()).to_string()
        }
    };

    xml_response(
        StatusCode::OK,
        twiml::message_response(&reply_text),
        &outcome.headers,
    )
}

/// Steps 3–7 of the conversation flow. Errors propagate to the caller,
/// which owns the apology envelope.
async fn process_message(
    app: &AppContainer,
    payload: &WebhookPayload,
) -> Result<String, CharlaError> {
    let (conversation, user) = app
        .conversations
        .get_or_create(payload.phone(), payload.profile_name.as_deref())
        .await?;

    // Redelivery of an already-answered SID: repeat the answer instead of
    // producing a second assistant turn.
    if app.messages.exists(&payload.message_sid).await? {
        let window = app.messages.recent_context(&conversation.id).await?;
        if let Some(previous) = window
            .iter()
            .rev()
            .find(|entry| entry.role == MessageRole::Assistant)
        {
            info!(
                conversation_id = %conversation.id,
                user_id = %user.id,
                "duplicate provider SID, repeating previous reply"
            );
            return Ok(previous.content.clone());
        }
    }

    app.messages
        .save_user(&conversation.id, &payload.body, Some(&payload.message_sid))
        .await?;

    let window = app.messages.recent_context(&conversation.id).await?;
    let completion = match app.llm.complete_with_metrics(&window).await {
        Ok(completion) => completion,
        Err(e) => {
            error!(
                conversation_id = %conversation.id,
                user_id = %user.id,
                error = %e,
                "completion failed"
            );
            return Err(e);
        }
    };

    app.messages
        .save_assistant(
            &conversation.id,
            &completion.content,
            Some(i64::from(completion.tokens_used)),
            Some(completion.latency_ms),
        )
        .await?;

    info!(
        conversation_id = %conversation.id,
        user_id = %user.id,
        tokens_used = completion.tokens_used,
        latency_ms = completion.latency_ms,
        stop_reason = ?completion.stop_reason,
        "turn completed"
    );

    Ok(completion.content)
}

/// Reconstructs the signed URL and checks the signature header.
fn verify_signature(
    app: &AppContainer,
    parts: &Parts,
    pairs: &[(String, String)],
) -> Result<(), CharlaError> {
    let verifier = app
        .verifier
        .as_ref()
        .ok_or_else(|| CharlaError::Unauthenticated("no auth token configured".into()))?;

    let signature = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| CharlaError::Unauthenticated("missing signature header".into()))?;

    verifier.verify(&full_url(app, parts), pairs, signature)
}

/// The full request URL as the provider signed it:
/// `scheme://host + original_uri` (query string included).
fn full_url(app: &AppContainer, parts: &Parts) -> String {
    let scheme = if app.config.server.trust_proxy {
        parts
            .headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("https")
    } else {
        "http"
    };
    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{scheme}://{host}{}", parts.uri)
}

/// Client IP: the upstream proxy's header when trusted, else the socket
/// peer address.
fn client_ip(app: &AppContainer, parts: &Parts) -> String {
    if app.config.server.trust_proxy {
        if let Some(forwarded) = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
        {
            if let Some(first) = forwarded.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
    }
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Decodes the form body into ordered key/value pairs.
fn parse_form(bytes: &Bytes) -> Vec<(String, String)> {
    url::form_urlencoded::parse(bytes).into_owned().collect()
}

fn form_value<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn unsupported_media_response() -> Response {
    (
        StatusCode::UNSUPPORTED_MEDIA_TYPE,
        Json(json!({
            "error": "Unsupported Media Type",
            "message": "Expected application/x-www-form-urlencoded",
        })),
    )
        .into_response()
}

fn forbidden_response() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "error": "Forbidden",
            "message": "Access denied",
        })),
    )
        .into_response()
}

fn rate_limited_response(outcome: &RateOutcome, scope: LimitScope) -> Response {
    let text = match scope {
        LimitScope::Phone => replies::rate_limited_phone(ReplyLanguage::default()),
        LimitScope::Ip => replies::rate_limited_ip(ReplyLanguage::default()),
    };
    xml_response(
        StatusCode::TOO_MANY_REQUESTS,
        twiml::message_response(text),
        &outcome.headers,
    )
}

fn cannot_process_response(status: StatusCode, headers: &[(&'static str, String)]) -> Response {
    xml_response(
        status,
        twiml::message_response(replies::cannot_process(ReplyLanguage::default())),
        headers,
    )
}

/// A `text/xml` response with the rate-limit headers attached.
fn xml_response(
    status: StatusCode,
    body: String,
    rate_headers: &[(&'static str, String)],
) -> Response {
    let mut response = (status, body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/xml"));
    for (name, value) in rate_headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(*name),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    response
}
