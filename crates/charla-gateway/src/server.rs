// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Router assembly: routes, security headers, and CORS.

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::container::AppContainer;
use crate::{health, webhook};

/// Builds the application router.
///
/// The pipeline stages run inside the webhook route only; the health
/// endpoint is a plain fan-out. Security headers are attached to every
/// response.
pub fn router(app: Arc<AppContainer>) -> Router {
    let cors = cors_layer(&app);

    Router::new()
        .route("/webhook/whatsapp", post(webhook::whatsapp_webhook))
        .route("/health", get(health::health))
        .with_state(app)
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains; preload"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(
                "default-src 'self'; object-src 'none'; frame-src 'none'",
            ),
        ))
}

/// CORS whitelist from configuration. An empty list allows no browser
/// origins, which is the production stance for a webhook service.
fn cors_layer(app: &AppContainer) -> CorsLayer {
    let origins: Vec<HeaderValue> = app
        .config
        .server
        .origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}
