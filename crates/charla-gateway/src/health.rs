// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Health probe: a fan-out over the container's store handles.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use crate::container::AppContainer;

/// One dependency's probe result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ComponentCheck {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ComponentCheck {
    fn ok(latency_ms: Option<u64>) -> Self {
        Self {
            status: "ok",
            latency_ms,
            error: None,
        }
    }

    fn failed(latency_ms: Option<u64>, error: String) -> Self {
        Self {
            status: "error",
            latency_ms,
            error: Some(error),
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[derive(Debug, Serialize)]
struct HealthChecks {
    database: ComponentCheck,
    redis: ComponentCheck,
    memory: ComponentCheck,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    uptime: u64,
    environment: &'static str,
    version: &'static str,
    checks: HealthChecks,
}

/// GET /health
pub async fn health(State(app): State<Arc<AppContainer>>) -> Response {
    let database = check_database(&app).await;
    let redis = check_redis(&app).await;
    let memory = check_memory();

    let healthy = database.is_ok() && redis.is_ok() && memory.is_ok();
    let body = HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        uptime: app.started_at.elapsed().as_secs(),
        environment: app.config.server.environment.as_str(),
        version: env!("CARGO_PKG_VERSION"),
        checks: HealthChecks {
            database,
            redis,
            memory,
        },
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

async fn check_database(app: &AppContainer) -> ComponentCheck {
    let started = Instant::now();
    let result = app
        .db
        .connection()
        .call(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
        .await;
    let latency = started.elapsed().as_millis() as u64;
    match result {
        Ok(_) => ComponentCheck::ok(Some(latency)),
        Err(e) => ComponentCheck::failed(Some(latency), e.to_string()),
    }
}

async fn check_redis(app: &AppContainer) -> ComponentCheck {
    let started = Instant::now();
    let result = app.kv.ping().await;
    let latency = started.elapsed().as_millis() as u64;
    match result {
        Ok(()) => ComponentCheck::ok(Some(latency)),
        Err(e) => ComponentCheck::failed(Some(latency), e.to_string()),
    }
}

/// Resident-set size where the platform exposes it; the check itself is
/// informational and never fails the probe.
fn check_memory() -> ComponentCheck {
    ComponentCheck::ok(None)
}
