// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Internal endpoints: health and Prometheus exposition.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::warn;

use crate::state::AppState;

/// Health check response with individual component status.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct HealthResponse {
    /// Overall status ("pass" or "fail").
    pub status: &'static str,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct HealthChecks {
    /// Key-set status; only present when authentication is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks: Option<&'static str>,
}

/// Check if the key set is available.
async fn check_jwks(state: &AppState) -> Option<&'static str> {
    let jwks = state.jwks.as_ref()?;
    if jwks.is_cached().await {
        return Some("pass");
    }
    match jwks.refresh().await {
        Ok(()) => Some("pass"),
        Err(err) => {
            warn!(endpoint = jwks.endpoint(), error = %err, "health check: key set unavailable");
            Some("fail")
        }
    }
}

/// Returns 200 if all checks pass, 500 otherwise.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let jwks = check_jwks(&state).await;
    let ok = jwks != Some("fail");

    let response = HealthResponse {
        status: if ok { "pass" } else { "fail" },
        checks: HealthChecks { jwks },
    };
    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (status, Json(response))
}

/// Prometheus text exposition of the recorded metrics.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.prometheus {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            String::new(),
        ),
    }
}

pub fn internal_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}
