// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

/// Health check response with individual component status.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    pub checks: HealthChecks,
}

/// Individual health check results.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub service: String,
    /// Number of API definitions loaded.
    pub apis: usize,
    /// Number of APIs with cached remote key sets.
    pub cached_key_sets: usize,
}

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Readiness handler.
///
/// Returns 503 until at least one API definition is loaded.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let apis = state.apis.len().await;
    let ready = apis > 0;

    let response = ReadyResponse {
        status: if ready { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            apis,
            cached_key_sets: state.authenticator.keys().cache().len(),
        },
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

/// Liveness probe handler. Always 200 while the process is running.
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
