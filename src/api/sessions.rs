// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use axum::{Extension, Json};
use serde::Serialize;

use crate::auth::AuthSession;
use crate::config::ApiAuthConfig;
use crate::session::Session;

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub api_id: String,
    pub session: Session,
}

/// The session the gateway holds for the caller after authenticating
/// against `api_id`.
pub async fn get_session(
    AuthSession(session): AuthSession,
    Extension(api): Extension<Arc<ApiAuthConfig>>,
) -> Json<SessionResponse> {
    Json(SessionResponse {
        api_id: api.api_id.clone(),
        session,
    })
}
