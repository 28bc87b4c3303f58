// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication middleware for Axum.
//!
//! Applied with `route_layer` to routes carrying an `{api_id}` path segment.
//! The API definition is looked up in the registry, the request's
//! `Authorization` header is run through the [`JwtAuthenticator`], and on
//! success the resulting [`Session`] and the API definition are inserted
//! into the request extensions for handlers to pick up.
//!
//! ```rust,ignore
//! let protected = Router::new()
//!     .route("/apis/{api_id}/session", get(handler))
//!     .route_layer(axum::middleware::from_fn_with_state(state.clone(), jwt_auth_middleware));
//! ```
//!
//! [`JwtAuthenticator`]: super::JwtAuthenticator
//! [`Session`]: crate::session::Session

use std::collections::HashMap;

use axum::{
    extract::{Path, Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::AuthError;
use crate::error::ApiError;
use crate::state::AppState;

/// Path parameter naming the API being called.
pub const API_ID_PARAM: &str = "api_id";

/// Authenticate the request against the API named in its path.
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(api_id) = params.get(API_ID_PARAM) else {
        return ApiError::not_found("API not found").into_response();
    };
    let Some(api) = state.apis.get(api_id).await else {
        return ApiError::not_found(format!("API {api_id} not found")).into_response();
    };

    let authorization = match request.headers().get(AUTHORIZATION) {
        Some(value) => match value.to_str() {
            Ok(s) => Some(s),
            Err(_) => return AuthError::MalformedToken.into_response(),
        },
        None => None,
    };

    match state.authenticator.authenticate(authorization, &api).await {
        Ok(session) => {
            request.extensions_mut().insert(session);
            request.extensions_mut().insert(api);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        routing::get,
        Extension, Router,
    };
    use chrono::Utc;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::extractor::AuthSession;
    use crate::auth::testutil::{rsa_api, sign_rs256, CountingFetcher};
    use crate::auth::{JwtAuthenticator, KeyCache, KeyResolver};
    use crate::config::ApiAuthConfig;
    use crate::policy::{InMemoryPolicyStore, Policy};
    use crate::session::InMemorySessionStore;
    use crate::state::ApiRegistry;

    fn test_state() -> AppState {
        let keys = KeyResolver::new(
            Arc::new(KeyCache::default()),
            Arc::new(CountingFetcher::new()),
        );
        let policies = Arc::new(InMemoryPolicyStore::with_policies([Policy {
            id: "default".into(),
            ..Default::default()
        }]));
        let authenticator =
            JwtAuthenticator::new(keys, Arc::new(InMemorySessionStore::new()), policies);
        let api = ApiAuthConfig {
            default_policies: vec!["default".into()],
            ..rsa_api("api1")
        };
        AppState::new(authenticator, ApiRegistry::from_configs([api]))
    }

    async fn whoami(
        AuthSession(session): AuthSession,
        Extension(api): Extension<Arc<ApiAuthConfig>>,
    ) -> String {
        format!("{}@{}", session.identity, api.api_id)
    }

    fn app() -> Router {
        let state = test_state();
        Router::new()
            .route("/apis/{api_id}/whoami", get(whoami))
            .route_layer(axum::middleware::from_fn_with_state(state.clone(), jwt_auth_middleware))
            .with_state(state)
    }

    fn request(path: &str, authorization: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn valid_token_reaches_handler() {
        let token = sign_rs256(
            None,
            json!({"sub": "alice", "exp": Utc::now().timestamp() + 3600}),
        );
        let response = app()
            .oneshot(request("/apis/api1/whoami", Some(&format!("Bearer {token}"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"alice@api1");
    }

    #[tokio::test]
    async fn missing_auth_returns_400() {
        let response = app()
            .oneshot(request("/apis/api1/whoami", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            json!({"error": "Authorization field missing", "error_code": "missing_auth_header"})
        );
    }

    #[tokio::test]
    async fn expired_token_returns_401() {
        let token = sign_rs256(None, json!({"sub": "alice", "exp": 1}));
        let response = app()
            .oneshot(request("/apis/api1/whoami", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn garbage_token_returns_403() {
        let response = app()
            .oneshot(request("/apis/api1/whoami", Some("Bearer not-a-jwt")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn unknown_api_returns_404() {
        let response = app()
            .oneshot(request("/apis/nope/whoami", Some("Bearer x")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
