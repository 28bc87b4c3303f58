// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{middleware::from_fn_with_state, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth::jwt_auth_middleware, state::AppState};

pub mod health;
pub mod sessions;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/apis/{api_id}/session", get(sessions::get_session))
        .route_layer(from_fn_with_state(state.clone(), jwt_auth_middleware));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header::AUTHORIZATION, Request, StatusCode},
        response::Response,
    };
    use chrono::Utc;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::testutil::{rsa_api, sign_rs256, CountingFetcher};
    use crate::auth::{JwtAuthenticator, KeyCache, KeyResolver};
    use crate::config::ApiAuthConfig;
    use crate::policy::{InMemoryPolicyStore, Policy, PolicyGrant};
    use crate::session::InMemorySessionStore;
    use crate::state::ApiRegistry;

    fn state_with(apis: Vec<ApiAuthConfig>) -> AppState {
        let keys = KeyResolver::new(
            Arc::new(KeyCache::default()),
            Arc::new(CountingFetcher::new()),
        );
        let policies = Arc::new(InMemoryPolicyStore::with_policies([Policy {
            id: "gold".into(),
            access_rights: [("api1".to_string(), PolicyGrant::default())]
                .into_iter()
                .collect(),
            quota_max: 1000,
            quota_renewal_rate: 3600,
            ..Default::default()
        }]));
        let authenticator =
            JwtAuthenticator::new(keys, Arc::new(InMemorySessionStore::new()), policies);
        AppState::new(authenticator, ApiRegistry::from_configs(apis))
    }

    fn api() -> ApiAuthConfig {
        ApiAuthConfig {
            policy_field_name: "pol".into(),
            ..rsa_api("api1")
        }
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_is_degraded_without_apis() {
        let response = router(state_with(vec![]))
            .oneshot(get("/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["status"], "degraded");
    }

    #[tokio::test]
    async fn health_reports_loaded_apis() {
        let response = router(state_with(vec![api()]))
            .oneshot(get("/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["checks"]["apis"], 1);
    }

    #[tokio::test]
    async fn liveness_needs_no_auth() {
        let response = router(state_with(vec![]))
            .oneshot(get("/health/live"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn session_route_requires_auth() {
        let response = router(state_with(vec![api()]))
            .oneshot(get("/apis/api1/session"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn session_route_returns_applied_policies() {
        let token = sign_rs256(
            None,
            json!({"sub": "bob", "pol": "gold", "exp": Utc::now().timestamp() + 600}),
        );
        let request = Request::builder()
            .uri("/apis/api1/session")
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();

        let response = router(state_with(vec![api()])).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["api_id"], "api1");
        assert_eq!(body["session"]["identity"], "bob");
        assert_eq!(body["session"]["apply_policies"], json!(["gold"]));
        assert_eq!(
            body["session"]["access_rights"]["api1"]["limit"]["quota_remaining"],
            1000
        );
    }
}
