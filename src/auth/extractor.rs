// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for the session established by [`jwt_auth_middleware`].
//!
//! ```rust,ignore
//! async fn my_handler(AuthSession(session): AuthSession) -> impl IntoResponse {
//!     // session.identity, session.apply_policies, ...
//! }
//! ```
//!
//! [`jwt_auth_middleware`]: super::middleware::jwt_auth_middleware

use axum::{extract::FromRequestParts, http::request::Parts};

use super::AuthError;
use crate::session::Session;

/// The authenticated caller's session.
///
/// Rejects with [`AuthError::MissingAuthHeader`] if the route is not behind
/// the JWT middleware.
pub struct AuthSession(pub Session);

impl<S: Send + Sync> FromRequestParts<S> for AuthSession {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .map(AuthSession)
            .ok_or(AuthError::MissingAuthHeader)
    }
}

/// Like [`AuthSession`], but yields `None` instead of rejecting.
pub struct OptionalSession(pub Option<Session>);

impl<S: Send + Sync> FromRequestParts<S> for OptionalSession {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalSession(parts.extensions.get::<Session>().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts() -> Parts {
        Request::builder()
            .uri("/test")
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[tokio::test]
    async fn auth_session_requires_middleware() {
        let mut parts = parts();
        let result = AuthSession::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AuthError::MissingAuthHeader)));
    }

    #[tokio::test]
    async fn auth_session_reads_extensions() {
        let mut parts = parts();
        parts.extensions.insert(Session::new("org1", "user_from_middleware"));

        let AuthSession(session) = AuthSession::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(session.identity, "user_from_middleware");
    }

    #[tokio::test]
    async fn optional_session_returns_none_without_session() {
        let mut parts = parts();
        let result = OptionalSession::from_request_parts(&mut parts, &()).await;
        assert!(result.unwrap().0.is_none());
    }
}
