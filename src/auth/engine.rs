// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The authentication decision for one request.
//!
//! ```text
//! Authorization header
//!   -> TokenHeader          (parse)
//!   -> KeyResolver          (key for alg/kid)
//!   -> verify_signature     (claims)
//!   -> temporal validation  (exp/iat/nbf with skew)
//!   -> identity extraction  (session key)
//!   -> policy resolution    (claim / client key / scope / default)
//!   -> SessionSynchronizer  (merge + persist)
//! ```
//!
//! An API with no key source takes a shorter path: the token names an
//! existing key, the secret on that key's session verifies the token, and
//! the stored session is returned unchanged.
//!
//! The engine never writes a response; callers render [`AuthError`] with
//! its status code.

use std::sync::Arc;

use chrono::Utc;

use super::claims::{TokenClaims, TokenHeader};
use super::error::AuthError;
use super::identity::extract_identity;
use super::key_session::{key_id, load_key};
use super::keys::{key_from_secret, verify_signature, KeyResolver};
use super::policies::resolve_policies;
use super::sync::SessionSynchronizer;
use super::temporal::validate_temporal_claims;
use crate::config::ApiAuthConfig;
use crate::policy::PolicyStore;
use crate::session::{Session, SessionStore};

/// JWT authenticator shared by all requests.
#[derive(Clone)]
pub struct JwtAuthenticator {
    keys: KeyResolver,
    policies: Arc<dyn PolicyStore>,
    sessions: Arc<dyn SessionStore>,
    sync: SessionSynchronizer,
}

impl JwtAuthenticator {
    pub fn new(
        keys: KeyResolver,
        sessions: Arc<dyn SessionStore>,
        policies: Arc<dyn PolicyStore>,
    ) -> Self {
        Self {
            keys,
            sync: SessionSynchronizer::new(sessions.clone(), policies.clone()),
            sessions,
            policies,
        }
    }

    pub fn keys(&self) -> &KeyResolver {
        &self.keys
    }

    /// Authenticate a request carrying `authorization` against `api`.
    pub async fn authenticate(
        &self,
        authorization: Option<&str>,
        api: &ApiAuthConfig,
    ) -> Result<Session, AuthError> {
        self.authenticate_at(authorization, api, Utc::now().timestamp())
            .await
    }

    /// [`authenticate`](Self::authenticate) with an explicit clock.
    pub async fn authenticate_at(
        &self,
        authorization: Option<&str>,
        api: &ApiAuthConfig,
        now: i64,
    ) -> Result<Session, AuthError> {
        let result = self.decide(authorization, api, now).await;
        match &result {
            Ok(session) => tracing::debug!(
                api_id = %api.api_id,
                policies = ?session.apply_policies,
                "JWT authenticated"
            ),
            Err(e) => tracing::warn!(
                api_id = %api.api_id,
                error_code = e.error_code(),
                error = %e,
                "JWT rejected"
            ),
        }
        result
    }

    async fn decide(
        &self,
        authorization: Option<&str>,
        api: &ApiAuthConfig,
        now: i64,
    ) -> Result<Session, AuthError> {
        let token = bearer_token(authorization)?;
        let header = TokenHeader::parse(token)?;
        if !api.has_key_source() {
            return self.decide_with_key_secret(token, &header, api, now).await;
        }

        let key = self.keys.resolve(api, &header).await?;
        let claims = verify_signature(token, &key)?;

        validate_temporal_claims(&claims, &api.claim_skew, now)?;

        let identity = extract_identity(&claims, &api.identity_base_field)?;
        let resolution = resolve_policies(
            api,
            &claims,
            self.policies.as_ref(),
            self.sessions.as_ref(),
        )
        .await?;

        self.sync
            .sync(api, &identity, &resolution, &claims, now)
            .await
    }

    /// Verify with the secret of the key the token names.
    async fn decide_with_key_secret(
        &self,
        token: &str,
        header: &TokenHeader,
        api: &ApiAuthConfig,
        now: i64,
    ) -> Result<Session, AuthError> {
        let unverified = TokenClaims::peek(token)?;
        let key_id = key_id(api, header, &unverified)?;
        let session = load_key(api, key_id, self.sessions.as_ref()).await?;

        let key = key_from_secret(api, header, &session.jwt_data.secret)?;
        let claims = verify_signature(token, &key)?;
        validate_temporal_claims(&claims, &api.claim_skew, now)?;
        Ok(session)
    }
}

/// Extract the raw token, stripping one optional `Bearer ` prefix.
fn bearer_token(authorization: Option<&str>) -> Result<&str, AuthError> {
    let value = authorization
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingAuthHeader)?;

    let token = match value.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => value[7..].trim(),
        _ => value,
    };
    if token.is_empty() {
        return Err(AuthError::MissingAuthHeader);
    }
    Ok(token)
}
