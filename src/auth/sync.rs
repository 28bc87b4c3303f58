// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session synchronisation.
//!
//! Reconciles a freshly resolved policy set with whatever session already
//! exists for the caller. Usage counters for APIs that stay granted with a
//! limit are carried over so that re-authenticating never resets a
//! caller's remaining quota.
//!
//! Sessions are written at most once per request, and only if something
//! changed.

use std::sync::Arc;
use std::time::Duration;

use super::claims::TokenClaims;
use super::error::AuthError;
use super::identity::{oauth_client_id, session_key};
use super::policies::PolicyResolution;
use super::temporal::timestamp;
use crate::config::ApiAuthConfig;
use crate::policy::PolicyStore;
use crate::session::{Session, SessionStore};

/// Merges resolved policies into persisted sessions.
#[derive(Clone)]
pub struct SessionSynchronizer {
    sessions: Arc<dyn SessionStore>,
    policies: Arc<dyn PolicyStore>,
}

impl SessionSynchronizer {
    pub fn new(sessions: Arc<dyn SessionStore>, policies: Arc<dyn PolicyStore>) -> Self {
        Self { sessions, policies }
    }

    /// Load, merge and persist the session for `identity` under `api`.
    pub async fn sync(
        &self,
        api: &ApiAuthConfig,
        identity: &str,
        resolution: &PolicyResolution,
        claims: &TokenClaims,
        now: i64,
    ) -> Result<Session, AuthError> {
        let key = session_key(&api.org_id, identity);
        let previous = self.sessions.get(&api.org_id, &key).await?;

        let mut session = Session::new(api.org_id.clone(), identity);
        if let Some(previous) = &previous {
            session.meta_data = previous.meta_data.clone();
            session.oauth_client_id = previous.oauth_client_id.clone();
            session.jwt_data = previous.jwt_data.clone();
            carry_over_counters(previous, &mut session);
        }

        self.policies
            .apply_policies(&mut session, &resolution.policy_ids, now)
            .await?;

        if api.idp_client_id_mapping_disabled {
            session.oauth_client_id.clear();
        } else if let Some(client_id) = oauth_client_id(claims) {
            session.oauth_client_id = client_id.to_string();
        }

        session.expires = match timestamp(claims, "exp")? {
            Some(exp) => exp,
            None => self
                .policy_expiry(&resolution.policy_ids, previous.as_ref(), now)
                .await?,
        };

        if previous.as_ref() == Some(&session) {
            tracing::debug!(api_id = %api.api_id, "Session unchanged, skipping write");
            return Ok(session);
        }

        let ttl = (session.expires > 0)
            .then(|| Duration::from_secs(session.expires.saturating_sub(now).max(1) as u64));
        self.sessions.put(&api.org_id, &key, &session, ttl).await?;

        tracing::debug!(
            api_id = %api.api_id,
            provenance = ?resolution.provenance,
            policies = ?session.apply_policies,
            "Session updated"
        );
        Ok(session)
    }

    /// Session expiry from the longest `key_expires_in` of the policies.
    ///
    /// An unexpired previous expiry is kept so repeated requests do not keep
    /// pushing it out.
    async fn policy_expiry(
        &self,
        ids: &[String],
        previous: Option<&Session>,
        now: i64,
    ) -> Result<i64, AuthError> {
        let policies = self.policies.policies(ids).await?;
        let lifetime = policies
            .iter()
            .map(|p| p.key_expires_in)
            .max()
            .unwrap_or(0);
        if lifetime <= 0 {
            return Ok(0);
        }

        match previous {
            Some(previous) if previous.expires > now => Ok(previous.expires),
            _ => Ok(now.saturating_add(lifetime)),
        }
    }
}

/// Copy the previous session's counters onto `session`.
///
/// Policy application then keeps them only for APIs that are still granted
/// with a limit, and drops everything else.
fn carry_over_counters(previous: &Session, session: &mut Session) {
    session.access_rights = previous
        .access_rights
        .iter()
        .filter(|(_, access)| access.limit.is_some())
        .map(|(api_id, access)| (api_id.clone(), access.clone()))
        .collect();
}
