// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Lookups of existing keys named by a token.
//!
//! Two features reuse sessions created ahead of time for a key:
//!
//! - An API without a key source verifies every token with the secret
//!   stored on the session of the key the token names. That session is the
//!   caller's session as-is.
//! - An API with a client id base field lets the token name a client key;
//!   the client key's policies apply when the token carries none.

use super::claims::{TokenClaims, TokenHeader};
use super::error::AuthError;
use crate::config::ApiAuthConfig;
use crate::session::{Session, SessionStore};

/// Key id a token uses to name its key.
///
/// Order: the header `kid` (unless the API skips it), the identity base
/// field, then `sub`. Claims here are unverified.
pub fn key_id<'a>(
    api: &ApiAuthConfig,
    header: &'a TokenHeader,
    claims: &'a TokenClaims,
) -> Result<&'a str, AuthError> {
    if !api.skip_kid {
        if let Ok(kid) = header.kid_str() {
            if !kid.is_empty() {
                return Ok(kid);
            }
        }
    }

    if !api.identity_base_field.is_empty() {
        if let Some(id) = claims
            .get_str(&api.identity_base_field)
            .filter(|id| !id.is_empty())
        {
            return Ok(id);
        }
    }

    claims
        .get_str("sub")
        .filter(|id| !id.is_empty())
        .ok_or(AuthError::NoSuitableUserIdClaim)
}

/// Load the session of an existing key.
pub async fn load_key(
    api: &ApiAuthConfig,
    key_id: &str,
    sessions: &dyn SessionStore,
) -> Result<Session, AuthError> {
    match sessions.get(&api.org_id, key_id).await? {
        Some(session) => Ok(session),
        None => {
            tracing::debug!(api_id = %api.api_id, key_id, "No session for key named by token");
            Err(AuthError::KeyNotFound)
        }
    }
}

/// Policies of the client key named by the client id base field.
///
/// `None` when the API has no client id base field or the token does not
/// carry it. A named key that does not exist, or that has no policies, is
/// an error.
pub async fn client_policies(
    api: &ApiAuthConfig,
    claims: &TokenClaims,
    sessions: &dyn SessionStore,
) -> Result<Option<Vec<String>>, AuthError> {
    if api.client_id_base_field.is_empty() {
        return Ok(None);
    }
    let Some(client_id) = claims
        .get_str(&api.client_id_base_field)
        .filter(|id| !id.is_empty())
    else {
        return Ok(None);
    };

    let client = load_key(api, client_id, sessions).await?;
    if client.apply_policies.is_empty() {
        return Err(AuthError::NoBoundPolicy);
    }
    Ok(Some(client.apply_policies))
}
