// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Caller identity derivation.

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::claims::TokenClaims;
use super::error::AuthError;

/// Claims checked, in order, for the OAuth client id.
const OAUTH_CLIENT_ID_CLAIMS: [&str; 3] = ["clientId", "cid", "client_id"];

/// Derive the caller identity from `claims`.
///
/// A non-empty `base_field` that is present in the claims wins; if it is
/// present but empty the request is rejected rather than falling back.
/// Otherwise `sub` is used.
pub fn extract_identity(claims: &TokenClaims, base_field: &str) -> Result<String, AuthError> {
    if !base_field.is_empty() {
        if let Some(value) = claims.get(base_field) {
            return match value {
                Value::String(id) if !id.is_empty() => Ok(id.clone()),
                Value::String(_) => Err(AuthError::EmptyBaseFieldClaim(base_field.to_string())),
                _ => Err(AuthError::IdentityClaimNotString(base_field.to_string())),
            };
        }
    }

    match claims.get("sub") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::String(_)) => Err(AuthError::EmptyUserIdInSubClaim),
        Some(_) => Err(AuthError::IdentityClaimNotString("sub".to_string())),
        None => Err(AuthError::NoSuitableUserIdClaim),
    }
}

/// First non-empty string among `clientId`, `cid`, `client_id`.
pub fn oauth_client_id(claims: &TokenClaims) -> Option<&str> {
    OAUTH_CLIENT_ID_CLAIMS
        .iter()
        .filter_map(|name| claims.get_str(name))
        .find(|id| !id.is_empty())
}

/// Storage key for the session of `identity` within `org_id`.
///
/// The identity is hashed so arbitrary claim values never leak into store
/// keys.
pub fn session_key(org_id: &str, identity: &str) -> String {
    let digest = Sha256::digest(identity.as_bytes());
    format!("{org_id}{}", hex::encode(digest))
}
