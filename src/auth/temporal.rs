// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Temporal claim validation (`exp`, `iat`, `nbf`).
//!
//! Signature verification runs with `jsonwebtoken`'s own time checks
//! disabled; this module applies them instead so that each claim gets its
//! own tolerance window.
//!
//! ## Rules
//!
//! - `exp`: rejected iff `now > exp + exp_skew`
//! - `iat`: rejected iff `now < iat - iat_skew`
//! - `nbf`: rejected iff `now < nbf - nbf_skew`
//!
//! An absent claim is not checked. Skew only ever widens the window.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::claims::TokenClaims;
use super::error::AuthError;

/// Per-claim clock skew tolerance, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSkew {
    #[serde(default)]
    pub expires_at: u64,
    #[serde(default)]
    pub issued_at: u64,
    #[serde(default)]
    pub not_before: u64,
}

/// Validate `exp`, `iat` and `nbf` against `now` (Unix seconds).
pub fn validate_temporal_claims(
    claims: &TokenClaims,
    skew: &ClaimSkew,
    now: i64,
) -> Result<(), AuthError> {
    if let Some(exp) = timestamp(claims, "exp")? {
        if now > exp.saturating_add(seconds(skew.expires_at)) {
            return Err(AuthError::TokenExpired);
        }
    }

    if let Some(iat) = timestamp(claims, "iat")? {
        if now < iat.saturating_sub(seconds(skew.issued_at)) {
            return Err(AuthError::TokenUsedBeforeIssued);
        }
    }

    if let Some(nbf) = timestamp(claims, "nbf")? {
        if now < nbf.saturating_sub(seconds(skew.not_before)) {
            return Err(AuthError::TokenNotValidYet);
        }
    }

    Ok(())
}

/// Read a NumericDate claim. `null` counts as absent.
pub(crate) fn timestamp(claims: &TokenClaims, name: &'static str) -> Result<Option<i64>, AuthError> {
    match claims.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or(AuthError::MalformedTemporalClaim(name)),
        Some(_) => Err(AuthError::MalformedTemporalClaim(name)),
    }
}

fn seconds(skew: u64) -> i64 {
    i64::try_from(skew).unwrap_or(i64::MAX)
}
