// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! Every variant belongs to exactly one [`ErrorKind`], which decides the
//! HTTP status the calling middleware renders. Display strings are stable
//! and user-visible.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::policy::PolicyError;
use crate::session::SessionStoreError;

/// Failure class of an authentication decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or unparseable bearer token (400).
    MalformedRequest,
    /// Bad signature, unresolvable key or unsupported algorithm (403).
    SignatureInvalid,
    /// Expired, not yet valid or used before issued (401).
    ClaimInvalid,
    /// No usable identity claim (403).
    IdentityMissing,
    /// Unresolvable claim policy or empty scope mapping (403).
    PolicyInvalid,
    /// Session or policy store failure (500).
    Internal,
}

/// Authentication error type.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No authorization header present, or it is blank
    #[error("Authorization field missing")]
    MissingAuthHeader,
    /// Token is not a structurally valid JWT
    #[error("Key not authorized")]
    MalformedToken,
    /// Token signature does not verify against the resolved key
    #[error("Key not authorized")]
    InvalidSignature,
    /// Header `alg` is outside the configured signing family
    #[error("Key not authorized: Unexpected signing method")]
    UnexpectedSigningMethod,
    /// The configured key material could not be decoded
    #[error("Key not authorized: invalid key material: {0}")]
    InvalidKeyMaterial(String),
    /// No key source configured for the API
    #[error("Key not authorized: no key source configured")]
    NoKeySource,
    /// Header `kid` is missing or not a string on a remote key-set path
    #[error("kid is not a string")]
    KidNotAString,
    /// Remote key set does not contain the header `kid`
    #[error("no matching KID could be found")]
    NoMatchingKey,
    /// None of the configured key sets contain the header `kid`
    #[error("no matching KID found in any JWKs or fallback")]
    NoMatchingKeyInAnySet,
    /// No session exists for the key a token names
    #[error("Key not authorized: token invalid, key not found")]
    KeyNotFound,
    /// Multiple key-set URLs configured on a non-OAS API
    #[error("this feature is only available when using OAS API")]
    FeatureRequiresOas,
    /// Remote key-set retrieval failed
    #[error("Key not authorized: failed to fetch JWKS: {0}")]
    JwksFetchError(String),
    /// `exp` is in the past beyond the configured skew
    #[error("Key not authorized: token has expired")]
    TokenExpired,
    /// `iat` is in the future beyond the configured skew
    #[error("Key not authorized: token used before issued")]
    TokenUsedBeforeIssued,
    /// `nbf` is in the future beyond the configured skew
    #[error("Key not authorized: token is not valid yet")]
    TokenNotValidYet,
    /// A temporal claim is present but not numeric
    #[error("Key not authorized: malformed {0} claim")]
    MalformedTemporalClaim(&'static str),
    /// The configured identity base field is present but empty
    #[error("found an empty user ID in predefined base field claim {0}")]
    EmptyBaseFieldClaim(String),
    /// The identity claim holds something other than a string
    #[error("user ID claim {0} is not a string")]
    IdentityClaimNotString(String),
    /// `sub` is present but empty
    #[error("found an empty user ID in sub claim")]
    EmptyUserIdInSubClaim,
    /// Neither the base field nor `sub` is present
    #[error("no suitable claims for user ID were found")]
    NoSuitableUserIdClaim,
    /// A policy id from the policy claim does not exist
    #[error("key not authorized: no matching policy")]
    NoMatchingPolicy,
    /// Scope claim present but no scope maps to a policy
    #[error("no matching policy found in scope claim")]
    NoMatchingPolicyInScope,
    /// The client key named by the token carries no policies
    #[error("key not authorized: no bound policy")]
    NoBoundPolicy,
    /// Policy application failed
    #[error("key not authorized: {0}")]
    PolicyApplication(#[from] PolicyError),
    /// Session store failure
    #[error("Internal authentication error: {0}")]
    SessionStore(#[from] SessionStoreError),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::MissingAuthHeader => ErrorKind::MalformedRequest,
            AuthError::MalformedToken
            | AuthError::InvalidSignature
            | AuthError::UnexpectedSigningMethod
            | AuthError::InvalidKeyMaterial(_)
            | AuthError::NoKeySource
            | AuthError::KidNotAString
            | AuthError::NoMatchingKey
            | AuthError::NoMatchingKeyInAnySet
            | AuthError::KeyNotFound
            | AuthError::FeatureRequiresOas
            | AuthError::JwksFetchError(_) => ErrorKind::SignatureInvalid,
            AuthError::TokenExpired
            | AuthError::TokenUsedBeforeIssued
            | AuthError::TokenNotValidYet
            | AuthError::MalformedTemporalClaim(_) => ErrorKind::ClaimInvalid,
            AuthError::EmptyBaseFieldClaim(_)
            | AuthError::IdentityClaimNotString(_)
            | AuthError::EmptyUserIdInSubClaim
            | AuthError::NoSuitableUserIdClaim => ErrorKind::IdentityMissing,
            AuthError::NoMatchingPolicy
            | AuthError::NoMatchingPolicyInScope
            | AuthError::NoBoundPolicy
            | AuthError::PolicyApplication(_) => ErrorKind::PolicyInvalid,
            AuthError::SessionStore(_) => ErrorKind::Internal,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::MalformedToken => "malformed_token",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::UnexpectedSigningMethod => "unexpected_signing_method",
            AuthError::InvalidKeyMaterial(_) => "invalid_key_material",
            AuthError::NoKeySource => "no_key_source",
            AuthError::KidNotAString => "kid_not_a_string",
            AuthError::NoMatchingKey => "no_matching_key",
            AuthError::NoMatchingKeyInAnySet => "no_matching_key_in_any_set",
            AuthError::KeyNotFound => "key_not_found",
            AuthError::FeatureRequiresOas => "feature_requires_oas",
            AuthError::JwksFetchError(_) => "jwks_fetch_error",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenUsedBeforeIssued => "token_used_before_issued",
            AuthError::TokenNotValidYet => "token_not_valid_yet",
            AuthError::MalformedTemporalClaim(_) => "malformed_temporal_claim",
            AuthError::EmptyBaseFieldClaim(_) => "empty_base_field_claim",
            AuthError::IdentityClaimNotString(_) => "identity_claim_not_string",
            AuthError::EmptyUserIdInSubClaim => "empty_user_id_in_sub_claim",
            AuthError::NoSuitableUserIdClaim => "no_suitable_user_id_claim",
            AuthError::NoMatchingPolicy => "no_matching_policy",
            AuthError::NoMatchingPolicyInScope => "no_matching_policy_in_scope",
            AuthError::NoBoundPolicy => "no_bound_policy",
            AuthError::PolicyApplication(_) => "policy_application_failed",
            AuthError::SessionStore(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::MalformedRequest => StatusCode::BAD_REQUEST,
            ErrorKind::ClaimInvalid => StatusCode::UNAUTHORIZED,
            ErrorKind::SignatureInvalid
            | ErrorKind::IdentityMissing
            | ErrorKind::PolicyInvalid => StatusCode::FORBIDDEN,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
