// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT header and claims representation.
//!
//! Claims are kept as a JSON object so that per-API configuration can name
//! arbitrary claims (identity base field, policy field, scope claim) without
//! a fixed schema. `serde_json::Value` is the tagged union over string,
//! number, boolean, array and nested object.

use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::Algorithm;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::AuthError;

/// Decoded JOSE header of a bearer token.
///
/// `kid` is kept untyped so that a non-string key id can be told apart from
/// a missing one.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenHeader {
    /// Signing algorithm name as sent by the client (`RS256`, `HS512`, ...)
    pub alg: String,
    /// Key id, if any
    #[serde(default)]
    pub kid: Option<Value>,
}

impl TokenHeader {
    /// Decode the header segment of a compact JWT.
    ///
    /// Fails with [`AuthError::MalformedToken`] unless the token has exactly
    /// three segments and the first one is base64url-encoded JSON.
    pub fn parse(token: &str) -> Result<Self, AuthError> {
        let [header, _, _] = split_token(token)?;
        decode_segment(header)
    }

    /// The key id as a string.
    ///
    /// Remote key-set lookups require this; anything else fails with
    /// [`AuthError::KidNotAString`].
    pub fn kid_str(&self) -> Result<&str, AuthError> {
        match &self.kid {
            Some(Value::String(kid)) => Ok(kid),
            _ => Err(AuthError::KidNotAString),
        }
    }

    /// The header algorithm, if it names one `jsonwebtoken` supports.
    pub fn algorithm(&self) -> Result<Algorithm, AuthError> {
        Algorithm::from_str(&self.alg).map_err(|_| AuthError::UnexpectedSigningMethod)
    }
}

/// The three segments of a compact JWT.
fn split_token(token: &str) -> Result<[&str; 3], AuthError> {
    let mut segments = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(AuthError::MalformedToken);
    };
    Ok([header, payload, signature])
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, AuthError> {
    let raw = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|_| AuthError::MalformedToken)?;
    serde_json::from_slice(&raw).map_err(|_| AuthError::MalformedToken)
}

/// Claims of a verified token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenClaims(Map<String, Value>);

impl TokenClaims {
    pub fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    /// Decode the payload of `token` without verifying it.
    ///
    /// Only for picking the key that verifies the token; never trust the
    /// result for anything else.
    pub fn peek(token: &str) -> Result<Self, AuthError> {
        let [_, payload, _] = split_token(token)?;
        decode_segment(payload)
    }

    /// Top-level claim by exact name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Top-level claim by exact name, only if it is a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Claim lookup that understands dotted paths.
    ///
    /// A literal key containing dots wins over traversal, so `{"a.b": 1}`
    /// resolves `"a.b"` without descending. Otherwise the path is walked left
    /// to right through nested objects.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.0.get(path) {
            return Some(value);
        }

        let mut parts = path.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for TokenClaims {
    fn from(claims: Map<String, Value>) -> Self {
        Self(claims)
    }
}
