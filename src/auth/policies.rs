// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Policy resolution for an authenticated token.
//!
//! Precedence:
//!
//! 1. The configured policy claim, when present and non-empty. Every id must
//!    exist in the policy store. Scope-mapped policies, if any, are added on
//!    top.
//! 2. The policies of the client key named by the client id base field,
//!    when the API configures one and the token carries it.
//! 3. The scope claim, when a scope mapping is configured and the claim is
//!    present. At least one scope must map to a policy.
//! 4. The API's default policies.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use super::claims::TokenClaims;
use super::error::AuthError;
use super::key_session::client_policies;
use crate::config::ApiAuthConfig;
use crate::policy::PolicyStore;
use crate::session::SessionStore;

/// Where a resolved policy set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyProvenance {
    Claim,
    Client,
    Scope,
    Default,
}

/// Outcome of policy resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyResolution {
    pub policy_ids: Vec<String>,
    pub provenance: PolicyProvenance,
}

/// Resolve the policy ids that apply to a token for `api`.
pub async fn resolve_policies(
    api: &ApiAuthConfig,
    claims: &TokenClaims,
    store: &dyn PolicyStore,
    sessions: &dyn SessionStore,
) -> Result<PolicyResolution, AuthError> {
    if !api.policy_field_name.is_empty() {
        let mut ids = policy_ids_from_claim(claims.get(&api.policy_field_name));
        if !ids.is_empty() {
            for id in &ids {
                if store.policy(id).await.is_none() {
                    tracing::warn!(api_id = %api.api_id, policy_id = %id, "Policy from claim not found");
                    return Err(AuthError::NoMatchingPolicy);
                }
            }

            if !api.scope_to_policy.is_empty() {
                if let Some(scopes) = scopes_from_claim(claims, api.scope_claim()) {
                    ids.extend(map_scopes(&scopes, &api.scope_to_policy));
                }
            }

            return Ok(PolicyResolution {
                policy_ids: dedup(ids),
                provenance: PolicyProvenance::Claim,
            });
        }
    }

    if let Some(ids) = client_policies(api, claims, sessions).await? {
        return Ok(PolicyResolution {
            policy_ids: dedup(ids),
            provenance: PolicyProvenance::Client,
        });
    }

    if !api.scope_to_policy.is_empty() {
        if let Some(scopes) = scopes_from_claim(claims, api.scope_claim()) {
            let ids = map_scopes(&scopes, &api.scope_to_policy);
            if ids.is_empty() {
                return Err(AuthError::NoMatchingPolicyInScope);
            }
            return Ok(PolicyResolution {
                policy_ids: dedup(ids),
                provenance: PolicyProvenance::Scope,
            });
        }
    }

    if api.default_policies.is_empty() {
        return Err(AuthError::NoMatchingPolicy);
    }

    Ok(PolicyResolution {
        policy_ids: api.default_policies.clone(),
        provenance: PolicyProvenance::Default,
    })
}

/// Policy ids held by the policy claim: a single id or a list of ids.
fn policy_ids_from_claim(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(id)) if !id.is_empty() => vec![id.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Scopes held by the claim at `path`, or `None` if the claim is absent.
///
/// A string is split on whitespace. Within an array, string elements are
/// kept whole and nested arrays are flattened; other values are ignored.
pub fn scopes_from_claim(claims: &TokenClaims, path: &str) -> Option<Vec<String>> {
    let value = claims.get_path(path)?;
    let mut scopes = Vec::new();
    match value {
        Value::String(s) => scopes.extend(s.split_whitespace().map(str::to_string)),
        Value::Array(items) => flatten_into(items, &mut scopes),
        _ => {}
    }
    Some(scopes)
}

fn flatten_into(items: &[Value], out: &mut Vec<String>) {
    for item in items {
        match item {
            Value::String(s) => out.push(s.clone()),
            Value::Array(nested) => flatten_into(nested, out),
            _ => {}
        }
    }
}

fn map_scopes(scopes: &[String], mapping: &HashMap<String, String>) -> Vec<String> {
    scopes
        .iter()
        .filter_map(|scope| mapping.get(scope).cloned())
        .collect()
}

fn dedup(ids: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}
