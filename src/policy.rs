// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access policies and the policy store capability.
//!
//! A policy grants access to one or more APIs, each optionally with its own
//! quota and rate limit. Policy-level limits apply to every granted API that
//! does not carry its own.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::session::{AccessDefinition, ApiLimit, Session};

/// Policy store errors.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("policy not found: {0}")]
    NotFound(String),
}

/// Per-API grant inside a policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyGrant {
    pub api_name: String,
    pub versions: Vec<String>,
    pub limit: Option<ApiLimit>,
}

/// An access policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub id: String,
    pub org_id: String,
    pub name: String,
    /// Granted APIs by API id
    pub access_rights: HashMap<String, PolicyGrant>,
    pub rate: f64,
    pub per: f64,
    /// `-1` means unlimited, `0` means no quota
    pub quota_max: i64,
    pub quota_renewal_rate: i64,
    /// Lifetime in seconds of sessions created under this policy, `0` for none
    pub key_expires_in: i64,
}

impl Policy {
    /// Policy-level limit, if the policy defines one.
    pub fn limit(&self) -> Option<ApiLimit> {
        let limit = ApiLimit::new(self.rate, self.per, self.quota_max, self.quota_renewal_rate);
        (!limit.is_empty()).then_some(limit)
    }

    /// Effective limit for one granted API.
    pub fn limit_for(&self, grant: &PolicyGrant) -> Option<ApiLimit> {
        grant
            .limit
            .clone()
            .filter(|l| !l.is_empty())
            .or_else(|| self.limit())
    }
}

/// Capability to look up policies and apply them to sessions.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Look up a policy by id.
    async fn policy(&self, id: &str) -> Option<Policy>;

    /// Resolve every id, failing on the first unknown one.
    async fn policies(&self, ids: &[String]) -> Result<Vec<Policy>, PolicyError> {
        let mut policies = Vec::with_capacity(ids.len());
        for id in ids {
            let policy = self
                .policy(id)
                .await
                .ok_or_else(|| PolicyError::NotFound(id.clone()))?;
            policies.push(policy);
        }
        Ok(policies)
    }

    /// Materialise `ids` onto `session`. Idempotent for a fixed `now`.
    async fn apply_policies(
        &self,
        session: &mut Session,
        ids: &[String],
        now: i64,
    ) -> Result<(), PolicyError> {
        let policies = self.policies(ids).await?;
        session.apply_policies(&policies, now);
        Ok(())
    }
}

/// Policy store held in memory.
#[derive(Default)]
pub struct InMemoryPolicyStore {
    policies: RwLock<HashMap<String, Policy>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policies(policies: impl IntoIterator<Item = Policy>) -> Self {
        Self {
            policies: RwLock::new(policies.into_iter().map(|p| (p.id.clone(), p)).collect()),
        }
    }

    pub async fn insert(&self, policy: Policy) {
        self.policies.write().await.insert(policy.id.clone(), policy);
    }

    pub async fn remove(&self, id: &str) -> Option<Policy> {
        self.policies.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.policies.read().await.len()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn policy(&self, id: &str) -> Option<Policy> {
        self.policies.read().await.get(id).cloned()
    }
}

/// Access rights granted by `policies`, merged per API.
///
/// When several policies grant the same API the versions are unioned and the
/// more generous limit wins.
pub fn merged_access_rights(policies: &[Policy]) -> HashMap<String, AccessDefinition> {
    let mut rights: HashMap<String, AccessDefinition> = HashMap::new();
    for policy in policies {
        for (api_id, grant) in &policy.access_rights {
            let limit = policy.limit_for(grant);
            match rights.get_mut(api_id) {
                Some(existing) => {
                    for version in &grant.versions {
                        if !existing.versions.contains(version) {
                            existing.versions.push(version.clone());
                        }
                    }
                    existing.limit = match (existing.limit.take(), limit) {
                        (Some(a), Some(b)) => Some(a.most_generous(b)),
                        (a, b) => a.or(b),
                    };
                    existing.allowed_by.push(policy.id.clone());
                }
                None => {
                    rights.insert(
                        api_id.clone(),
                        AccessDefinition {
                            api_id: api_id.clone(),
                            api_name: grant.api_name.clone(),
                            versions: grant.versions.clone(),
                            limit,
                            allowed_by: vec![policy.id.clone()],
                        },
                    );
                }
            }
        }
    }
    rights
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(limit: Option<ApiLimit>) -> PolicyGrant {
        PolicyGrant {
            api_name: "api".into(),
            versions: vec!["Default".into()],
            limit,
        }
    }

    fn policy(id: &str, apis: &[&str], quota_max: i64) -> Policy {
        Policy {
            id: id.into(),
            access_rights: apis.iter().map(|a| (a.to_string(), grant(None))).collect(),
            rate: 10.0,
            per: 1.0,
            quota_max,
            quota_renewal_rate: 3600,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn lookup_and_unknown_ids() {
        let store = InMemoryPolicyStore::with_policies([policy("p1", &["a"], 10)]);
        assert!(store.policy("p1").await.is_some());
        assert!(store.policy("nope").await.is_none());

        let err = store
            .policies(&["p1".into(), "nope".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyError::NotFound(ref id) if id == "nope"));
    }

    #[test]
    fn api_limit_overrides_policy_limit() {
        let mut p = policy("p1", &[], 10);
        let own = ApiLimit::new(1.0, 60.0, 5, 60);
        p.access_rights.insert("a".into(), grant(Some(own.clone())));
        p.access_rights.insert("b".into(), grant(None));

        let rights = merged_access_rights(&[p]);
        assert_eq!(rights["a"].limit.as_ref().unwrap().quota_max, 5);
        assert_eq!(rights["b"].limit.as_ref().unwrap().quota_max, 10);
    }

    #[test]
    fn overlapping_grants_take_most_generous_limit() {
        let rights = merged_access_rights(&[policy("p1", &["a"], 10), policy("p2", &["a"], 50)]);
        let a = &rights["a"];
        assert_eq!(a.limit.as_ref().unwrap().quota_max, 50);
        assert_eq!(a.allowed_by, vec!["p1".to_string(), "p2".to_string()]);
        assert_eq!(a.versions, vec!["Default".to_string()]);
    }

    #[test]
    fn unlimited_quota_beats_finite_quota() {
        let rights = merged_access_rights(&[policy("p1", &["a"], 10), policy("p2", &["a"], -1)]);
        assert_eq!(rights["a"].limit.as_ref().unwrap().quota_max, -1);
    }

    #[test]
    fn policy_without_limits_grants_unlimited_access() {
        let p = Policy {
            id: "open".into(),
            access_rights: [("a".to_string(), grant(None))].into_iter().collect(),
            ..Default::default()
        };
        assert!(p.limit().is_none());
        assert!(merged_access_rights(&[p])["a"].limit.is_none());
    }

    #[test]
    fn policy_deserializes_from_json() {
        let p: Policy = serde_json::from_str(
            r#"{"id":"p1","access_rights":{"api1":{"api_name":"API 1"}},"quota_max":100,"key_expires_in":3600}"#,
        )
        .unwrap();
        assert_eq!(p.quota_max, 100);
        assert_eq!(p.key_expires_in, 3600);
        assert_eq!(p.access_rights["api1"].api_name, "API 1");
    }
}
