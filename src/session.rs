// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session state and the session store capability.
//!
//! A session is what the gateway knows about one caller identity: the
//! policies it was last authorised with, the per-API access rights those
//! policies materialise to, and the usage counters that must survive
//! re-authentication.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::policy::{merged_access_rights, Policy};

/// Session store errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("session store unavailable: {0}")]
    Backend(String),
    #[error("failed to encode session: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Quota and rate limit for one API, with the caller's live counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiLimit {
    pub rate: f64,
    pub per: f64,
    /// `-1` means unlimited, `0` means no quota
    pub quota_max: i64,
    pub quota_renewal_rate: i64,
    pub quota_remaining: i64,
    /// Unix time at which the quota renews
    pub quota_renews: i64,
    /// Remaining rate-limit allowance in the current window
    pub allowance: f64,
    /// Unix time of the last rate-limit check
    pub rate_last_check: i64,
}

impl ApiLimit {
    pub fn new(rate: f64, per: f64, quota_max: i64, quota_renewal_rate: i64) -> Self {
        Self {
            rate,
            per,
            quota_max,
            quota_renewal_rate,
            ..Default::default()
        }
    }

    /// No quota and no rate limit.
    pub fn is_empty(&self) -> bool {
        self.quota_max == 0 && self.rate <= 0.0
    }

    /// The more generous of two limits, with counters cleared.
    pub fn most_generous(self, other: ApiLimit) -> ApiLimit {
        let (rate, per) = if throughput(&other) > throughput(&self) {
            (other.rate, other.per)
        } else {
            (self.rate, self.per)
        };
        let (quota_max, quota_renewal_rate) = if quota_rank(other.quota_max) > quota_rank(self.quota_max) {
            (other.quota_max, other.quota_renewal_rate)
        } else {
            (self.quota_max, self.quota_renewal_rate)
        };
        ApiLimit::new(rate, per, quota_max, quota_renewal_rate)
    }

    /// Start counters from the limit defaults.
    fn reset_counters(&mut self, now: i64) {
        self.quota_remaining = self.quota_max;
        self.quota_renews = if self.quota_renewal_rate > 0 {
            now.saturating_add(self.quota_renewal_rate)
        } else {
            0
        };
        self.allowance = self.rate;
        self.rate_last_check = now;
    }

    /// Take over the counters of `previous`, bounded by this limit.
    ///
    /// A quota renewal or rate limit that `previous` did not have starts
    /// fresh at `now`.
    fn carry_counters(&mut self, previous: &ApiLimit, now: i64) {
        self.quota_remaining = if self.quota_max > 0 && previous.quota_max > 0 {
            previous.quota_remaining.clamp(0, self.quota_max)
        } else {
            self.quota_max
        };
        self.quota_renews = if self.quota_renewal_rate <= 0 {
            0
        } else if previous.quota_renewal_rate <= 0 {
            now.saturating_add(self.quota_renewal_rate)
        } else {
            previous.quota_renews
        };
        if self.rate <= 0.0 {
            self.allowance = 0.0;
            self.rate_last_check = previous.rate_last_check;
        } else if previous.rate <= 0.0 {
            self.allowance = self.rate;
            self.rate_last_check = now;
        } else {
            self.allowance = previous.allowance.min(self.rate);
            self.rate_last_check = previous.rate_last_check;
        }
    }
}

fn throughput(limit: &ApiLimit) -> f64 {
    if limit.per > 0.0 {
        limit.rate / limit.per
    } else {
        limit.rate
    }
}

fn quota_rank(quota_max: i64) -> i64 {
    if quota_max < 0 {
        i64::MAX
    } else {
        quota_max
    }
}

/// Access to one API as held by a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessDefinition {
    pub api_id: String,
    pub api_name: String,
    pub versions: Vec<String>,
    pub limit: Option<ApiLimit>,
    /// Policies granting this API
    pub allowed_by: Vec<String>,
}

/// Persisted state for one caller identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    pub org_id: String,
    pub identity: String,
    /// Policy ids, in resolution order
    pub apply_policies: Vec<String>,
    pub access_rights: BTreeMap<String, AccessDefinition>,
    pub rate: f64,
    pub per: f64,
    pub quota_max: i64,
    pub quota_renewal_rate: i64,
    pub oauth_client_id: String,
    /// Unix time at which the session lapses, `0` for never
    pub expires: i64,
    pub meta_data: Map<String, Value>,
    pub jwt_data: JwtData,
}

/// JWT material attached to a key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtData {
    /// HMAC secret or public key (PEM or JWK) verifying tokens for this key
    pub secret: String,
}

impl Session {
    pub fn new(org_id: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            identity: identity.into(),
            ..Default::default()
        }
    }

    /// Materialise `policies` onto this session.
    ///
    /// Access rights are rebuilt from the policies. An API that is still
    /// granted with a limit keeps its existing counters (clamped to the new
    /// limit); newly granted APIs start fresh; APIs no longer granted are
    /// dropped. Applying the same policies twice yields the same session.
    pub fn apply_policies(&mut self, policies: &[Policy], now: i64) {
        let mut rights = BTreeMap::new();
        for (api_id, mut access) in merged_access_rights(policies) {
            if let Some(limit) = access.limit.as_mut() {
                let previous = self
                    .access_rights
                    .get(&api_id)
                    .and_then(|old| old.limit.as_ref());
                match previous {
                    Some(previous) => limit.carry_counters(previous, now),
                    None => limit.reset_counters(now),
                }
            }
            rights.insert(api_id, access);
        }
        self.access_rights = rights;
        self.apply_policies = policies.iter().map(|p| p.id.clone()).collect();

        let global = policies
            .iter()
            .filter_map(Policy::limit)
            .reduce(ApiLimit::most_generous)
            .unwrap_or_default();
        self.rate = global.rate;
        self.per = global.per;
        self.quota_max = global.quota_max;
        self.quota_renewal_rate = global.quota_renewal_rate;
    }

    /// Remaining quota for `api_id`, if the session tracks one.
    pub fn quota_remaining(&self, api_id: &str) -> Option<i64> {
        self.access_rights
            .get(api_id)?
            .limit
            .as_ref()
            .map(|l| l.quota_remaining)
    }
}

/// Capability to load and persist sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, org_id: &str, key: &str) -> Result<Option<Session>, SessionStoreError>;

    /// Persist `session`. `ttl` of `None` keeps it until overwritten.
    async fn put(
        &self,
        org_id: &str,
        key: &str,
        session: &Session,
        ttl: Option<Duration>,
    ) -> Result<(), SessionStoreError>;
}

struct StoredSession {
    session: Session,
    expires_at: Option<Instant>,
}

/// Session store held in memory, honouring TTLs on read.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<(String, String), StoredSession>>,
    writes: AtomicUsize,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `put` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, org_id: &str, key: &str) -> Result<Option<Session>, SessionStoreError> {
        let id = (org_id.to_string(), key.to_string());
        {
            let sessions = self.sessions.read().await;
            match sessions.get(&id) {
                None => return Ok(None),
                Some(stored) if stored.expires_at.is_none_or(|at| Instant::now() < at) => {
                    return Ok(Some(stored.session.clone()));
                }
                Some(_) => {}
            }
        }

        // Expired
        self.sessions.write().await.remove(&id);
        Ok(None)
    }

    async fn put(
        &self,
        org_id: &str,
        key: &str,
        session: &Session,
        ttl: Option<Duration>,
    ) -> Result<(), SessionStoreError> {
        let stored = StoredSession {
            session: session.clone(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.sessions
            .write()
            .await
            .insert((org_id.to_string(), key.to_string()), stored);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
