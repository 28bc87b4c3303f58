// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Process-wide cache of remote verification keys.
//!
//! Entries are keyed by API identity (`org_id:api_id`) and remember which
//! URL(s) they were fetched from, so a configuration change is detected on
//! the next lookup even while the entry is still fresh.
//!
//! Concurrent misses for the same API may both fetch; the last write wins.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet};
use lru::LruCache;

/// Default key cache TTL (5 minutes).
pub const DEFAULT_KEY_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default number of APIs tracked before LRU eviction.
pub const DEFAULT_KEY_CACHE_CAPACITY: usize = 1024;

/// Key material cached for one API.
#[derive(Debug, Clone)]
pub enum CachedKeys {
    /// Full key set fetched from a single legacy URL.
    Single { url: String, set: JwkSet },
    /// Keys merged by `kid` from every configured URL, in configuration order.
    Merged {
        urls: Vec<String>,
        keys: HashMap<String, Jwk>,
    },
}

impl CachedKeys {
    /// Whether this entry was built from exactly `urls`, in order.
    pub fn matches_urls(&self, urls: &[String]) -> bool {
        match self {
            CachedKeys::Single { url, .. } => urls.len() == 1 && urls[0] == *url,
            CachedKeys::Merged { urls: cached, .. } => cached.as_slice() == urls,
        }
    }

    /// Look up a key by `kid`.
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        match self {
            CachedKeys::Single { set, .. } => set.find(kid),
            CachedKeys::Merged { keys, .. } => keys.get(kid),
        }
    }
}

struct CacheEntry {
    keys: CachedKeys,
    inserted_at: Instant,
}

/// In-process LRU + TTL cache for resolved key sets.
pub struct KeyCache {
    cache: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl KeyCache {
    /// Create a new cache with the given capacity and TTL.
    ///
    /// - `capacity`: Max number of APIs to cache.
    /// - `ttl`: Time-to-live for each cache entry.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
        }
    }

    /// Create with custom TTL, keeping the current capacity.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get the cached keys for an API identity.
    ///
    /// Returns `None` if not cached or expired.
    pub fn get(&self, api_identity: &str) -> Option<CachedKeys> {
        let mut cache = self.cache.lock().ok()?;
        if let Some(entry) = cache.get(api_identity) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.keys.clone());
            }
            cache.pop(api_identity);
        }
        None
    }

    /// Store keys for an API identity, replacing any previous entry.
    pub fn set(&self, api_identity: &str, keys: CachedKeys) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                api_identity.to_string(),
                CacheEntry {
                    keys,
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    /// Drop the entry for a single API.
    pub fn invalidate(&self, api_identity: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.pop(api_identity);
        }
    }

    /// Drop every entry.
    pub fn flush(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_CACHE_CAPACITY, DEFAULT_KEY_CACHE_TTL)
    }
}
