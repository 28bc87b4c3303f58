// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::auth::JwtAuthenticator;
use crate::config::ApiAuthConfig;

#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<JwtAuthenticator>,
    pub apis: Arc<ApiRegistry>,
}

impl AppState {
    pub fn new(authenticator: JwtAuthenticator, apis: ApiRegistry) -> Self {
        Self {
            authenticator: Arc::new(authenticator),
            apis: Arc::new(apis),
        }
    }
}

/// API definitions by id.
///
/// Definitions are replaced wholesale on reload; in-flight requests keep
/// the `Arc` they already resolved.
#[derive(Default)]
pub struct ApiRegistry {
    apis: RwLock<HashMap<String, Arc<ApiAuthConfig>>>,
}

impl ApiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: impl IntoIterator<Item = ApiAuthConfig>) -> Self {
        Self {
            apis: RwLock::new(index(configs)),
        }
    }

    pub async fn get(&self, api_id: &str) -> Option<Arc<ApiAuthConfig>> {
        self.apis.read().await.get(api_id).cloned()
    }

    /// Add or replace one definition.
    pub async fn load(&self, config: ApiAuthConfig) {
        self.apis
            .write()
            .await
            .insert(config.api_id.clone(), Arc::new(config));
    }

    pub async fn replace_all(&self, configs: impl IntoIterator<Item = ApiAuthConfig>) {
        *self.apis.write().await = index(configs);
    }

    pub async fn remove(&self, api_id: &str) -> Option<Arc<ApiAuthConfig>> {
        self.apis.write().await.remove(api_id)
    }

    pub async fn len(&self) -> usize {
        self.apis.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.apis.read().await.is_empty()
    }
}

fn index(configs: impl IntoIterator<Item = ApiAuthConfig>) -> HashMap<String, Arc<ApiAuthConfig>> {
    configs
        .into_iter()
        .map(|c| (c.api_id.clone(), Arc::new(c)))
        .collect()
}
