// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Boundary for externally hosted authentication plugins.
//!
//! Plugins run out of process behind a driver (Python, Lua or gRPC). The
//! gateway hands them a [`DispatchObject`] describing the request and
//! receives a possibly modified object back. Nothing on the JWT path calls
//! into this module; it fixes the shape of the seam so drivers can be
//! plugged in without touching the engine.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::session::Session;

/// Plugin runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    Python,
    Lua,
    Grpc,
}

impl Driver {
    pub const ALL: [Driver; 3] = [Driver::Python, Driver::Lua, Driver::Grpc];

    pub fn as_str(self) -> &'static str {
        match self {
            Driver::Python => "python",
            Driver::Lua => "lua",
            Driver::Grpc => "grpc",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Driver {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Driver::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| DispatchError::UnsupportedDriver(s.to_string()))
    }
}

/// Point in the request lifecycle a plugin hooks into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookType {
    Pre,
    Post,
    PostKeyAuth,
    CustomKeyCheck,
    Response,
}

/// Payload exchanged with a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchObject {
    pub hook_type: HookType,
    pub hook_name: String,
    /// Request view: method, path, headers, body
    #[serde(default)]
    pub request: Value,
    #[serde(default)]
    pub session: Option<Session>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// API fields exposed to the plugin (api_id, org_id, ...)
    #[serde(default)]
    pub spec: HashMap<String, String>,
}

impl DispatchObject {
    pub fn new(hook_type: HookType, hook_name: impl Into<String>) -> Self {
        Self {
            hook_type,
            hook_name: hook_name.into(),
            request: Value::Null,
            session: None,
            metadata: Map::new(),
            spec: HashMap::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unsupported driver '{0}'")]
    UnsupportedDriver(String),
    #[error("couldn't dispatch request, driver '{0}' isn't available")]
    DriverNotLoaded(Driver),
    #[error("plugin failed: {0}")]
    Plugin(String),
}

/// A loaded plugin runtime.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, object: DispatchObject) -> Result<DispatchObject, DispatchError>;

    /// Reload plugin code.
    async fn reload(&self) -> Result<(), DispatchError>;
}

/// Loaded dispatchers by driver.
#[derive(Default)]
pub struct DispatcherRegistry {
    drivers: RwLock<HashMap<Driver, Arc<dyn Dispatcher>>>,
}

impl DispatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `dispatcher` for `driver`, replacing any previous one.
    pub async fn load(&self, driver: Driver, dispatcher: Arc<dyn Dispatcher>) {
        self.drivers.write().await.insert(driver, dispatcher);
        tracing::info!(%driver, "Dispatcher loaded");
    }

    pub async fn is_loaded(&self, driver: Driver) -> bool {
        self.drivers.read().await.contains_key(&driver)
    }

    pub async fn dispatch(
        &self,
        driver: Driver,
        object: DispatchObject,
    ) -> Result<DispatchObject, DispatchError> {
        let dispatcher = self
            .drivers
            .read()
            .await
            .get(&driver)
            .cloned()
            .ok_or(DispatchError::DriverNotLoaded(driver))?;
        dispatcher.dispatch(object).await
    }

    /// Reload every loaded driver. Failures are logged and the rest still
    /// reload; the first error is returned.
    pub async fn reload_all(&self) -> Result<(), DispatchError> {
        let loaded: Vec<_> = self
            .drivers
            .read()
            .await
            .iter()
            .map(|(driver, d)| (*driver, d.clone()))
            .collect();

        let mut first_error = None;
        for (driver, dispatcher) in loaded {
            if let Err(e) = dispatcher.reload().await {
                tracing::warn!(%driver, error = %e, "Dispatcher reload failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
