// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) retrieval.
//!
//! ## Security
//!
//! - Certificate verification is on unless the gateway is explicitly
//!   configured to skip it for key-set fetches
//! - Each fetch is bounded by the client timeout
//! - Failures deny the current request only; nothing is retried in-request

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;

use super::error::AuthError;

/// Default timeout for a single key-set fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Capability to retrieve a remote key set.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    async fn fetch(&self, url: &str, skip_tls_verify: bool) -> Result<JwkSet, AuthError>;
}

/// [`KeySetFetcher`] over HTTPS using `reqwest`.
#[derive(Clone)]
pub struct HttpKeySetFetcher {
    client: reqwest::Client,
    insecure_client: reqwest::Client,
}

impl HttpKeySetFetcher {
    /// Create a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            insecure_client: reqwest::Client::builder()
                .timeout(timeout)
                .danger_accept_invalid_certs(true)
                .build()?,
        })
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch(&self, url: &str, skip_tls_verify: bool) -> Result<JwkSet, AuthError> {
        let client = if skip_tls_verify {
            &self.insecure_client
        } else {
            &self.client
        };

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::JwksFetchError(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?;

        tracing::debug!(url, keys = jwks.keys.len(), "Fetched JWKS");
        Ok(jwks)
    }
}
