// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verification key resolution.
//!
//! ## Key sources, in order of precedence
//!
//! 1. `jwks_uris` (OAS APIs only): every URL is fetched and the keys are
//!    merged by `kid`. The cached entry remembers the URL list; any change
//!    to it forces a refetch regardless of TTL.
//! 2. `source` holding an `http(s)://` URL: single remote key set, cached
//!    per API together with the URL. A `kid` missing from a fresh cached
//!    set is rejected without refetching; rotated keys are picked up once
//!    the entry expires.
//! 3. `source` holding inline material: PEM, JWK JSON or an HMAC secret,
//!    optionally base64-wrapped. A base64-wrapped URL is treated as (2).
//!
//! An API with no source at all verifies each token with the secret stored
//! on the key's own session; see [`key_from_secret`].
//!
//! ## Security
//!
//! - The header `alg` must belong to the API's signing family before any
//!   key is looked up
//! - `jsonwebtoken` performs signature verification only; temporal claims
//!   are checked separately with per-claim skew

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use super::claims::{TokenClaims, TokenHeader};
use super::error::AuthError;
use super::jwks::KeySetFetcher;
use super::key_cache::{CachedKeys, KeyCache};
use crate::config::{ApiAuthConfig, SigningMethod};

/// A verification key together with the algorithm it verifies.
pub struct ResolvedKey {
    pub key: DecodingKey,
    pub algorithm: Algorithm,
}

/// Where an API's verification key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum KeySource {
    RemoteSets(Vec<String>),
    RemoteSet(String),
    Inline(Vec<u8>),
}

/// Resolves verification keys for tokens, backed by a shared [`KeyCache`].
#[derive(Clone)]
pub struct KeyResolver {
    cache: Arc<KeyCache>,
    fetcher: Arc<dyn KeySetFetcher>,
    skip_tls_verify: bool,
}

impl KeyResolver {
    pub fn new(cache: Arc<KeyCache>, fetcher: Arc<dyn KeySetFetcher>) -> Self {
        Self {
            cache,
            fetcher,
            skip_tls_verify: false,
        }
    }

    /// Skip certificate verification when fetching remote key sets.
    pub fn with_skip_tls_verify(mut self, skip: bool) -> Self {
        self.skip_tls_verify = skip;
        self
    }

    pub fn cache(&self) -> &KeyCache {
        &self.cache
    }

    /// Resolve the key that must have signed a token with `header`.
    pub async fn resolve(
        &self,
        api: &ApiAuthConfig,
        header: &TokenHeader,
    ) -> Result<ResolvedKey, AuthError> {
        let algorithm = checked_algorithm(api, header)?;
        let key = match classify_source(api)? {
            KeySource::RemoteSets(urls) => {
                let kid = header.kid_str()?;
                let jwk = self
                    .resolve_from_sets(&api.api_identity(), &urls, kid)
                    .await?;
                decoding_key_from_jwk(&jwk)?
            }
            KeySource::RemoteSet(url) => {
                let kid = header.kid_str()?;
                let jwk = self
                    .resolve_from_set(&api.api_identity(), &url, kid)
                    .await?;
                decoding_key_from_jwk(&jwk)?
            }
            KeySource::Inline(material) => decoding_key_from_material(api.signing_method, &material)?,
        };

        Ok(ResolvedKey { key, algorithm })
    }

    /// Legacy single-URL lookup.
    async fn resolve_from_set(
        &self,
        api_identity: &str,
        url: &str,
        kid: &str,
    ) -> Result<Jwk, AuthError> {
        let snapshot = [url.to_string()];
        match self.cache.get(api_identity) {
            Some(cached) if cached.matches_urls(&snapshot) => {
                return cached.find(kid).cloned().ok_or_else(|| {
                    tracing::debug!(api_identity, kid, "kid not in cached JWKS");
                    AuthError::NoMatchingKey
                });
            }
            Some(_) => {
                tracing::debug!(api_identity, "JWKS URL changed, refetching");
            }
            None => {}
        }

        let set = self.fetcher.fetch(url, self.skip_tls_verify).await?;
        let found = set.find(kid).cloned();
        self.cache.set(
            api_identity,
            CachedKeys::Single {
                url: url.to_string(),
                set,
            },
        );
        found.ok_or(AuthError::NoMatchingKey)
    }

    /// Multi-URL lookup over the merged key map.
    async fn resolve_from_sets(
        &self,
        api_identity: &str,
        urls: &[String],
        kid: &str,
    ) -> Result<Jwk, AuthError> {
        match self.cache.get(api_identity) {
            Some(cached @ CachedKeys::Merged { .. }) if cached.matches_urls(urls) => {
                return cached.find(kid).cloned().ok_or(AuthError::NoMatchingKeyInAnySet);
            }
            Some(CachedKeys::Merged { .. }) => {
                tracing::debug!(api_identity, "JWKS URL list changed, refetching");
            }
            Some(CachedKeys::Single { .. }) => {
                tracing::warn!(api_identity, "Unexpected cached JWKS entry, refetching");
            }
            None => {}
        }

        let mut keys: HashMap<String, Jwk> = HashMap::new();
        let mut fetched = 0usize;
        for url in urls {
            match self.fetcher.fetch(url, self.skip_tls_verify).await {
                Ok(set) => {
                    fetched += 1;
                    for jwk in set.keys {
                        if let Some(key_id) = jwk.common.key_id.clone() {
                            keys.entry(key_id).or_insert(jwk);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(api_identity, url = %url, error = %e, "Failed to fetch JWKS");
                }
            }
        }

        if fetched == 0 {
            return Err(AuthError::NoMatchingKeyInAnySet);
        }

        let found = keys.get(kid).cloned();
        self.cache.set(
            api_identity,
            CachedKeys::Merged {
                urls: urls.to_vec(),
                keys,
            },
        );
        found.ok_or(AuthError::NoMatchingKeyInAnySet)
    }
}

/// Key for an API without a source, built from the `secret` stored on the
/// key's session. The secret is used as stored: an HMAC secret, a PEM or a
/// JWK.
pub fn key_from_secret(
    api: &ApiAuthConfig,
    header: &TokenHeader,
    secret: &str,
) -> Result<ResolvedKey, AuthError> {
    let algorithm = checked_algorithm(api, header)?;
    if secret.is_empty() {
        return Err(AuthError::InvalidKeyMaterial("key has no JWT secret".into()));
    }
    let key = decoding_key_from_material(api.signing_method, secret.as_bytes())?;
    Ok(ResolvedKey { key, algorithm })
}

/// The header `alg`, provided it belongs to the API's signing family.
fn checked_algorithm(api: &ApiAuthConfig, header: &TokenHeader) -> Result<Algorithm, AuthError> {
    let algorithm = header.algorithm()?;
    if !api.signing_method.allows(algorithm) {
        tracing::debug!(
            api_id = %api.api_id,
            alg = %header.alg,
            method = ?api.signing_method,
            "Token algorithm outside configured signing family"
        );
        return Err(AuthError::UnexpectedSigningMethod);
    }
    Ok(algorithm)
}

/// Verify the signature of `token` and return its claims.
///
/// Only the signature and algorithm are checked here.
pub fn verify_signature(token: &str, key: &ResolvedKey) -> Result<TokenClaims, AuthError> {
    let mut validation = Validation::new(key.algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<TokenClaims>(token, &key.key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            JwtErrorKind::InvalidToken
            | JwtErrorKind::Base64(_)
            | JwtErrorKind::Json(_)
            | JwtErrorKind::Utf8(_) => AuthError::MalformedToken,
            _ => AuthError::InvalidSignature,
        })
}

fn classify_source(api: &ApiAuthConfig) -> Result<KeySource, AuthError> {
    if !api.jwks_uris.is_empty() {
        if !api.is_oas {
            return Err(AuthError::FeatureRequiresOas);
        }
        return Ok(KeySource::RemoteSets(api.jwks_urls()));
    }

    let source = api.source.trim();
    if source.is_empty() {
        return Err(AuthError::NoKeySource);
    }
    Ok(classify_material(source.as_bytes()))
}

fn classify_material(raw: &[u8]) -> KeySource {
    if let Some(url) = as_url(raw) {
        return KeySource::RemoteSet(url);
    }
    if pem::parse(raw).is_ok() {
        return KeySource::Inline(raw.to_vec());
    }

    match STANDARD.decode(raw) {
        Ok(decoded) => match as_url(&decoded) {
            Some(url) => KeySource::RemoteSet(url),
            None => KeySource::Inline(decoded),
        },
        Err(_) => KeySource::Inline(raw.to_vec()),
    }
}

fn as_url(raw: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(raw).ok()?.trim();
    let parsed = url::Url::parse(text).ok()?;
    matches!(parsed.scheme(), "http" | "https").then(|| text.to_string())
}

fn decoding_key_from_jwk(jwk: &Jwk) -> Result<DecodingKey, AuthError> {
    DecodingKey::from_jwk(jwk).map_err(|e| AuthError::InvalidKeyMaterial(e.to_string()))
}

fn decoding_key_from_material(
    method: SigningMethod,
    material: &[u8],
) -> Result<DecodingKey, AuthError> {
    if method != SigningMethod::Hmac {
        if let Ok(jwk) = serde_json::from_slice::<Jwk>(material) {
            return decoding_key_from_jwk(&jwk);
        }
    }

    let key = match method {
        SigningMethod::Hmac => Ok(DecodingKey::from_secret(material)),
        SigningMethod::Rsa => DecodingKey::from_rsa_pem(material),
        SigningMethod::Ecdsa => DecodingKey::from_ec_pem(material),
    };
    key.map_err(|e| AuthError::InvalidKeyMaterial(e.to_string()))
}
