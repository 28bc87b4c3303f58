// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Configuration
//!
//! Two layers live here:
//!
//! - [`ApiAuthConfig`]: per-API security configuration, owned by whoever
//!   loads API definitions and read-only to the engine.
//! - [`GatewayConfig`]: process settings for the binary, loaded from the
//!   environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `API_DEFINITIONS_PATH` | JSON array of API auth configs | none (no APIs) |
//! | `POLICIES_PATH` | JSON array of policies | none (no policies) |
//! | `JWKS_CACHE_TTL_SECS` | Remote key cache TTL | `300` |
//! | `JWKS_FETCH_TIMEOUT_SECS` | Timeout of a single key-set fetch | `10` |
//! | `JWT_SSL_INSECURE_SKIP_VERIFY` | Skip TLS verification for key-set fetches | `false` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use jsonwebtoken::Algorithm;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::auth::temporal::ClaimSkew;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const API_DEFINITIONS_PATH_ENV: &str = "API_DEFINITIONS_PATH";
pub const POLICIES_PATH_ENV: &str = "POLICIES_PATH";
pub const JWKS_CACHE_TTL_ENV: &str = "JWKS_CACHE_TTL_SECS";
pub const JWKS_FETCH_TIMEOUT_ENV: &str = "JWKS_FETCH_TIMEOUT_SECS";
pub const JWT_SSL_INSECURE_SKIP_VERIFY_ENV: &str = "JWT_SSL_INSECURE_SKIP_VERIFY";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_JWKS_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_JWKS_FETCH_TIMEOUT_SECS: u64 = 10;

/// Claim read for scopes when none is configured.
pub const DEFAULT_SCOPE_CLAIM: &str = "scope";

/// Signing algorithm family an API accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningMethod {
    #[default]
    Hmac,
    Rsa,
    Ecdsa,
}

impl SigningMethod {
    /// Whether `alg` belongs to this family.
    pub fn allows(self, alg: Algorithm) -> bool {
        use Algorithm::*;
        match self {
            SigningMethod::Hmac => matches!(alg, HS256 | HS384 | HS512),
            SigningMethod::Rsa => matches!(alg, RS256 | RS384 | RS512 | PS256 | PS384 | PS512),
            SigningMethod::Ecdsa => matches!(alg, ES256 | ES384),
        }
    }
}

/// One remote key-set location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwksUri {
    pub url: String,
}

/// Per-API JWT security configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiAuthConfig {
    pub api_id: String,
    pub org_id: String,
    pub name: String,
    /// OAS-style definition; required for multiple key-set URLs
    pub is_oas: bool,
    pub signing_method: SigningMethod,
    /// Inline secret, PEM, base64-wrapped material or a key-set URL
    pub source: String,
    /// Remote key sets; takes precedence over `source` when non-empty
    pub jwks_uris: Vec<JwksUri>,
    /// Claim holding the caller identity; empty means `sub`
    pub identity_base_field: String,
    /// Ignore the header `kid` when looking up a per-key secret
    pub skip_kid: bool,
    /// Claim naming an existing key whose policies the token inherits
    pub client_id_base_field: String,
    /// Claim holding policy ids; empty disables claim-provided policies
    pub policy_field_name: String,
    pub default_policies: Vec<String>,
    /// Claim holding scopes; empty means `scope`. Dotted paths allowed.
    pub scope_claim_name: String,
    pub scope_to_policy: HashMap<String, String>,
    pub claim_skew: ClaimSkew,
    pub idp_client_id_mapping_disabled: bool,
}

impl ApiAuthConfig {
    /// Cache key for this API: org id and API id joined by `:`.
    pub fn api_identity(&self) -> String {
        format!("{}:{}", self.org_id, self.api_id)
    }

    /// Whether a verification key is configured on the API itself. Without
    /// one, each key's own session carries its secret.
    pub fn has_key_source(&self) -> bool {
        !self.jwks_uris.is_empty() || !self.source.trim().is_empty()
    }

    pub fn scope_claim(&self) -> &str {
        if self.scope_claim_name.is_empty() {
            DEFAULT_SCOPE_CLAIM
        } else {
            &self.scope_claim_name
        }
    }

    pub fn jwks_urls(&self) -> Vec<String> {
        self.jwks_uris.iter().map(|u| u.url.clone()).collect()
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}")]
    InvalidValue { var: &'static str, value: String },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Process configuration of the gateway binary.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub api_definitions_path: Option<PathBuf>,
    pub policies_path: Option<PathBuf>,
    pub jwks_cache_ttl: Duration,
    pub jwks_fetch_timeout: Duration,
    pub jwt_ssl_insecure_skip_verify: bool,
    pub log_format: LogFormat,
}

impl GatewayConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load using `lookup` to resolve variable names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_or(&lookup, PORT_ENV, DEFAULT_PORT)?;
        let ttl = parse_or(&lookup, JWKS_CACHE_TTL_ENV, DEFAULT_JWKS_CACHE_TTL_SECS)?;
        let timeout = parse_or(&lookup, JWKS_FETCH_TIMEOUT_ENV, DEFAULT_JWKS_FETCH_TIMEOUT_SECS)?;
        let skip_verify = parse_or(&lookup, JWT_SSL_INSECURE_SKIP_VERIFY_ENV, false)?;

        let log_format = match lookup(LOG_FORMAT_ENV).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    var: LOG_FORMAT_ENV,
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            host,
            port,
            api_definitions_path: lookup(API_DEFINITIONS_PATH_ENV).map(PathBuf::from),
            policies_path: lookup(POLICIES_PATH_ENV).map(PathBuf::from),
            jwks_cache_ttl: Duration::from_secs(ttl),
            jwks_fetch_timeout: Duration::from_secs(timeout),
            jwt_ssl_insecure_skip_verify: skip_verify,
            log_format,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value }),
    }
}

/// Read a JSON document from `path`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
