// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! JWT authentication and authorization for APIs fronted by the gateway.
//!
//! ## Auth Flow
//!
//! 1. A client calls an API with `Authorization: [Bearer ]<JWT>`
//! 2. The gateway looks up the API's security configuration and:
//!    - Resolves the verification key (inline secret/PEM/JWK, one remote
//!      key set, several remote key sets merged by `kid`, or the secret
//!      stored on the key the token names)
//!    - Verifies the signature and the `exp`/`iat`/`nbf` claims with the
//!      API's skew allowances
//!    - Extracts the caller identity (base field, then `sub`)
//!    - Resolves policies from the policy claim, a client key, the scope
//!      claim or the API defaults
//! 3. The caller's session is merged with the resolved policies and
//!    persisted, keeping usage counters across re-authentication
//!
//! ## Security
//!
//! - The token's `alg` must belong to the API's configured signing family
//! - Remote key sets are cached per API with a TTL; an unknown `kid` never
//!   triggers a refetch of a fresh set
//! - Non-OAS APIs cannot use multiple remote key sets

pub mod claims;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod identity;
pub mod jwks;
pub mod key_cache;
pub mod key_session;
pub mod keys;
pub mod middleware;
pub mod policies;
pub mod sync;
pub mod temporal;

#[cfg(test)]
pub(crate) mod testutil;

pub use claims::{TokenClaims, TokenHeader};
pub use engine::JwtAuthenticator;
pub use error::{AuthError, ErrorKind};
pub use extractor::{AuthSession, OptionalSession};
pub use jwks::{HttpKeySetFetcher, KeySetFetcher};
pub use key_cache::KeyCache;
pub use keys::KeyResolver;
pub use middleware::jwt_auth_middleware;
pub use policies::{PolicyProvenance, PolicyResolution};
pub use sync::SessionSynchronizer;
pub use temporal::ClaimSkew;
