// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use jwt_gateway_auth::{
    api::router,
    auth::{
        key_cache::DEFAULT_KEY_CACHE_CAPACITY, HttpKeySetFetcher, JwtAuthenticator, KeyCache,
        KeyResolver,
    },
    config::{load_json, ApiAuthConfig, GatewayConfig, LogFormat},
    policy::{InMemoryPolicyStore, Policy},
    session::InMemorySessionStore,
    state::{ApiRegistry, AppState},
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = GatewayConfig::from_env()?;
    init_tracing(config.log_format);

    let apis: Vec<ApiAuthConfig> = match &config.api_definitions_path {
        Some(path) => load_json(path).map_err(|e| {
            error!(error = %e, "Failed to load API definitions");
            e
        })?,
        None => {
            warn!("API_DEFINITIONS_PATH not set, no APIs will be served");
            Vec::new()
        }
    };
    let policies: Vec<Policy> = match &config.policies_path {
        Some(path) => load_json(path).map_err(|e| {
            error!(error = %e, "Failed to load policies");
            e
        })?,
        None => Vec::new(),
    };
    info!(apis = apis.len(), policies = policies.len(), "Configuration loaded");

    if config.jwt_ssl_insecure_skip_verify {
        warn!("TLS verification disabled for key-set fetches");
    }

    let fetcher = HttpKeySetFetcher::new(config.jwks_fetch_timeout)?;
    let keys = KeyResolver::new(
        Arc::new(KeyCache::new(DEFAULT_KEY_CACHE_CAPACITY, config.jwks_cache_ttl)),
        Arc::new(fetcher),
    )
    .with_skip_tls_verify(config.jwt_ssl_insecure_skip_verify);

    let authenticator = JwtAuthenticator::new(
        keys,
        Arc::new(InMemorySessionStore::new()),
        Arc::new(InMemoryPolicyStore::with_policies(policies)),
    );
    let state = AppState::new(authenticator, ApiRegistry::from_configs(apis));
    let app = router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "JWT gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shut down");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
