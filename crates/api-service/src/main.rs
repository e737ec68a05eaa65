//! CareTwin 3DGS API Service
//!
//! Serves the 3DGS model API behind bearer token authentication against the
//! CareTwin Keycloak realm.

use api_service::config::Config;
use api_service::observability::metrics::init_metrics_recorder;
use api_service::routes::{self, AppState};
use auth_core::{AuthorizationGate, JwtVerifier, KeySetCache};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting API service");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        issuer = %config.provider.issuer(),
        client_id = %config.provider.client_id(),
        jwks_cache_ttl_seconds = config.jwks_cache_ttl.as_secs(),
        expiry_leeway_seconds = config.expiry_leeway.as_secs(),
        "Configuration loaded successfully"
    );

    // Initialize Prometheus metrics recorder before anything records
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    // Key set cache and verifier for the configured realm
    let key_set = Arc::new(
        KeySetCache::from_provider(&config.provider, config.provider_http_timeout)
            .map_err(|e| {
                error!("Failed to create JWKS client: {}", e);
                e
            })?
            .with_max_age(Some(config.jwks_cache_ttl)),
    );

    // Warm the cache; an unreachable provider is not fatal since keys are
    // fetched again on the first request.
    match key_set.refresh().await {
        Ok(()) => info!(
            certs_url = %key_set.certs_url(),
            keys = key_set.key_ids().await.len(),
            "Signing keys loaded"
        ),
        Err(e) => warn!(
            certs_url = %key_set.certs_url(),
            error = %e,
            "Initial signing key fetch failed, continuing"
        ),
    }

    let verifier = JwtVerifier::from_provider(Arc::clone(&key_set), &config.provider)
        .with_expiry_leeway(config.expiry_leeway);
    let gate = AuthorizationGate::new(Arc::new(verifier));

    // Parse bind address before moving config
    let bind_address = config.bind_address.clone();
    let drain = config.drain;

    let state = Arc::new(AppState { config, gate });

    // Build application routes
    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("API service listening on {}", addr);

    // Start server with graceful shutdown support
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(drain))
        .await?;

    info!("API service shutdown complete");

    Ok(())
}

/// Install the global subscriber. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "api=debug,auth=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and the drain period is complete.
async fn shutdown_signal(drain: Duration) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    if drain.is_zero() {
        info!("Skipping drain period (API_DRAIN_SECONDS=0)");
    } else {
        warn!("Draining connections for {} seconds...", drain.as_secs());
        tokio::time::sleep(drain).await;
        info!("Drain period complete");
    }
}
