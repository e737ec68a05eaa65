//! HTTP routes for the API service.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_auth, require_role};
use auth_core::AuthorizationGate;
use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Role required for `GET /admin-only`.
pub const ADMIN_ROLE: &str = "admin";

/// Role required for `POST /models`.
pub const API_USER_ROLE: &str = "api_user";

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Bearer token gate backed by the realm's key set.
    pub gate: AuthorizationGate,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/`, `/health` - Service status and liveness - public
/// - `/metrics` - Prometheus metrics endpoint - public
/// - `/protected`, `/profile` - Caller identity - authenticated
/// - `/admin-only` - authenticated, role `admin`
/// - `/models` - GET authenticated, POST role `api_user`
/// - `/models/:model_id` - authenticated
/// - CORS for the configured browser origins
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let admin_gate = state.gate.require_role(ADMIN_ROLE);
    let api_user_gate = state.gate.require_role(API_USER_ROLE);

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check));

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Protected routes (authentication required). Role layers sit inside
    // require_auth and reuse the claims it verified.
    let protected_routes = Router::new()
        .route("/protected", get(handlers::protected))
        .route("/profile", get(handlers::profile))
        .route(
            "/admin-only",
            get(handlers::admin_only)
                .route_layer(middleware::from_fn_with_state(admin_gate, require_role)),
        )
        .route(
            "/models",
            get(handlers::list_models).merge(
                post(handlers::create_model)
                    .route_layer(middleware::from_fn_with_state(api_user_gate, require_role)),
            ),
        )
        .route("/models/:model_id", get(handlers::get_model))
        .route_layer(middleware::from_fn_with_state(
            state.gate.clone(),
            require_auth,
        ));

    // Layer order (bottom-to-top execution):
    // 1. CorsLayer - Answer preflights before auth runs (innermost)
    // 2. TraceLayer - Log request details
    // 3. TimeoutLayer - Timeout the request
    // 4. http_metrics_middleware - Record ALL responses (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(cors_layer(&state.config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}

/// CORS for browser clients sending credentials from `origins`.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(target: "api.routes", origin = %origin, error = %e, "Ignoring CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}
