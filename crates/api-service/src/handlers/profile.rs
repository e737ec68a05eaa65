//! Caller identity endpoints.
//!
//! All routes here sit behind `require_auth`; `/admin-only` also behind
//! `require_role("admin")`.

use crate::middleware::AuthenticatedUser;
use crate::models::{AdminResponse, ProtectedResponse, UserProfile};
use axum::Json;
use tracing::instrument;

/// Handler for GET /protected
#[instrument(skip_all, name = "api.handlers.protected")]
pub async fn protected(AuthenticatedUser(claims): AuthenticatedUser) -> Json<ProtectedResponse> {
    Json(ProtectedResponse {
        message: "Access granted to protected resource".to_string(),
        user: claims.preferred_username.clone(),
        roles: claims.roles().to_vec(),
    })
}

/// Handler for GET /profile
#[instrument(skip_all, name = "api.handlers.profile")]
pub async fn profile(AuthenticatedUser(claims): AuthenticatedUser) -> Json<UserProfile> {
    let roles = claims.roles().to_vec();

    Json(UserProfile {
        sub: claims.sub,
        email: claims.email,
        name: claims.name.or(claims.preferred_username),
        roles,
    })
}

/// Handler for GET /admin-only
#[instrument(skip_all, name = "api.handlers.admin_only")]
pub async fn admin_only(AuthenticatedUser(claims): AuthenticatedUser) -> Json<AdminResponse> {
    tracing::info!(target: "api.handlers.admin", user = ?claims.username(), "Admin access granted");

    Json(AdminResponse {
        message: "Admin access granted".to_string(),
        user: claims.preferred_username,
    })
}
