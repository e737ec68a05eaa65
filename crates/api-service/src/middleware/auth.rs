//! Authentication middleware for protected routes.
//!
//! - `require_auth` - verifies the bearer token and stores the [`Claims`] in
//!   request extensions
//! - `require_role` - additionally requires a realm role; stacked inside
//!   `require_auth` it reuses the stored claims instead of verifying again
//!
//! Handlers read the claims through the [`AuthenticatedUser`] extractor.

use crate::errors::ApiError;
use auth_core::{AuthorizationGate, Claims, RoleGate};
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::IntoResponse,
};
use tracing::instrument;

/// Authentication middleware.
///
/// # Response
///
/// - Returns 401 Unauthorized if the token is missing or invalid
/// - Continues to the next handler with `Claims` in extensions otherwise
#[instrument(skip_all, name = "api.middleware.auth")]
pub async fn require_auth(
    State(gate): State<AuthorizationGate>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let claims = gate.authenticate(req.headers()).await?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Role check middleware.
///
/// # Response
///
/// - Returns 401 Unauthorized if no verified claims are available and the
///   token is missing or invalid
/// - Returns 403 Forbidden if the claims lack the gate's role
/// - Continues with the same claims in extensions otherwise
#[instrument(skip_all, name = "api.middleware.role")]
pub async fn require_role(
    State(gate): State<RoleGate>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let claims = match req.extensions_mut().remove::<Claims>() {
        Some(claims) => gate.check(claims)?,
        None => gate.authorize(req.headers()).await?,
    };

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Claims of the authenticated caller.
///
/// Only available on routes behind [`require_auth`] or [`require_role`].
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(AuthenticatedUser)
            .ok_or_else(|| {
                tracing::error!(
                    target: "api.middleware.auth",
                    path = %parts.uri.path(),
                    "Handler requires claims but no auth layer ran"
                );
                ApiError::Internal
            })
    }
}
