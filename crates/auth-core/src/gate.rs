//! Request authorization, independent of any web framework.
//!
//! [`AuthorizationGate`] turns an `Authorization: Bearer <token>` header into
//! verified [`Claims`]; [`RoleGate`] additionally requires a realm role.
//! Both return a [`Rejection`] that the hosting service maps to 401 or 403.
//!
//! Per request:
//!
//! ```text
//! no header / other scheme ---------------------------> Unauthenticated
//! bearer token -> verify -> failure ------------------> Unauthenticated
//!                        -> claims -> role missing ----> Forbidden
//!                                  -> role present ----> claims (unchanged)
//! ```
//!
//! Requests without a bearer token never reach the verifier.

use crate::claims::Claims;
use crate::jwt::{TokenVerifier, VerificationError};
use http::header::AUTHORIZATION;
use http::HeaderMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Why a request is not authenticated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnauthenticatedReason {
    #[error("missing bearer token")]
    MissingCredentials,

    #[error("authorization scheme is not Bearer")]
    InvalidScheme,

    #[error("token rejected: {0}")]
    InvalidToken(VerificationError),
}

/// Outcome of a failed authorization check.
///
/// The detailed reason is for logs only; [`Rejection::public_message`] is
/// what clients see.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("unauthenticated: {0}")]
    Unauthenticated(UnauthenticatedReason),

    #[error("missing required role {role}")]
    Forbidden { role: String },
}

impl Rejection {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthenticated(_) => 401,
            Self::Forbidden { .. } => 403,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "INVALID_TOKEN",
            Self::Forbidden { .. } => "FORBIDDEN",
        }
    }

    /// Client-facing message. Every token failure reads the same.
    pub fn public_message(&self) -> String {
        match self {
            Self::Unauthenticated(
                UnauthenticatedReason::MissingCredentials | UnauthenticatedReason::InvalidScheme,
            ) => "missing bearer token".to_string(),
            Self::Unauthenticated(UnauthenticatedReason::InvalidToken(_)) => {
                "invalid or expired token".to_string()
            }
            Self::Forbidden { role } => format!("Required role '{role}' not found"),
        }
    }

    /// `WWW-Authenticate` challenge for 401 responses.
    pub fn www_authenticate(&self) -> Option<&'static str> {
        match self {
            Self::Unauthenticated(UnauthenticatedReason::InvalidToken(_)) => {
                Some(r#"Bearer error="invalid_token""#)
            }
            Self::Unauthenticated(_) => Some("Bearer"),
            Self::Forbidden { .. } => None,
        }
    }
}

/// Authenticates requests carrying a bearer token.
#[derive(Clone)]
pub struct AuthorizationGate {
    verifier: Arc<dyn TokenVerifier>,
}

impl AuthorizationGate {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier }
    }

    /// Extract the token from `Authorization: Bearer <token>`.
    ///
    /// The scheme is matched case-insensitively.
    ///
    /// # Errors
    ///
    /// - `MissingCredentials` if the header is absent or the token is empty
    /// - `InvalidScheme` for any other scheme or a non-ASCII header
    pub fn bearer_token(headers: &HeaderMap) -> Result<&str, UnauthenticatedReason> {
        let value = headers
            .get(AUTHORIZATION)
            .ok_or(UnauthenticatedReason::MissingCredentials)?
            .to_str()
            .map_err(|_| UnauthenticatedReason::InvalidScheme)?;

        let (scheme, token) = value.trim().split_once(' ').unwrap_or((value.trim(), ""));
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(UnauthenticatedReason::InvalidScheme);
        }

        let token = token.trim();
        if token.is_empty() {
            return Err(UnauthenticatedReason::MissingCredentials);
        }
        Ok(token)
    }

    /// Authenticate a request from its headers.
    ///
    /// # Errors
    ///
    /// `Rejection::Unauthenticated` for a missing, non-bearer or invalid token.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Claims, Rejection> {
        let token = Self::bearer_token(headers).map_err(|reason| {
            tracing::debug!(target: "auth.gate", reason = %reason, "No usable bearer token");
            Rejection::Unauthenticated(reason)
        })?;

        self.verifier.verify(token).await.map_err(|e| {
            tracing::debug!(target: "auth.gate", error = %e, "Bearer token rejected");
            Rejection::Unauthenticated(UnauthenticatedReason::InvalidToken(e))
        })
    }

    /// A gate that also requires `role` in `realm_access.roles`.
    pub fn require_role(&self, role: impl Into<String>) -> RoleGate {
        RoleGate {
            gate: self.clone(),
            role: role.into(),
        }
    }
}

/// Authenticates and then requires a realm role.
#[derive(Clone)]
pub struct RoleGate {
    gate: AuthorizationGate,
    role: String,
}

impl RoleGate {
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Authenticate, then check the role.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` from the inner gate, or `Forbidden` without the role.
    pub async fn authorize(&self, headers: &HeaderMap) -> Result<Claims, Rejection> {
        let claims = self.gate.authenticate(headers).await?;
        self.check(claims)
    }

    /// Check the role on already-verified claims, passing them through
    /// unchanged on success.
    ///
    /// # Errors
    ///
    /// `Rejection::Forbidden` naming the role.
    pub fn check(&self, claims: Claims) -> Result<Claims, Rejection> {
        if claims.has_role(&self.role) {
            Ok(claims)
        } else {
            tracing::debug!(target: "auth.gate", role = %self.role, "Required role missing");
            Err(Rejection::Forbidden {
                role: self.role.clone(),
            })
        }
    }
}
