//! API service error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. Clients
//! only ever see the public message; the detailed reason is logged.

use auth_core::Rejection;
use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// API service error type.
///
/// Maps to HTTP status codes:
/// - Auth: 401 Unauthorized or 403 Forbidden
/// - NotFound: 404 Not Found
/// - Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] Rejection),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Auth(rejection) => rejection.status_code(),
            ApiError::NotFound(_) => 404,
            ApiError::Internal => 500,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Auth(rejection) => {
                tracing::debug!(target: "api.errors", reason = %rejection, "Request rejected");
                (
                    StatusCode::from_u16(rejection.status_code())
                        .unwrap_or(StatusCode::UNAUTHORIZED),
                    rejection.error_code(),
                    rejection.public_message(),
                )
            }
            ApiError::NotFound(resource) => (StatusCode::NOT_FOUND, "NOT_FOUND", resource.clone()),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        if let ApiError::Auth(rejection) = &self {
            if let Some(challenge) = rejection.www_authenticate() {
                response
                    .headers_mut()
                    .insert(WWW_AUTHENTICATE, HeaderValue::from_static(challenge));
            }
        }

        response
    }
}
