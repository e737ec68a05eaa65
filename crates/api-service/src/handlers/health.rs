//! Public status endpoints.

use crate::models::{HealthResponse, ServiceStatus};
use axum::Json;

/// Handler for GET /
pub async fn root() -> Json<ServiceStatus> {
    Json(ServiceStatus {
        message: "CareTwin 3DGS API Service".to_string(),
        status: "running".to_string(),
    })
}

/// Handler for GET /health
///
/// Liveness only; does not call the identity provider.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "3dgs-api".to_string(),
    })
}
