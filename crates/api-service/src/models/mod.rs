//! Request and response types for the API service.

use serde::{Deserialize, Serialize};

/// Response for `GET /`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub message: String,
    pub status: String,
}

/// Response for `GET /health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

/// Response for `GET /protected`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProtectedResponse {
    pub message: String,
    /// `preferred_username` of the caller, if the token carries one.
    pub user: Option<String>,
    pub roles: Vec<String>,
}

/// Response for `GET /profile`.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserProfile {
    pub sub: String,
    pub email: Option<String>,
    /// Display name, falling back to `preferred_username`.
    pub name: Option<String>,
    pub roles: Vec<String>,
}

/// Response for `GET /admin-only`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AdminResponse {
    pub message: String,
    pub user: Option<String>,
}

/// A 3D Gaussian Splatting model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelData {
    pub id: String,
    pub name: String,
    pub description: String,
    pub file_path: String,
}

/// Response for `GET /models`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelList {
    pub models: Vec<ModelData>,
}

/// Response for `POST /models`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelCreated {
    pub message: String,
    pub model: ModelData,
    pub created_by: Option<String>,
}
