//! 3DGS model catalogue.
//!
//! The catalogue is a fixed sample; created models are echoed back and not
//! stored.

use crate::errors::ApiError;
use crate::middleware::AuthenticatedUser;
use crate::models::{ModelCreated, ModelData, ModelList};
use axum::{extract::Path, Json};
use tracing::instrument;

fn sample_models() -> Vec<ModelData> {
    vec![
        ModelData {
            id: "model_1".to_string(),
            name: "Sample Building".to_string(),
            description: "3D scan of a sample building".to_string(),
            file_path: "/models/building_001.ply".to_string(),
        },
        ModelData {
            id: "model_2".to_string(),
            name: "Interior Room".to_string(),
            description: "Interior room scan".to_string(),
            file_path: "/models/room_001.ply".to_string(),
        },
    ]
}

/// Handler for GET /models
#[instrument(skip_all, name = "api.handlers.list_models")]
pub async fn list_models(AuthenticatedUser(claims): AuthenticatedUser) -> Json<ModelList> {
    tracing::debug!(target: "api.handlers.models", user = ?claims.username(), "Listing models");

    Json(ModelList {
        models: sample_models(),
    })
}

/// Handler for POST /models
///
/// Requires the `api_user` role (enforced by the route layer).
#[instrument(skip_all, name = "api.handlers.create_model")]
pub async fn create_model(
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(model): Json<ModelData>,
) -> Json<ModelCreated> {
    tracing::info!(
        target: "api.handlers.models",
        model_id = %model.id,
        user = ?claims.username(),
        "Model created"
    );

    Json(ModelCreated {
        message: "Model created successfully".to_string(),
        model,
        created_by: claims.preferred_username,
    })
}

/// Handler for GET /models/:model_id
///
/// Only the first sample model is addressable; the rest of the catalogue is
/// listed but not served individually.
///
/// # Errors
///
/// Returns `ApiError::NotFound` for any other id.
#[instrument(skip_all, name = "api.handlers.get_model")]
pub async fn get_model(
    Path(model_id): Path<String>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> Result<Json<ModelData>, ApiError> {
    sample_models()
        .into_iter()
        .next()
        .filter(|model| model.id == model_id)
        .map(Json)
        .ok_or_else(|| {
            tracing::debug!(target: "api.handlers.models", model_id = %model_id, "Model not found");
            ApiError::NotFound("Model not found".to_string())
        })
}
