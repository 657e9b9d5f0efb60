use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::geo::GeoError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    InvalidCoordinate(#[from] GeoError),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("delivery {0} not found")]
    DeliveryNotFound(Uuid),

    #[error("tracking session {0} not found")]
    SessionNotFound(Uuid),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("delivery {delivery_id} already has active tracking session {session_id}")]
    SessionAlreadyActive { delivery_id: Uuid, session_id: Uuid },

    #[error("tracking session {0} is already completed")]
    SessionAlreadyCompleted(Uuid),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(
        "outside of safe delivery zone, delivery not possible. distance from drop point: {distance_meters:.2} meters"
    )]
    GeofenceDenied { distance_meters: f64 },

    #[error("delivery {0} has no geofence configured; completion denied")]
    GeofenceUnavailable(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidCoordinate(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_)
            | AppError::GeofenceDenied { .. }
            | AppError::GeofenceUnavailable(_) => StatusCode::FORBIDDEN,
            AppError::DeliveryNotFound(_) | AppError::SessionNotFound(_) | AppError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AppError::SessionAlreadyActive { .. }
            | AppError::SessionAlreadyCompleted(_)
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Store(StoreError::Duplicate(_)) => StatusCode::CONFLICT,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            AppError::GeofenceDenied { distance_meters } => json!({
                "error": self.to_string(),
                "distance_meters": distance_meters,
            }),
            _ => json!({
                "error": self.to_string()
            }),
        };

        (status, Json(body)).into_response()
    }
}
