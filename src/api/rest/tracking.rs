use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::auth::{Caller, Role};
use crate::error::AppError;
use crate::models::tracking::TrackingSession;
use crate::state::AppState;
use crate::tracking::{LocationReport, LocationTarget};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tracking/start", post(start_tracking))
        .route("/tracking/active", get(list_active))
        .route(
            "/tracking/:id",
            get(get_session).delete(delete_session),
        )
        .route("/tracking/:id/location", put(update_location))
        .route("/tracking/:id/stop", put(stop_tracking))
}

#[derive(Deserialize)]
pub struct StartTrackingRequest {
    #[serde(alias = "deliveryId")]
    pub delivery_id: Uuid,
    #[serde(alias = "vehicleId")]
    pub vehicle_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed: Option<f64>,
    #[serde(alias = "recordedAt")]
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct UpdateLocationResponse {
    pub applied: bool,
    pub session: TrackingSession,
}

const VIEW_ACTIVE: &[Role] = &[Role::Admin, Role::Manager, Role::Dispatcher, Role::Operator];
const VIEW_ONE: &[Role] = &[Role::Admin, Role::Manager, Role::Dispatcher, Role::Driver];

async fn start_tracking(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<StartTrackingRequest>,
) -> Result<Json<TrackingSession>, AppError> {
    caller.require(&[Role::Driver])?;

    let session = state
        .gateway
        .start_tracking(
            payload.delivery_id,
            payload.vehicle_id,
            payload.latitude,
            payload.longitude,
        )
        .await?;
    Ok(Json(session))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<UpdateLocationResponse>, AppError> {
    caller.require(&[Role::Driver])?;

    let outcome = state
        .gateway
        .ingest(LocationReport {
            target: LocationTarget::Session(id),
            latitude: payload.latitude,
            longitude: payload.longitude,
            speed: payload.speed,
            recorded_at: payload.recorded_at,
        })
        .await?;

    Ok(Json(UpdateLocationResponse {
        applied: outcome.is_applied(),
        session: outcome.session().clone(),
    }))
}

async fn stop_tracking(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<TrackingSession>, AppError> {
    caller.require(&[Role::Driver])?;
    Ok(Json(state.gateway.stop_tracking(id).await?))
}

async fn list_active(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Vec<TrackingSession>>, AppError> {
    caller.require(VIEW_ACTIVE)?;
    Ok(Json(state.sessions.list_active().await?))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<TrackingSession>, AppError> {
    caller.require(VIEW_ONE)?;
    Ok(Json(state.sessions.get(id).await?))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<TrackingSession>, AppError> {
    caller.require(&[Role::Admin])?;
    Ok(Json(state.sessions.delete(id).await?))
}
