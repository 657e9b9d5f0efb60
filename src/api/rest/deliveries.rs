use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post, put};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api::rest::auth::{Caller, Role};
use crate::error::AppError;
use crate::gate::AuthorizationResult;
use crate::geo::{Coordinate, GeoFenceArea};
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::state::AppState;
use crate::tracking::ingest::require_coordinate;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", post(create_delivery).get(list_deliveries))
        .route("/deliveries/:id", get(get_delivery))
        .route("/deliveries/:id/assign", put(assign_driver))
        .route("/deliveries/:id/status", patch(update_delivery_status))
        .route("/deliveries/:id/geofence", post(check_geofence))
        .route("/deliveries/:id/complete", put(complete_delivery))
        .route("/deliveries/:id/proof", post(upload_proof))
}

#[derive(Deserialize)]
pub struct GeoFenceRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: Option<f64>,
}

#[derive(Deserialize)]
pub struct CreateDeliveryRequest {
    pub reference: String,
    pub driver_id: Option<Uuid>,
    pub customer_name: String,
    pub customer_phone: String,
    pub delivery_address: String,
    pub geofence: Option<GeoFenceRequest>,
}

#[derive(Deserialize)]
pub struct AssignDriverRequest {
    pub driver_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DeliveryStatus,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Deserialize)]
pub struct DriverLocationRequest {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Deserialize)]
pub struct ProofRequest {
    pub proof_url: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

const MANAGE: &[Role] = &[Role::Admin, Role::Manager, Role::Dispatcher];
const VIEW_ALL: &[Role] = &[Role::Admin, Role::Manager, Role::Dispatcher, Role::Operator];
const VIEW_ONE: &[Role] = &[
    Role::Admin,
    Role::Manager,
    Role::Dispatcher,
    Role::Operator,
    Role::Driver,
];
const GEOFENCE_CHECK: &[Role] = &[Role::Driver, Role::Dispatcher, Role::Operator];

async fn create_delivery(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<CreateDeliveryRequest>,
) -> Result<Json<Delivery>, AppError> {
    caller.require(MANAGE)?;

    let required = [
        ("reference", &payload.reference),
        ("customer_name", &payload.customer_name),
        ("customer_phone", &payload.customer_phone),
        ("delivery_address", &payload.delivery_address),
    ];
    if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
        return Err(AppError::Validation(format!("{field} cannot be empty")));
    }

    let geofence = payload
        .geofence
        .map(|fence| {
            let center = Coordinate::new(fence.latitude, fence.longitude)?;
            let radius = fence
                .radius_meters
                .unwrap_or(state.config.geofence_radius_meters);
            GeoFenceArea::new(center, radius)
        })
        .transpose()?;

    let now = Utc::now();
    let delivery = Delivery {
        id: Uuid::new_v4(),
        reference: payload.reference.trim().to_string(),
        driver_id: payload.driver_id,
        customer_name: payload.customer_name,
        customer_phone: payload.customer_phone,
        delivery_address: payload.delivery_address,
        geofence,
        status: DeliveryStatus::Pending,
        within_geofence: false,
        proof_of_delivery: None,
        trip_started_at: None,
        delivered_at: None,
        created_at: now,
        updated_at: now,
    };

    state.deliveries.insert_delivery(delivery.clone()).await?;
    info!(delivery_id = %delivery.id, reference = %delivery.reference, "delivery created");

    Ok(Json(delivery))
}

async fn list_deliveries(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Vec<Delivery>>, AppError> {
    caller.require(VIEW_ALL)?;

    let mut deliveries = state.deliveries.list_deliveries().await?;
    deliveries.sort_by_key(|delivery| delivery.created_at);
    Ok(Json(deliveries))
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, AppError> {
    caller.require(VIEW_ONE)?;
    Ok(Json(load(&state, id).await?))
}

async fn assign_driver(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignDriverRequest>,
) -> Result<Json<Delivery>, AppError> {
    caller.require(MANAGE)?;

    let driver_id = payload
        .driver_id
        .ok_or_else(|| AppError::Validation("driver_id is required".to_string()))?;

    let mut delivery = load(&state, id).await?;
    delivery.driver_id = Some(driver_id);
    delivery.updated_at = Utc::now();
    state.deliveries.update_delivery(delivery.clone()).await?;

    Ok(Json(delivery))
}

async fn update_delivery_status(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Delivery>, AppError> {
    caller.require(&[Role::Driver])?;

    let mut delivery = load(&state, id).await?;
    let now = Utc::now();

    match payload.status {
        DeliveryStatus::Delivered => {
            let location = require_coordinate(payload.latitude, payload.longitude)?;
            state.gate.check(&delivery, &location)?.require(id)?;
            delivery.within_geofence = true;
            delivery.mark_delivered(now);
        }
        DeliveryStatus::InTransit => delivery.mark_in_transit(now),
        status => {
            delivery.status = status;
            delivery.updated_at = now;
        }
    }

    state.deliveries.update_delivery(delivery.clone()).await?;
    Ok(Json(delivery))
}

async fn check_geofence(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverLocationRequest>,
) -> Result<Json<AuthorizationResult>, AppError> {
    caller.require(GEOFENCE_CHECK)?;

    let location = require_coordinate(payload.latitude, payload.longitude)?;
    let result = state.gate.authorize_completion(id, &location).await?;
    Ok(Json(result))
}

async fn complete_delivery(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverLocationRequest>,
) -> Result<Json<Delivery>, AppError> {
    caller.require(&[Role::Driver])?;

    let location = require_coordinate(payload.latitude, payload.longitude)?;
    let mut delivery = load(&state, id).await?;
    let distance = state.gate.check(&delivery, &location)?.require(id)?;

    delivery.within_geofence = true;
    delivery.mark_delivered(Utc::now());
    state.deliveries.update_delivery(delivery.clone()).await?;

    info!(delivery_id = %id, distance_meters = distance, "delivery completed");
    Ok(Json(delivery))
}

async fn upload_proof(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProofRequest>,
) -> Result<Json<Delivery>, AppError> {
    caller.require(&[Role::Driver])?;

    if payload.proof_url.trim().is_empty() {
        return Err(AppError::Validation("proof_url cannot be empty".to_string()));
    }

    let location = require_coordinate(payload.latitude, payload.longitude)?;
    let mut delivery = load(&state, id).await?;
    state.gate.check(&delivery, &location)?.require(id)?;

    delivery.proof_of_delivery = Some(payload.proof_url.trim().to_string());
    delivery.within_geofence = true;
    delivery.mark_delivered(Utc::now());
    state.deliveries.update_delivery(delivery.clone()).await?;

    info!(delivery_id = %id, "proof of delivery recorded");
    Ok(Json(delivery))
}

async fn load(state: &AppState, id: Uuid) -> Result<Delivery, AppError> {
    state
        .deliveries
        .get_delivery(id)
        .await?
        .ok_or(AppError::DeliveryNotFound(id))
}
