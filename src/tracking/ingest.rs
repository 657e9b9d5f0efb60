use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::broadcast::Broadcaster;
use crate::error::AppError;
use crate::geo::Coordinate;
use crate::models::tracking::TrackingSession;
use crate::observability::metrics::Metrics;
use crate::tracking::session::{LocationOutcome, SessionManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationTarget {
    Session(Uuid),
    /// Resolved to the delivery's active session.
    Delivery(Uuid),
}

#[derive(Debug, Clone)]
pub struct LocationReport {
    pub target: LocationTarget,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed: Option<f64>,
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Builds a coordinate from loosely-typed request fields.
pub fn require_coordinate(
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> Result<Coordinate, AppError> {
    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Ok(Coordinate::new(latitude, longitude)?),
        _ => Err(AppError::Validation(
            "latitude and longitude are required".to_string(),
        )),
    }
}

/// Boundary for every inbound tracking operation, HTTP or websocket.
/// Drives session state and then fans out to subscribers.
#[derive(Clone)]
pub struct TrackingGateway {
    sessions: Arc<SessionManager>,
    broadcaster: Broadcaster,
    metrics: Metrics,
}

impl TrackingGateway {
    pub fn new(sessions: Arc<SessionManager>, broadcaster: Broadcaster, metrics: Metrics) -> Self {
        Self {
            sessions,
            broadcaster,
            metrics,
        }
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub async fn start_tracking(
        &self,
        delivery_id: Uuid,
        vehicle_id: String,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<TrackingSession, AppError> {
        let location = require_coordinate(latitude, longitude)?;
        let session = self.sessions.start(delivery_id, vehicle_id, location).await?;
        self.broadcaster.tracking_started(&session);
        Ok(session)
    }

    pub async fn ingest(&self, report: LocationReport) -> Result<LocationOutcome, AppError> {
        let start = Instant::now();
        let result = self.apply(report).await;

        let outcome = match &result {
            Ok(LocationOutcome::Applied(_)) => "applied",
            Ok(LocationOutcome::Stale(_)) => "stale",
            Err(_) => "rejected",
        };
        self.metrics
            .location_updates_total
            .with_label_values(&[outcome])
            .inc();
        self.metrics
            .ingest_latency_seconds
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());

        if let Err(err) = &result {
            debug!(error = %err, "location update rejected");
        }
        result
    }

    pub async fn stop_tracking(&self, session_id: Uuid) -> Result<TrackingSession, AppError> {
        let session = self.sessions.stop(session_id).await?;
        self.broadcaster.tracking_stopped(&session);
        Ok(session)
    }

    async fn apply(&self, report: LocationReport) -> Result<LocationOutcome, AppError> {
        let location = require_coordinate(report.latitude, report.longitude)?;
        let session_id = self.resolve(report.target)?;

        // published under the session lock; delayed publication runs detached
        let outcome = self
            .sessions
            .update_location_with(
                session_id,
                location,
                report.speed,
                report.recorded_at,
                |session| drop(self.broadcaster.location_updated(session)),
            )
            .await?;

        if let LocationOutcome::Stale(session) = &outcome {
            warn!(
                session_id = %session.id,
                delivery_id = %session.delivery_id,
                "out-of-order location update dropped"
            );
        }

        Ok(outcome)
    }

    fn resolve(&self, target: LocationTarget) -> Result<Uuid, AppError> {
        match target {
            LocationTarget::Session(id) => Ok(id),
            LocationTarget::Delivery(delivery_id) => self
                .sessions
                .active_for_delivery(delivery_id)
                .ok_or_else(|| {
                    AppError::NotFound(format!(
                        "delivery {delivery_id} has no active tracking session"
                    ))
                }),
        }
    }
}
