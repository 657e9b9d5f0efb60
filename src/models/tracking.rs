use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::Coordinate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrackingStatus {
    Active,
    Completed,
}

/// Live record of one delivery's transit. `ended_at` is set exactly when
/// `status` is `Completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSession {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub vehicle_id: String,
    pub current_location: Coordinate,
    pub speed: Option<f64>,
    pub status: TrackingStatus,
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl TrackingSession {
    pub fn is_active(&self) -> bool {
        self.status == TrackingStatus::Active
    }
}
