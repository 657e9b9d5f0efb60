use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoFenceArea;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryStatus {
    Pending,
    InTransit,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    /// Business identifier supplied by the dispatcher, unique across deliveries.
    pub reference: String,
    pub driver_id: Option<Uuid>,
    pub customer_name: String,
    pub customer_phone: String,
    pub delivery_address: String,
    pub geofence: Option<GeoFenceArea>,
    pub status: DeliveryStatus,
    pub within_geofence: bool,
    pub proof_of_delivery: Option<String>,
    pub trip_started_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    pub fn mark_in_transit(&mut self, at: DateTime<Utc>) {
        self.status = DeliveryStatus::InTransit;
        if self.trip_started_at.is_none() {
            self.trip_started_at = Some(at);
        }
        self.updated_at = at;
    }

    pub fn mark_delivered(&mut self, at: DateTime<Utc>) {
        self.status = DeliveryStatus::Delivered;
        if self.delivered_at.is_none() {
            self.delivered_at = Some(at);
        }
        self.updated_at = at;
    }
}
