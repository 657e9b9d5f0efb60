use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::tracking::TrackingSession;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationPayload {
    pub delivery_id: Uuid,
    pub session_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub timestamp: DateTime<Utc>,
}

impl LocationPayload {
    pub fn from_session(session: &TrackingSession) -> Self {
        Self {
            delivery_id: session.delivery_id,
            session_id: session.id,
            latitude: session.current_location.latitude,
            longitude: session.current_location.longitude,
            speed: session.speed.unwrap_or(0.0),
            timestamp: session.last_updated,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LifecyclePayload {
    pub session_id: Uuid,
    pub delivery_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

/// Everything a room subscriber can receive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum TrackingEvent {
    LiveTracking(LocationPayload),
    CustomerTracking(LocationPayload),
    TrackingStarted(LifecyclePayload),
    TrackingStopped(LifecyclePayload),
}

impl TrackingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TrackingEvent::LiveTracking(_) => "liveTracking",
            TrackingEvent::CustomerTracking(_) => "customerTracking",
            TrackingEvent::TrackingStarted(_) => "trackingStarted",
            TrackingEvent::TrackingStopped(_) => "trackingStopped",
        }
    }

    pub fn delivery_id(&self) -> Uuid {
        match self {
            TrackingEvent::LiveTracking(p) | TrackingEvent::CustomerTracking(p) => p.delivery_id,
            TrackingEvent::TrackingStarted(p) | TrackingEvent::TrackingStopped(p) => p.delivery_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_wire_names() {
        let payload = LifecyclePayload {
            session_id: Uuid::nil(),
            delivery_id: Uuid::nil(),
            timestamp: Utc::now(),
        };
        let event = TrackingEvent::TrackingStopped(payload);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], "trackingStopped");
        assert_eq!(json["event"], event.name());
        assert!(json["data"]["sessionId"].is_string());
    }
}
