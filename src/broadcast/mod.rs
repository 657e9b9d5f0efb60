//! Dual-channel fan-out of tracking events.
//!
//! The immediate channel serves drivers, dispatchers and operators. The
//! delayed channel re-publishes every location update to customers after
//! the configured delay. Delayed publications are independent timers: they
//! are neither coalesced nor cancelled, so a customer may still receive a
//! position after `trackingStopped` has been emitted.

mod hub;

pub use hub::RoomHub;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::event::{LifecyclePayload, LocationPayload, TrackingEvent};
use crate::models::tracking::TrackingSession;
use crate::observability::metrics::Metrics;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("no subscribers in room {0}")]
    NoSubscribers(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Transport seam. Anything that can deliver an event to the subscribers of
/// a named room can back the broadcaster.
pub trait Publisher: Send + Sync {
    /// Returns the number of subscribers the event was handed to.
    fn publish(&self, room: &str, event: TrackingEvent) -> Result<usize, PublishError>;
}

/// Who a room serves. Operations rooms carry live positions; customer rooms
/// carry the delayed positions. Lifecycle events go to both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Operations,
    Customer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Immediate,
    Delayed,
}

impl Channel {
    fn label(self) -> &'static str {
        match self {
            Channel::Immediate => "immediate",
            Channel::Delayed => "delayed",
        }
    }
}

#[derive(Clone)]
pub struct Broadcaster {
    publisher: Arc<dyn Publisher>,
    customer_delay: Duration,
    room_prefix: String,
    metrics: Metrics,
}

impl Broadcaster {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        customer_delay: Duration,
        room_prefix: impl Into<String>,
        metrics: Metrics,
    ) -> Self {
        Self {
            publisher,
            customer_delay,
            room_prefix: room_prefix.into(),
            metrics,
        }
    }

    pub fn room_for(&self, delivery_id: Uuid, audience: Audience) -> String {
        match audience {
            Audience::Operations => format!("{}{}", self.room_prefix, delivery_id),
            Audience::Customer => format!("{}{}:customer", self.room_prefix, delivery_id),
        }
    }

    /// Publishes the location on the immediate channel and schedules the
    /// same payload on the delayed channel. The returned handle may be
    /// dropped; the delayed publication still fires.
    pub fn location_updated(&self, session: &TrackingSession) -> JoinHandle<()> {
        let payload = LocationPayload::from_session(session);
        let operations = self.room_for(payload.delivery_id, Audience::Operations);
        let customer = self.room_for(payload.delivery_id, Audience::Customer);

        self.publish_now(
            Channel::Immediate,
            &operations,
            TrackingEvent::LiveTracking(payload.clone()),
        );
        self.schedule_customer(customer, payload)
    }

    pub fn tracking_started(&self, session: &TrackingSession) {
        let event = TrackingEvent::TrackingStarted(LifecyclePayload {
            session_id: session.id,
            delivery_id: session.delivery_id,
            timestamp: session.started_at,
        });
        self.publish_lifecycle(session.delivery_id, event);
    }

    pub fn tracking_stopped(&self, session: &TrackingSession) {
        let event = TrackingEvent::TrackingStopped(LifecyclePayload {
            session_id: session.id,
            delivery_id: session.delivery_id,
            timestamp: session.ended_at.unwrap_or_else(Utc::now),
        });
        self.publish_lifecycle(session.delivery_id, event);
    }

    fn publish_lifecycle(&self, delivery_id: Uuid, event: TrackingEvent) {
        for audience in [Audience::Operations, Audience::Customer] {
            self.publish_now(
                Channel::Immediate,
                &self.room_for(delivery_id, audience),
                event.clone(),
            );
        }
    }

    fn schedule_customer(&self, room: String, payload: LocationPayload) -> JoinHandle<()> {
        let this = self.clone();
        self.metrics.delayed_publications_pending.inc();

        tokio::spawn(async move {
            tokio::time::sleep(this.customer_delay).await;
            this.metrics.delayed_publications_pending.dec();
            this.publish_now(Channel::Delayed, &room, TrackingEvent::CustomerTracking(payload));
        })
    }

    /// Best effort; failures are recorded and swallowed.
    fn publish_now(&self, channel: Channel, room: &str, event: TrackingEvent) -> bool {
        let name = event.name();

        match self.publisher.publish(room, event) {
            Ok(receivers) => {
                self.metrics
                    .publish_total
                    .with_label_values(&[channel.label(), "delivered"])
                    .inc();
                debug!(room, event = name, channel = channel.label(), receivers, "event published");
                true
            }
            Err(PublishError::NoSubscribers(_)) => {
                self.metrics
                    .publish_total
                    .with_label_values(&[channel.label(), "no_subscribers"])
                    .inc();
                debug!(room, event = name, channel = channel.label(), "no subscribers for event");
                false
            }
            Err(err) => {
                self.metrics
                    .publish_total
                    .with_label_values(&[channel.label(), "failed"])
                    .inc();
                warn!(room, event = name, channel = channel.label(), error = %err, "publish failed");
                false
            }
        }
    }
}
