//! Geofence precondition for completion-type delivery operations.
//!
//! The gate only reports a verdict. Callers must check `permitted` before
//! committing any state change.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::{self, Coordinate, GeoError};
use crate::models::delivery::Delivery;
use crate::observability::metrics::Metrics;
use crate::store::DeliveryStore;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationResult {
    pub permitted: bool,
    /// Measured distance to the drop point. Absent only when the delivery
    /// has no geofence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
}

impl AuthorizationResult {
    /// Converts a negative verdict into the error the caller should surface.
    pub fn require(self, delivery_id: Uuid) -> Result<f64, AppError> {
        match (self.permitted, self.distance_meters) {
            (true, Some(distance_meters)) => Ok(distance_meters),
            (_, Some(distance_meters)) => Err(AppError::GeofenceDenied { distance_meters }),
            (_, None) => Err(AppError::GeofenceUnavailable(delivery_id)),
        }
    }
}

/// Fails closed: a delivery without a geofence is never permitted.
pub fn authorize(delivery: &Delivery, location: &Coordinate) -> Result<AuthorizationResult, GeoError> {
    let Some(fence) = delivery.geofence.as_ref() else {
        location.validate()?;
        return Ok(AuthorizationResult {
            permitted: false,
            distance_meters: None,
        });
    };

    let verdict = geo::evaluate(location, fence)?;
    Ok(AuthorizationResult {
        permitted: verdict.within_fence,
        distance_meters: Some(verdict.distance_meters),
    })
}

#[derive(Clone)]
pub struct CompletionGate {
    deliveries: Arc<dyn DeliveryStore>,
    metrics: Metrics,
}

impl CompletionGate {
    pub fn new(deliveries: Arc<dyn DeliveryStore>, metrics: Metrics) -> Self {
        Self {
            deliveries,
            metrics,
        }
    }

    pub async fn authorize_completion(
        &self,
        delivery_id: Uuid,
        driver_location: &Coordinate,
    ) -> Result<AuthorizationResult, AppError> {
        let delivery = self
            .deliveries
            .get_delivery(delivery_id)
            .await?
            .ok_or(AppError::DeliveryNotFound(delivery_id))?;

        self.check(&delivery, driver_location)
    }

    /// Same as `authorize_completion` for a delivery the caller already holds.
    pub fn check(
        &self,
        delivery: &Delivery,
        driver_location: &Coordinate,
    ) -> Result<AuthorizationResult, AppError> {
        let result = authorize(delivery, driver_location)?;

        let verdict = match (result.permitted, result.distance_meters) {
            (true, _) => "permitted",
            (false, Some(_)) => "denied",
            (false, None) => "no_geofence",
        };
        self.metrics
            .geofence_checks_total
            .with_label_values(&[verdict])
            .inc();

        info!(
            delivery_id = %delivery.id,
            verdict,
            distance_meters = result.distance_meters.unwrap_or(-1.0),
            "completion geofence check"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::geo::GeoFenceArea;
    use crate::models::delivery::DeliveryStatus;
    use crate::store::MemoryStore;

    fn delivery(geofence: Option<GeoFenceArea>) -> Delivery {
        let now = Utc::now();
        Delivery {
            id: Uuid::new_v4(),
            reference: format!("REF-{}", Uuid::new_v4()),
            driver_id: None,
            customer_name: "Linus".to_string(),
            customer_phone: "+15550102".to_string(),
            delivery_address: "3 Broad St".to_string(),
            geofence,
            status: DeliveryStatus::InTransit,
            within_geofence: false,
            proof_of_delivery: None,
            trip_started_at: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn nyc_fence() -> GeoFenceArea {
        GeoFenceArea::new(Coordinate::new(40.7128, -74.0060).unwrap(), 200.0).unwrap()
    }

    #[test]
    fn driver_at_drop_point_is_permitted() {
        let d = delivery(Some(nyc_fence()));
        let result = authorize(&d, &Coordinate::new(40.7128, -74.0060).unwrap()).unwrap();

        assert!(result.permitted);
        assert!(result.distance_meters.unwrap() < 1.0);
    }

    #[test]
    fn driver_a_kilometer_north_is_denied_with_distance() {
        let d = delivery(Some(nyc_fence()));
        let result = authorize(&d, &Coordinate::new(40.7228, -74.0060).unwrap()).unwrap();

        assert!(!result.permitted);
        let distance = result.distance_meters.unwrap();
        assert!((distance - 1110.0).abs() <= 20.0, "distance was {distance}");

        match result.require(d.id) {
            Err(AppError::GeofenceDenied { distance_meters }) => {
                assert_eq!(distance_meters, distance)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_geofence_fails_closed() {
        let d = delivery(None);
        let result = authorize(&d, &Coordinate::new(40.7128, -74.0060).unwrap()).unwrap();

        assert!(!result.permitted);
        assert!(result.distance_meters.is_none());
        assert!(matches!(
            result.require(d.id),
            Err(AppError::GeofenceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn unknown_delivery_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let gate = CompletionGate::new(store, Metrics::new());

        let err = gate
            .authorize_completion(Uuid::new_v4(), &Coordinate::new(0.0, 0.0).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DeliveryNotFound(_)));
    }

    #[tokio::test]
    async fn gate_reads_the_stored_fence() {
        let store = Arc::new(MemoryStore::new());
        let d = delivery(Some(nyc_fence()));
        let id = d.id;
        store.insert_delivery(d).await.unwrap();
        let gate = CompletionGate::new(store, Metrics::new());

        let near = gate
            .authorize_completion(id, &Coordinate::new(40.7130, -74.0061).unwrap())
            .await
            .unwrap();
        assert!(near.permitted);
    }
}
