use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info};

use crate::error::AppError;
use crate::models::delivery::DeliveryStatus;
use crate::state::AppState;
use crate::store::DeliveryStore;

/// Periodically purges delivered deliveries past the retention window.
/// Tracking sessions are left alone; they go away only on explicit delete.
/// Subscriber rooms nobody listens to are swept on the same tick.
pub async fn run_cleanup_job(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(state.config.cleanup_interval());
    info!(
        retention_days = state.config.delivery_retention_days,
        "cleanup job started"
    );

    loop {
        interval.tick().await;

        let cutoff = Utc::now() - Duration::days(state.config.delivery_retention_days);
        match purge_delivered(state.deliveries.as_ref(), cutoff).await {
            Ok(removed) => info!(removed, cutoff = %cutoff, "cleanup completed"),
            Err(err) => error!(error = %err, "cleanup failed"),
        }

        let rooms = state.hub.sweep();
        if rooms > 0 {
            info!(rooms, "dropped abandoned subscriber rooms");
        }
    }
}

pub async fn purge_delivered(
    deliveries: &dyn DeliveryStore,
    cutoff: DateTime<Utc>,
) -> Result<usize, AppError> {
    let expired: Vec<_> = deliveries
        .list_deliveries()
        .await?
        .into_iter()
        .filter(|d| d.status == DeliveryStatus::Delivered && d.updated_at < cutoff)
        .map(|d| d.id)
        .collect();

    let mut removed = 0;
    for id in expired {
        if deliveries.delete_delivery(id).await? {
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::models::delivery::Delivery;
    use crate::store::MemoryStore;

    fn delivery(status: DeliveryStatus, age_days: i64) -> Delivery {
        let at = Utc::now() - Duration::days(age_days);
        Delivery {
            id: Uuid::new_v4(),
            reference: Uuid::new_v4().to_string(),
            driver_id: None,
            customer_name: "Barbara".to_string(),
            customer_phone: "+15550103".to_string(),
            delivery_address: "4 Elm St".to_string(),
            geofence: None,
            status,
            within_geofence: false,
            proof_of_delivery: None,
            trip_started_at: None,
            delivered_at: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn only_old_delivered_deliveries_are_removed() {
        let store = MemoryStore::new();
        let old_delivered = delivery(DeliveryStatus::Delivered, 45);
        let expired_id = old_delivered.id;
        store.insert_delivery(old_delivered).await.unwrap();
        store
            .insert_delivery(delivery(DeliveryStatus::Delivered, 3))
            .await
            .unwrap();
        store
            .insert_delivery(delivery(DeliveryStatus::Failed, 90))
            .await
            .unwrap();

        let cutoff = Utc::now() - Duration::days(30);
        let removed = purge_delivered(&store, cutoff).await.unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.delivery_count(), 2);
        assert!(store.get_delivery(expired_id).await.unwrap().is_none());
    }
}
