use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::Coordinate;
use crate::models::tracking::{TrackingSession, TrackingStatus};
use crate::observability::metrics::Metrics;
use crate::store::{DeliveryStore, SessionStore};

#[derive(Debug, Clone)]
pub enum LocationOutcome {
    Applied(TrackingSession),
    /// The report was older than the session's `last_updated`; the session is
    /// returned unchanged.
    Stale(TrackingSession),
}

impl LocationOutcome {
    pub fn session(&self) -> &TrackingSession {
        match self {
            LocationOutcome::Applied(session) | LocationOutcome::Stale(session) => session,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, LocationOutcome::Applied(_))
    }
}

/// Owns every mutation of tracking sessions. Mutations of one session are
/// serialized through a per-session async mutex; different sessions never
/// contend.
pub struct SessionManager {
    deliveries: Arc<dyn DeliveryStore>,
    sessions: Arc<dyn SessionStore>,
    active_by_delivery: DashMap<Uuid, Uuid>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    metrics: Metrics,
}

impl SessionManager {
    pub fn new(
        deliveries: Arc<dyn DeliveryStore>,
        sessions: Arc<dyn SessionStore>,
        metrics: Metrics,
    ) -> Self {
        Self {
            deliveries,
            sessions,
            active_by_delivery: DashMap::new(),
            locks: DashMap::new(),
            metrics,
        }
    }

    /// Rebuilds the delivery -> active session index from the store.
    pub async fn restore(&self) -> Result<usize, AppError> {
        for session in self.sessions.list_sessions().await? {
            if session.is_active() {
                self.active_by_delivery.insert(session.delivery_id, session.id);
            }
        }
        self.refresh_active_gauge();
        Ok(self.active_by_delivery.len())
    }

    pub async fn start(
        &self,
        delivery_id: Uuid,
        vehicle_id: String,
        initial_location: Coordinate,
    ) -> Result<TrackingSession, AppError> {
        initial_location.validate()?;
        if vehicle_id.trim().is_empty() {
            return Err(AppError::Validation("vehicle_id cannot be empty".to_string()));
        }

        if self.deliveries.get_delivery(delivery_id).await?.is_none() {
            return Err(AppError::DeliveryNotFound(delivery_id));
        }

        let now = Utc::now();
        let session = TrackingSession {
            id: Uuid::new_v4(),
            delivery_id,
            vehicle_id,
            current_location: initial_location,
            speed: None,
            status: TrackingStatus::Active,
            started_at: now,
            last_updated: now,
            ended_at: None,
        };

        match self.active_by_delivery.entry(delivery_id) {
            Entry::Occupied(existing) => {
                return Err(AppError::SessionAlreadyActive {
                    delivery_id,
                    session_id: *existing.get(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(session.id);
            }
        }

        if let Err(err) = self.sessions.insert_session(session.clone()).await {
            self.active_by_delivery
                .remove_if(&delivery_id, |_, id| *id == session.id);
            return Err(err.into());
        }
        self.refresh_active_gauge();

        // re-read so writes made while the session was being stored survive
        match self.deliveries.get_delivery(delivery_id).await? {
            Some(mut delivery) => {
                delivery.mark_in_transit(now);
                self.deliveries.update_delivery(delivery).await?;
            }
            None => debug!(
                session_id = %session.id,
                delivery_id = %delivery_id,
                "delivery removed while tracking was starting"
            ),
        }

        info!(
            session_id = %session.id,
            delivery_id = %delivery_id,
            vehicle_id = %session.vehicle_id,
            "tracking started"
        );

        Ok(session)
    }

    pub async fn update_location(
        &self,
        session_id: Uuid,
        location: Coordinate,
        speed: Option<f64>,
        recorded_at: Option<DateTime<Utc>>,
    ) -> Result<LocationOutcome, AppError> {
        self.update_location_with(session_id, location, speed, recorded_at, |_| {})
            .await
    }

    /// Like [`update_location`](Self::update_location), but runs `on_applied`
    /// before the session lock is released, so whatever it emits is ordered
    /// exactly like the stored updates.
    pub async fn update_location_with<F>(
        &self,
        session_id: Uuid,
        location: Coordinate,
        speed: Option<f64>,
        recorded_at: Option<DateTime<Utc>>,
        on_applied: F,
    ) -> Result<LocationOutcome, AppError>
    where
        F: FnOnce(&TrackingSession),
    {
        location.validate()?;
        if let Some(speed) = speed {
            if !(speed.is_finite() && speed >= 0.0) {
                return Err(AppError::Validation(format!(
                    "speed must be a non-negative number, got {speed}"
                )));
            }
        }

        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let mut session = self.load(session_id).await?;
        if !session.is_active() {
            return Err(AppError::SessionAlreadyCompleted(session_id));
        }

        let now = Utc::now();
        let reported = recorded_at.map(|at| at.min(now));

        if let Some(reported) = reported {
            if reported < session.last_updated {
                debug!(
                    session_id = %session_id,
                    reported_at = %reported,
                    last_updated = %session.last_updated,
                    "ignoring stale location update"
                );
                return Ok(LocationOutcome::Stale(session));
            }
        }

        session.current_location = location;
        if speed.is_some() {
            session.speed = speed;
        }
        session.last_updated = reported.unwrap_or(now).max(session.last_updated);

        self.sessions.update_session(session.clone()).await?;
        on_applied(&session);

        Ok(LocationOutcome::Applied(session))
    }

    pub async fn stop(&self, session_id: Uuid) -> Result<TrackingSession, AppError> {
        let lock = self.lock_for(session_id);
        let guard = lock.lock().await;

        let mut session = self.load(session_id).await?;
        if !session.is_active() {
            return Err(AppError::SessionAlreadyCompleted(session_id));
        }

        let now = Utc::now().max(session.last_updated);
        session.status = TrackingStatus::Completed;
        session.ended_at = Some(now);
        session.last_updated = now;

        self.sessions.update_session(session.clone()).await?;
        self.active_by_delivery
            .remove_if(&session.delivery_id, |_, id| *id == session_id);
        self.refresh_active_gauge();

        match self.deliveries.get_delivery(session.delivery_id).await? {
            Some(mut delivery) => {
                delivery.mark_delivered(now);
                self.deliveries.update_delivery(delivery).await?;
            }
            None => debug!(
                session_id = %session_id,
                delivery_id = %session.delivery_id,
                "delivery for stopped session no longer exists"
            ),
        }

        drop(guard);
        self.locks.remove(&session_id);

        info!(
            session_id = %session_id,
            delivery_id = %session.delivery_id,
            "tracking stopped"
        );

        Ok(session)
    }

    /// Removes the session record. Independent of delivery completion.
    pub async fn delete(&self, session_id: Uuid) -> Result<TrackingSession, AppError> {
        let lock = self.lock_for(session_id);
        let guard = lock.lock().await;

        let session = self.load(session_id).await?;
        self.sessions.delete_session(session_id).await?;
        self.active_by_delivery
            .remove_if(&session.delivery_id, |_, id| *id == session_id);
        self.refresh_active_gauge();

        drop(guard);
        self.locks.remove(&session_id);

        info!(session_id = %session_id, "tracking session deleted");
        Ok(session)
    }

    pub async fn get(&self, session_id: Uuid) -> Result<TrackingSession, AppError> {
        self.sessions
            .get_session(session_id)
            .await?
            .ok_or(AppError::SessionNotFound(session_id))
    }

    pub async fn list_active(&self) -> Result<Vec<TrackingSession>, AppError> {
        let mut active: Vec<TrackingSession> = self
            .sessions
            .list_sessions()
            .await?
            .into_iter()
            .filter(TrackingSession::is_active)
            .collect();
        active.sort_by_key(|session| session.started_at);
        Ok(active)
    }

    pub fn active_for_delivery(&self, delivery_id: Uuid) -> Option<Uuid> {
        self.active_by_delivery
            .get(&delivery_id)
            .map(|entry| *entry.value())
    }

    pub fn active_count(&self) -> usize {
        self.active_by_delivery.len()
    }

    async fn load(&self, session_id: Uuid) -> Result<TrackingSession, AppError> {
        match self.sessions.get_session(session_id).await? {
            Some(session) => Ok(session),
            None => {
                self.locks.remove(&session_id);
                Err(AppError::SessionNotFound(session_id))
            }
        }
    }

    fn lock_for(&self, session_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    fn refresh_active_gauge(&self) {
        self.metrics
            .tracking_sessions_active
            .set(self.active_by_delivery.len() as i64);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::delivery::{Delivery, DeliveryStatus};
    use crate::store::{MemoryStore, StoreError};

    async fn setup() -> (Arc<MemoryStore>, SessionManager, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let delivery = Delivery {
            id: Uuid::new_v4(),
            reference: "D1".to_string(),
            driver_id: None,
            customer_name: "Grace".to_string(),
            customer_phone: "+15550101".to_string(),
            delivery_address: "2 Side St".to_string(),
            geofence: None,
            status: DeliveryStatus::Pending,
            within_geofence: false,
            proof_of_delivery: None,
            trip_started_at: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
        };
        let delivery_id = delivery.id;
        store.insert_delivery(delivery).await.unwrap();

        let manager = SessionManager::new(store.clone(), store.clone(), Metrics::new());
        (store, manager, delivery_id)
    }

    fn at(latitude: f64, longitude: f64) -> Coordinate {
        Coordinate::new(latitude, longitude).unwrap()
    }

    #[tokio::test]
    async fn start_marks_delivery_in_transit() {
        let (store, manager, delivery_id) = setup().await;

        let session = manager
            .start(delivery_id, "V1".to_string(), at(10.0, 10.0))
            .await
            .unwrap();

        assert!(session.is_active());
        assert!(session.ended_at.is_none());
        assert_eq!(manager.active_for_delivery(delivery_id), Some(session.id));

        let delivery = store.get_delivery(delivery_id).await.unwrap().unwrap();
        assert_eq!(delivery.status, DeliveryStatus::InTransit);
        assert!(delivery.trip_started_at.is_some());
    }

    /// Assigns a driver to the delivery while the session is being stored,
    /// like a dispatcher write racing the start.
    struct AssignsDuringInsert {
        inner: Arc<MemoryStore>,
        driver_id: Uuid,
    }

    #[async_trait::async_trait]
    impl SessionStore for AssignsDuringInsert {
        async fn insert_session(&self, session: TrackingSession) -> Result<(), StoreError> {
            if let Some(mut delivery) = self.inner.get_delivery(session.delivery_id).await? {
                delivery.driver_id = Some(self.driver_id);
                self.inner.update_delivery(delivery).await?;
            }
            self.inner.insert_session(session).await
        }

        async fn get_session(&self, id: Uuid) -> Result<Option<TrackingSession>, StoreError> {
            self.inner.get_session(id).await
        }

        async fn list_sessions(&self) -> Result<Vec<TrackingSession>, StoreError> {
            self.inner.list_sessions().await
        }

        async fn update_session(&self, session: TrackingSession) -> Result<(), StoreError> {
            self.inner.update_session(session).await
        }

        async fn delete_session(&self, id: Uuid) -> Result<bool, StoreError> {
            self.inner.delete_session(id).await
        }
    }

    #[tokio::test]
    async fn start_keeps_delivery_writes_made_while_storing_the_session() {
        let (store, _manager, delivery_id) = setup().await;
        let driver_id = Uuid::new_v4();
        let racing = Arc::new(AssignsDuringInsert {
            inner: store.clone(),
            driver_id,
        });
        let manager = SessionManager::new(store.clone(), racing, Metrics::new());

        manager
            .start(delivery_id, "V1".to_string(), at(10.0, 10.0))
            .await
            .unwrap();

        let delivery = store.get_delivery(delivery_id).await.unwrap().unwrap();
        assert_eq!(delivery.status, DeliveryStatus::InTransit);
        assert_eq!(delivery.driver_id, Some(driver_id));
    }

    #[tokio::test]
    async fn on_applied_runs_only_for_applied_updates() {
        let (_store, manager, delivery_id) = setup().await;
        let session = manager
            .start(delivery_id, "V1".to_string(), at(10.0, 10.0))
            .await
            .unwrap();

        let mut seen = Vec::new();
        manager
            .update_location_with(session.id, at(10.01, 10.0), None, None, |s| {
                seen.push(s.current_location)
            })
            .await
            .unwrap();
        let stale_time = session.started_at - Duration::seconds(30);
        manager
            .update_location_with(session.id, at(9.0, 9.0), None, Some(stale_time), |s| {
                seen.push(s.current_location)
            })
            .await
            .unwrap();

        assert_eq!(seen, vec![at(10.01, 10.0)]);
    }

    #[tokio::test]
    async fn second_start_for_same_delivery_is_rejected() {
        let (_store, manager, delivery_id) = setup().await;

        let first = manager
            .start(delivery_id, "V1".to_string(), at(10.0, 10.0))
            .await
            .unwrap();
        let err = manager
            .start(delivery_id, "V1".to_string(), at(10.0, 10.0))
            .await
            .unwrap_err();

        match err {
            AppError::SessionAlreadyActive { session_id, .. } => assert_eq!(session_id, first.id),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn start_for_unknown_delivery_fails() {
        let (_store, manager, _) = setup().await;
        let err = manager
            .start(Uuid::new_v4(), "V1".to_string(), at(10.0, 10.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DeliveryNotFound(_)));
    }

    #[tokio::test]
    async fn omitted_speed_keeps_previous_value() {
        let (_store, manager, delivery_id) = setup().await;
        let session = manager
            .start(delivery_id, "V1".to_string(), at(10.0, 10.0))
            .await
            .unwrap();

        manager
            .update_location(session.id, at(10.001, 10.0), Some(12.5), None)
            .await
            .unwrap();
        let outcome = manager
            .update_location(session.id, at(10.002, 10.0), None, None)
            .await
            .unwrap();

        let updated = outcome.session();
        assert!(outcome.is_applied());
        assert_eq!(updated.speed, Some(12.5));
        assert_eq!(updated.current_location, at(10.002, 10.0));
        assert!(updated.last_updated >= session.last_updated);
    }

    #[tokio::test]
    async fn stale_update_does_not_regress_location() {
        let (_store, manager, delivery_id) = setup().await;
        let session = manager
            .start(delivery_id, "V1".to_string(), at(10.0, 10.0))
            .await
            .unwrap();

        manager
            .update_location(session.id, at(10.01, 10.0), None, None)
            .await
            .unwrap();

        let stale_time = session.started_at - Duration::seconds(30);
        let outcome = manager
            .update_location(session.id, at(9.0, 9.0), None, Some(stale_time))
            .await
            .unwrap();

        assert!(!outcome.is_applied());
        let stored = manager.get(session.id).await.unwrap();
        assert_eq!(stored.current_location, at(10.01, 10.0));
    }

    #[tokio::test]
    async fn stop_twice_fails_with_already_completed() {
        let (store, manager, delivery_id) = setup().await;
        let session = manager
            .start(delivery_id, "V1".to_string(), at(10.0, 10.0))
            .await
            .unwrap();

        let stopped = manager.stop(session.id).await.unwrap();
        assert_eq!(stopped.status, TrackingStatus::Completed);
        assert!(stopped.ended_at.is_some());
        assert_eq!(manager.active_for_delivery(delivery_id), None);

        let delivery = store.get_delivery(delivery_id).await.unwrap().unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Delivered);

        let err = manager.stop(session.id).await.unwrap_err();
        assert!(matches!(err, AppError::SessionAlreadyCompleted(_)));

        let err = manager
            .update_location(session.id, at(10.0, 10.0), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SessionAlreadyCompleted(_)));
    }

    #[tokio::test]
    async fn delivery_can_be_tracked_again_after_stop() {
        let (_store, manager, delivery_id) = setup().await;
        let first = manager
            .start(delivery_id, "V1".to_string(), at(10.0, 10.0))
            .await
            .unwrap();
        manager.stop(first.id).await.unwrap();

        let second = manager
            .start(delivery_id, "V2".to_string(), at(10.0, 10.0))
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let (_store, manager, _) = setup().await;
        let id = Uuid::new_v4();

        assert!(matches!(
            manager.update_location(id, at(0.0, 0.0), None, None).await,
            Err(AppError::SessionNotFound(_))
        ));
        assert!(matches!(manager.stop(id).await, Err(AppError::SessionNotFound(_))));
        assert!(matches!(manager.delete(id).await, Err(AppError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn concurrent_updates_for_one_session_all_apply() {
        let (_store, manager, delivery_id) = setup().await;
        let manager = Arc::new(manager);
        let session = manager
            .start(delivery_id, "V1".to_string(), at(10.0, 10.0))
            .await
            .unwrap();
        let session_id = session.id;

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager
                        .update_location(session_id, at(10.0 + i as f64 * 0.001, 10.0), None, None)
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().unwrap().is_applied());
        }
        assert!(manager.get(session_id).await.unwrap().is_active());
    }

    #[tokio::test]
    async fn delete_releases_the_delivery() {
        let (_store, manager, delivery_id) = setup().await;
        let session = manager
            .start(delivery_id, "V1".to_string(), at(10.0, 10.0))
            .await
            .unwrap();

        manager.delete(session.id).await.unwrap();
        assert_eq!(manager.active_count(), 0);
        assert!(matches!(
            manager.get(session.id).await,
            Err(AppError::SessionNotFound(_))
        ));
    }
}
