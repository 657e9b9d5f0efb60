use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::delivery::Delivery;
use crate::models::tracking::TrackingSession;
use crate::store::{DeliveryStore, SessionStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    deliveries: DashMap<Uuid, Delivery>,
    references: DashMap<String, Uuid>,
    sessions: DashMap<Uuid, TrackingSession>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[async_trait]
impl DeliveryStore for MemoryStore {
    async fn insert_delivery(&self, delivery: Delivery) -> Result<(), StoreError> {
        match self.references.entry(delivery.reference.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!(
                "delivery reference {} already exists",
                delivery.reference
            ))),
            Entry::Vacant(slot) => {
                slot.insert(delivery.id);
                self.deliveries.insert(delivery.id, delivery);
                Ok(())
            }
        }
    }

    async fn get_delivery(&self, id: Uuid) -> Result<Option<Delivery>, StoreError> {
        Ok(self.deliveries.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_delivery_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Delivery>, StoreError> {
        let Some(id) = self.references.get(reference).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        self.get_delivery(id).await
    }

    async fn list_deliveries(&self) -> Result<Vec<Delivery>, StoreError> {
        Ok(self
            .deliveries
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn update_delivery(&self, delivery: Delivery) -> Result<(), StoreError> {
        let mut existing = self
            .deliveries
            .get_mut(&delivery.id)
            .ok_or(StoreError::Missing(delivery.id))?;

        if existing.reference != delivery.reference {
            return Err(StoreError::Backend(
                "delivery reference is immutable".to_string(),
            ));
        }

        *existing = delivery;
        Ok(())
    }

    async fn delete_delivery(&self, id: Uuid) -> Result<bool, StoreError> {
        match self.deliveries.remove(&id) {
            Some((_, delivery)) => {
                self.references.remove(&delivery.reference);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: TrackingSession) -> Result<(), StoreError> {
        match self.sessions.entry(session.id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!(
                "tracking session {} already exists",
                session.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(())
            }
        }
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<TrackingSession>, StoreError> {
        Ok(self.sessions.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_sessions(&self) -> Result<Vec<TrackingSession>, StoreError> {
        Ok(self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn update_session(&self, session: TrackingSession) -> Result<(), StoreError> {
        let mut existing = self
            .sessions
            .get_mut(&session.id)
            .ok_or(StoreError::Missing(session.id))?;
        *existing = session;
        Ok(())
    }

    async fn delete_session(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.sessions.remove(&id).is_some())
    }
}
