//! Persistence collaborator. The tracking core only needs CRUD over
//! deliveries and tracking sessions; any durable store can sit behind
//! these traits.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::delivery::Delivery;
use crate::models::tracking::TrackingSession;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("record {0} does not exist")]
    Missing(Uuid),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

#[async_trait]
pub trait DeliveryStore: Send + Sync {
    async fn insert_delivery(&self, delivery: Delivery) -> Result<(), StoreError>;
    async fn get_delivery(&self, id: Uuid) -> Result<Option<Delivery>, StoreError>;
    async fn find_delivery_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Delivery>, StoreError>;
    async fn list_deliveries(&self) -> Result<Vec<Delivery>, StoreError>;
    async fn update_delivery(&self, delivery: Delivery) -> Result<(), StoreError>;
    async fn delete_delivery(&self, id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: TrackingSession) -> Result<(), StoreError>;
    async fn get_session(&self, id: Uuid) -> Result<Option<TrackingSession>, StoreError>;
    async fn list_sessions(&self) -> Result<Vec<TrackingSession>, StoreError>;
    async fn update_session(&self, session: TrackingSession) -> Result<(), StoreError>;
    async fn delete_session(&self, id: Uuid) -> Result<bool, StoreError>;
}
