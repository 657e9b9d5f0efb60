use std::sync::Arc;

use crate::broadcast::{Broadcaster, RoomHub};
use crate::config::Config;
use crate::gate::CompletionGate;
use crate::observability::metrics::Metrics;
use crate::store::{DeliveryStore, MemoryStore, SessionStore};
use crate::tracking::{SessionManager, TrackingGateway};

pub struct AppState {
    pub config: Config,
    pub deliveries: Arc<dyn DeliveryStore>,
    pub hub: Arc<RoomHub>,
    pub sessions: Arc<SessionManager>,
    pub gateway: TrackingGateway,
    pub gate: CompletionGate,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn with_store<S>(config: Config, store: Arc<S>) -> Self
    where
        S: DeliveryStore + SessionStore + 'static,
    {
        let metrics = Metrics::new();
        let deliveries: Arc<dyn DeliveryStore> = store.clone();
        let session_store: Arc<dyn SessionStore> = store;

        let hub = Arc::new(RoomHub::new(config.event_buffer_size));
        let broadcaster = Broadcaster::new(
            hub.clone(),
            config.customer_delay(),
            config.room_prefix.clone(),
            metrics.clone(),
        );

        let sessions = Arc::new(SessionManager::new(
            deliveries.clone(),
            session_store,
            metrics.clone(),
        ));
        let gateway = TrackingGateway::new(sessions.clone(), broadcaster, metrics.clone());
        let gate = CompletionGate::new(deliveries.clone(), metrics.clone());

        Self {
            config,
            deliveries,
            hub,
            sessions,
            gateway,
            gate,
            metrics,
        }
    }
}
