use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::broadcast::{PublishError, Publisher};
use crate::models::event::TrackingEvent;

/// In-process room registry backed by one `tokio::sync::broadcast` channel
/// per room. Receivers may join or drop at any time; publishing never
/// blocks on them.
pub struct RoomHub {
    rooms: DashMap<String, broadcast::Sender<TrackingEvent>>,
    buffer_size: usize,
}

impl RoomHub {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn subscribe(&self, room: &str) -> broadcast::Receiver<TrackingEvent> {
        self.rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer_size).0)
            .subscribe()
    }

    pub fn subscriber_count(&self, room: &str) -> usize {
        self.rooms
            .get(room)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Called after a subscriber drops its receiver; forgets the room once
    /// nobody listens to it any more.
    pub fn release(&self, room: &str) {
        self.prune(room);
    }

    /// Drops every room without receivers. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let before = self.rooms.len();
        self.rooms.retain(|_, sender| sender.receiver_count() > 0);
        before.saturating_sub(self.rooms.len())
    }

    fn prune(&self, room: &str) {
        self.rooms
            .remove_if(room, |_, sender| sender.receiver_count() == 0);
    }
}

impl Publisher for RoomHub {
    fn publish(&self, room: &str, event: TrackingEvent) -> Result<usize, PublishError> {
        let sent = match self.rooms.get(room) {
            Some(sender) => sender.send(event).ok(),
            None => None,
        };

        match sent {
            Some(receivers) => Ok(receivers),
            None => {
                self.prune(room);
                Err(PublishError::NoSubscribers(room.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::models::event::LifecyclePayload;

    fn event() -> TrackingEvent {
        TrackingEvent::TrackingStarted(LifecyclePayload {
            session_id: Uuid::new_v4(),
            delivery_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn publish_reaches_only_the_named_room() {
        let hub = RoomHub::new(16);
        let mut a = hub.subscribe("delivery:a");
        let mut b = hub.subscribe("delivery:b");

        let sent = event();
        assert_eq!(hub.publish("delivery:a", sent.clone()).unwrap(), 1);

        assert_eq!(a.recv().await.unwrap(), sent);
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn publish_without_subscribers_is_an_error_not_a_panic() {
        let hub = RoomHub::new(16);
        let err = hub.publish("delivery:nobody", event()).unwrap_err();
        assert!(matches!(err, PublishError::NoSubscribers(_)));
    }

    #[test]
    fn empty_rooms_are_pruned_after_last_subscriber_leaves() {
        let hub = RoomHub::new(16);
        let rx = hub.subscribe("delivery:a");
        assert_eq!(hub.subscriber_count("delivery:a"), 1);

        drop(rx);
        assert!(hub.publish("delivery:a", event()).is_err());
        assert_eq!(hub.room_count(), 0);

        let _rx = hub.subscribe("delivery:a");
        assert_eq!(hub.publish("delivery:a", event()).unwrap(), 1);
    }

    #[test]
    fn release_forgets_room_without_waiting_for_a_publish() {
        let hub = RoomHub::new(16);
        let first = hub.subscribe("delivery:a");
        let second = hub.subscribe("delivery:a");

        drop(first);
        hub.release("delivery:a");
        assert_eq!(hub.room_count(), 1);

        drop(second);
        hub.release("delivery:a");
        assert_eq!(hub.room_count(), 0);
    }

    #[test]
    fn sweep_drops_only_abandoned_rooms() {
        let hub = RoomHub::new(16);
        let _kept = hub.subscribe("delivery:kept");
        drop(hub.subscribe("delivery:gone"));
        drop(hub.subscribe("delivery:gone:customer"));

        assert_eq!(hub.sweep(), 2);
        assert_eq!(hub.room_count(), 1);
        assert_eq!(hub.subscriber_count("delivery:kept"), 1);
    }
}
