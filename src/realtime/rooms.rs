//! Real-Time Fan-out (C7): one broadcast room per live negotiation,
//! availability, or requirement. Rooms are created lazily and reaped once
//! their last subscriber drops, mirroring the teacher's single global
//! `broadcast::Sender` but keyed per entity instead of process-wide.

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::broadcast::{self, Receiver, Sender};

use super::events::RoomEvent;

const ROOM_CAPACITY: usize = 256;

#[derive(Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, Sender<RoomEvent>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn negotiation_room(id: uuid::Uuid) -> String {
        format!("neg:{id}")
    }
    pub fn availability_room(id: uuid::Uuid) -> String {
        format!("avail:{id}")
    }
    pub fn requirement_room(id: uuid::Uuid) -> String {
        format!("req:{id}")
    }

    pub fn subscribe(&self, room: &str) -> Receiver<RoomEvent> {
        let mut rooms = self.rooms.lock();
        rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Publishes to a room; a room with no subscribers silently drops the
    /// event (there is nothing to deliver to), which is not an error.
    pub fn publish(&self, room: &str, event: RoomEvent) {
        let sender = {
            let mut rooms = self.rooms.lock();
            rooms
                .entry(room.to_string())
                .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
                .clone()
        };
        let _ = sender.send(event);
    }

    /// Drops rooms with no active subscribers to bound memory growth.
    pub fn reap_empty(&self) {
        self.rooms.lock().retain(|_, sender| sender.receiver_count() > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn publish_is_received_by_subscriber() {
        let registry = RoomRegistry::new();
        let room = RoomRegistry::negotiation_room(Uuid::new_v4());
        let mut rx = registry.subscribe(&room);

        let negotiation_id = Uuid::new_v4();
        registry.publish(
            &room,
            RoomEvent::NegotiationStatusChanged {
                negotiation_id,
                correlation_id: Uuid::new_v4(),
                status: "ACCEPTED".into(),
            },
        );

        let event = rx.recv().await.unwrap();
        match event {
            RoomEvent::NegotiationStatusChanged { negotiation_id: id, .. } => assert_eq!(id, negotiation_id),
            _ => panic!("unexpected event variant"),
        }
    }

    #[test]
    fn reap_removes_rooms_without_subscribers() {
        let registry = RoomRegistry::new();
        let room = RoomRegistry::availability_room(Uuid::new_v4());
        registry.publish(&room, RoomEvent::AvailabilityChanged {
            availability_id: Uuid::new_v4(),
            correlation_id: Uuid::new_v4(),
            payload: serde_json::json!({}),
        });
        registry.reap_empty();
        assert_eq!(registry.rooms.lock().len(), 0);
    }
}
