//! Per-room broadcast groups.
//!
//! Each subscriber registers the sender half of its connection outbox.
//! Delivery is at-most-once: events go out with `try_send` and are dropped
//! for receivers whose outbox is full, so one slow client never stalls a
//! room. Each group also carries an order guard that callers hold across
//! persist-then-broadcast sequences, which keeps intra-room delivery order
//! equal to acceptance order.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use refugio_shared::types::RoomId;

/// Identifier of a connected session.
pub type SessionId = Uuid;

struct RoomChannel {
    subscribers: HashMap<SessionId, mpsc::Sender<String>>,
    order: Arc<Mutex<()>>,
}

impl RoomChannel {
    fn new() -> Self {
        Self {
            subscribers: HashMap::new(),
            order: Arc::new(Mutex::new(())),
        }
    }
}

/// Registry of broadcast groups, one per room with subscribers.
#[derive(Default)]
pub struct RoomHub {
    rooms: RwLock<HashMap<RoomId, RoomChannel>>,
}

impl RoomHub {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session's outbox with a room group, creating the group on
    /// first use.
    pub async fn subscribe(&self, room_id: RoomId, session: SessionId, sender: mpsc::Sender<String>) {
        let mut rooms = self.rooms.write().await;
        let channel = rooms.entry(room_id).or_insert_with(RoomChannel::new);
        channel.subscribers.insert(session, sender);
        debug!(
            room = %room_id,
            session = %session,
            subscribers = channel.subscribers.len(),
            "session subscribed"
        );
    }

    /// Remove a session from a room group. Empty groups are dropped.
    pub async fn unsubscribe(&self, room_id: &RoomId, session: &SessionId) {
        let mut rooms = self.rooms.write().await;
        if let Some(channel) = rooms.get_mut(room_id) {
            channel.subscribers.remove(session);
            if channel.subscribers.is_empty() {
                rooms.remove(room_id);
                debug!(room = %room_id, "dropped empty broadcast group");
            }
        }
    }

    /// Dissolve a whole group. Subscribers stay connected; they simply stop
    /// receiving room events.
    pub async fn close_room(&self, room_id: &RoomId) {
        let mut rooms = self.rooms.write().await;
        if rooms.remove(room_id).is_some() {
            info!(room = %room_id, "broadcast group closed");
        }
    }

    /// Push an event to every subscriber of a room.
    pub async fn broadcast(&self, room_id: &RoomId, payload: String) {
        self.send_inner(room_id, payload, None).await;
    }

    /// Push an event to every subscriber except `skip`.
    pub async fn broadcast_except(&self, room_id: &RoomId, skip: &SessionId, payload: String) {
        self.send_inner(room_id, payload, Some(skip)).await;
    }

    async fn send_inner(&self, room_id: &RoomId, payload: String, skip: Option<&SessionId>) {
        let rooms = self.rooms.read().await;
        let Some(channel) = rooms.get(room_id) else {
            debug!(room = %room_id, "broadcast to nonexistent group");
            return;
        };

        for (session, sender) in &channel.subscribers {
            if skip == Some(session) {
                continue;
            }
            if sender.try_send(payload.clone()).is_err() {
                debug!(room = %room_id, target = %session, "dropping event for slow subscriber");
            }
        }
    }

    /// The order guard of a room's group, if the group exists.
    pub async fn room_order(&self, room_id: &RoomId) -> Option<Arc<Mutex<()>>> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .map(|channel| channel.order.clone())
    }

    /// Number of subscribers in a room's group.
    pub async fn subscriber_count(&self, room_id: &RoomId) -> usize {
        self.rooms
            .read()
            .await
            .get(room_id)
            .map(|channel| channel.subscribers.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber(capacity: usize) -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
        mpsc::channel(capacity)
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let hub = RoomHub::new();
        let room = Uuid::new_v4();
        let (tx_a, mut rx_a) = subscriber(8);
        let (tx_b, mut rx_b) = subscriber(8);

        hub.subscribe(room, Uuid::new_v4(), tx_a).await;
        hub.subscribe(room, Uuid::new_v4(), tx_b).await;
        assert_eq!(hub.subscriber_count(&room).await, 2);

        hub.broadcast(&room, "hola".to_string()).await;
        assert_eq!(rx_a.recv().await.unwrap(), "hola");
        assert_eq!(rx_b.recv().await.unwrap(), "hola");
    }

    #[tokio::test]
    async fn broadcast_except_skips_the_originator() {
        let hub = RoomHub::new();
        let room = Uuid::new_v4();
        let me = Uuid::new_v4();
        let (tx_me, mut rx_me) = subscriber(8);
        let (tx_other, mut rx_other) = subscriber(8);

        hub.subscribe(room, me, tx_me).await;
        hub.subscribe(room, Uuid::new_v4(), tx_other).await;

        hub.broadcast_except(&room, &me, "typing".to_string()).await;
        assert_eq!(rx_other.recv().await.unwrap(), "typing");
        assert!(rx_me.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_subscribers_lose_events_not_the_room() {
        let hub = RoomHub::new();
        let room = Uuid::new_v4();
        let (tx_slow, mut rx_slow) = subscriber(1);
        let (tx_ok, mut rx_ok) = subscriber(8);

        hub.subscribe(room, Uuid::new_v4(), tx_slow).await;
        hub.subscribe(room, Uuid::new_v4(), tx_ok).await;

        hub.broadcast(&room, "uno".to_string()).await;
        hub.broadcast(&room, "dos".to_string()).await;

        // The healthy subscriber saw both; the stalled one kept only the
        // first and was skipped for the second.
        assert_eq!(rx_ok.recv().await.unwrap(), "uno");
        assert_eq!(rx_ok.recv().await.unwrap(), "dos");
        assert_eq!(rx_slow.recv().await.unwrap(), "uno");
        assert!(rx_slow.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_drops_empty_groups() {
        let hub = RoomHub::new();
        let room = Uuid::new_v4();
        let session = Uuid::new_v4();
        let (tx, _rx) = subscriber(8);

        hub.subscribe(room, session, tx).await;
        assert!(hub.room_order(&room).await.is_some());

        hub.unsubscribe(&room, &session).await;
        assert_eq!(hub.subscriber_count(&room).await, 0);
        assert!(hub.room_order(&room).await.is_none());
    }

    #[tokio::test]
    async fn closed_rooms_deliver_nothing() {
        let hub = RoomHub::new();
        let room = Uuid::new_v4();
        let (tx, mut rx) = subscriber(8);

        hub.subscribe(room, Uuid::new_v4(), tx).await;
        hub.close_room(&room).await;

        hub.broadcast(&room, "eco".to_string()).await;
        assert!(rx.try_recv().is_err());
    }
}
