//! Room broadcaster
//!
//! Fans one payload out to every subscriber of a room. Each subscriber owns a
//! small bounded buffer; delivery uses `try_send`, so a subscriber that is not
//! draining loses messages instead of stalling the publisher or its peers.

use std::collections::HashMap;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::types::{ListenerId, RoomId};

/// Default pending-message capacity of each subscriber buffer
pub const SUBSCRIBER_BUFFER_SIZE: usize = 10;

/// Outcome of a single `publish`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers whose buffer accepted the payload
    pub delivered: usize,
    /// Subscribers skipped because their buffer was full
    pub dropped: usize,
}

/// Per-room fan-out primitive
///
/// Holds the only sender for every subscriber channel, so removing a
/// subscriber here is what closes its stream.
#[derive(Debug)]
pub struct Broadcaster {
    room_id: RoomId,
    subscribers: HashMap<ListenerId, mpsc::Sender<String>>,
    closed: bool,
}

impl Broadcaster {
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            subscribers: HashMap::new(),
            closed: false,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Add a subscriber channel
    ///
    /// Registering the same listener id twice keeps the first channel.
    /// Returns false once the broadcaster is closed; the sender is dropped,
    /// so the caller's receiver ends immediately.
    pub fn register(&mut self, id: ListenerId, sender: mpsc::Sender<String>) -> bool {
        if self.closed {
            return false;
        }
        self.subscribers.entry(id).or_insert(sender);
        true
    }

    /// Remove a subscriber and close its channel
    ///
    /// Returns true if the subscriber was registered.
    pub fn unregister(&mut self, id: ListenerId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    /// Deliver `payload` to every current subscriber without waiting
    ///
    /// A full buffer drops the payload for that subscriber only. A subscriber
    /// whose receiver is gone is pruned.
    pub fn publish(&mut self, payload: &str) -> PublishReport {
        let mut report = PublishReport::default();
        let mut gone = Vec::new();

        for (id, sender) in &self.subscribers {
            match sender.try_send(payload.to_string()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Room {}: listener {} buffer full, message dropped", self.room_id, id);
                    report.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => gone.push(*id),
            }
        }

        for id in gone {
            debug!("Room {}: pruning listener {} (receiver dropped)", self.room_id, id);
            self.subscribers.remove(&id);
        }

        report
    }

    /// Close every subscriber channel and refuse further registration
    pub fn close(&mut self) {
        self.closed = true;
        self.subscribers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.subscribers.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber() -> (ListenerId, mpsc::Sender<String>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER_SIZE);
        (ListenerId::new(), tx, rx)
    }

    #[test]
    fn test_register_and_unregister() {
        let mut room = Broadcaster::new(RoomId::new("r1"));
        let (id, tx, _rx) = subscriber();

        assert!(room.register(id, tx));
        assert_eq!(room.subscriber_count(), 1);
        assert!(room.contains(id));

        assert!(room.unregister(id));
        assert_eq!(room.subscriber_count(), 0);

        // Unknown listener is a no-op
        assert!(!room.unregister(id));
    }

    #[test]
    fn test_register_is_idempotent_per_listener() {
        let mut room = Broadcaster::new(RoomId::new("r1"));
        let (id, tx, _rx) = subscriber();

        assert!(room.register(id, tx.clone()));
        assert!(room.register(id, tx));
        assert_eq!(room.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let mut room = Broadcaster::new(RoomId::new("r1"));
        let (id1, tx1, mut rx1) = subscriber();
        let (id2, tx2, mut rx2) = subscriber();
        room.register(id1, tx1);
        room.register(id2, tx2);

        let report = room.publish("u1: hello");

        assert_eq!(report, PublishReport { delivered: 2, dropped: 0 });
        assert_eq!(rx1.recv().await.as_deref(), Some("u1: hello"));
        assert_eq!(rx2.recv().await.as_deref(), Some("u1: hello"));
    }

    #[tokio::test]
    async fn test_unregister_closes_stream() {
        let mut room = Broadcaster::new(RoomId::new("r1"));
        let (id, tx, mut rx) = subscriber();
        room.register(id, tx);

        room.unregister(id);

        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_full_buffer_drops_only_for_that_subscriber() {
        let mut room = Broadcaster::new(RoomId::new("r1"));
        let (stuck_id, stuck_tx, mut stuck_rx) = subscriber();
        let (live_id, live_tx, mut live_rx) = subscriber();
        room.register(stuck_id, stuck_tx);
        room.register(live_id, live_tx);

        // Fill the stuck subscriber's buffer while draining the live one
        for i in 0..SUBSCRIBER_BUFFER_SIZE {
            let report = room.publish(&format!("m{}", i));
            assert_eq!(report.dropped, 0);
            assert_eq!(live_rx.recv().await, Some(format!("m{}", i)));
        }

        let report = room.publish("overflow");

        assert_eq!(report, PublishReport { delivered: 1, dropped: 1 });
        assert_eq!(live_rx.recv().await.as_deref(), Some("overflow"));

        // Stuck subscriber keeps its earlier messages and stays registered
        assert_eq!(stuck_rx.recv().await.as_deref(), Some("m0"));
        assert!(room.contains(stuck_id));
    }

    #[test]
    fn test_publish_prunes_dropped_receivers() {
        let mut room = Broadcaster::new(RoomId::new("r1"));
        let (id, tx, rx) = subscriber();
        room.register(id, tx);
        drop(rx);

        let report = room.publish("hello");

        assert_eq!(report, PublishReport::default());
        assert_eq!(room.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_close_ends_all_streams_and_refuses_registration() {
        let mut room = Broadcaster::new(RoomId::new("r1"));
        let (id1, tx1, mut rx1) = subscriber();
        let (id2, tx2, mut rx2) = subscriber();
        room.register(id1, tx1);
        room.register(id2, tx2);

        room.close();

        assert!(room.is_closed());
        assert_eq!(rx1.recv().await, None);
        assert_eq!(rx2.recv().await, None);

        let (id3, tx3, mut rx3) = subscriber();
        assert!(!room.register(id3, tx3));
        assert_eq!(rx3.recv().await, None);
    }

    #[test]
    fn test_publish_with_no_subscribers() {
        let mut room = Broadcaster::new(RoomId::new("empty"));
        assert_eq!(room.publish("anyone?"), PublishReport::default());
    }
}
