//! Listener handle
//!
//! A listener is one live subscription to a room, owned by whoever opened
//! it (typically one streaming connection). The room manager only keeps the
//! sending half for delivery.

use std::future::Future;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::debug;

use crate::handle::RoomManagerHandle;
use crate::types::{ListenerId, RoomId};

/// How a `Listener::pump` loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The room was deleted; the stream reached its end
    RoomClosed,
    /// The cancellation signal fired; the listener was closed
    Cancelled,
    /// The downstream sink went away; the listener was closed
    ConsumerGone,
}

/// Live subscription to one room
#[derive(Debug)]
pub struct Listener {
    id: ListenerId,
    room_id: RoomId,
    receiver: mpsc::Receiver<String>,
}

impl Listener {
    pub(crate) fn new(id: ListenerId, room_id: RoomId, receiver: mpsc::Receiver<String>) -> Self {
        Self {
            id,
            room_id,
            receiver,
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Wait for the next payload
    ///
    /// Returns None once the listener has been closed or its room deleted.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<String, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Release this subscription
    pub async fn close(self, manager: &RoomManagerHandle) {
        if manager.close_listener(&self.room_id, self.id).await.is_err() {
            debug!("Manager gone while closing listener {}", self.id);
        }
    }

    /// Forward payloads into `sink` until the room closes or `cancel` fires
    ///
    /// On cancellation, or when `sink` is dropped, the listener is closed
    /// through `manager` so its subscriber entry does not outlive the consumer.
    pub async fn pump<T, C, F>(
        mut self,
        manager: &RoomManagerHandle,
        sink: &mpsc::Sender<T>,
        cancel: C,
        wrap: F,
    ) -> StreamEnd
    where
        C: Future<Output = ()>,
        F: Fn(String) -> T,
    {
        tokio::pin!(cancel);

        let end = loop {
            tokio::select! {
                _ = &mut cancel => break StreamEnd::Cancelled,
                payload = self.receiver.recv() => match payload {
                    Some(payload) => {
                        if sink.send(wrap(payload)).await.is_err() {
                            break StreamEnd::ConsumerGone;
                        }
                    }
                    None => return StreamEnd::RoomClosed,
                },
            }
        };

        debug!("Listener {} on room {} ended: {:?}", self.id, self.room_id, end);
        self.close(manager).await;
        end
    }
}
