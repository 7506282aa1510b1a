//! Caller-facing handle to the room manager
//!
//! Room lifecycle, membership and submission go through the manager's
//! command channel. Direct messages and persisted-history reads go straight
//! to the durable log and never touch the manager loop.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::durable_log::{dm_key, room_key, DurableLog};
use crate::error::AppError;
use crate::listener::Listener;
use crate::manager::RoomCommand;
use crate::message::{ChatMessage, DirectMessage};
use crate::types::{ListenerId, RoomId, UserId};

/// Cloneable handle shared by every request handler and connection
#[derive(Clone)]
pub struct RoomManagerHandle {
    commands: mpsc::Sender<RoomCommand>,
    log: Arc<dyn DurableLog>,
    message_ttl: Duration,
}

impl RoomManagerHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<RoomCommand>,
        log: Arc<dyn DurableLog>,
        message_ttl: Duration,
    ) -> Self {
        Self {
            commands,
            log,
            message_ttl,
        }
    }

    /// The durable log shared with the manager
    pub fn log(&self) -> &Arc<dyn DurableLog> {
        &self.log
    }

    /// Create a room; an existing room is left untouched
    pub async fn create_room(&self, room_id: RoomId) -> Result<(), AppError> {
        self.send(RoomCommand::CreateRoom { room_id }).await
    }

    /// Subscribe to a room, creating it if absent
    pub async fn open_listener(&self, room_id: RoomId) -> Result<Listener, AppError> {
        let (reply, listener) = oneshot::channel();
        self.send(RoomCommand::OpenListener { room_id, reply }).await?;
        listener.await.map_err(|_| AppError::ManagerClosed)
    }

    /// Unsubscribe a listener; no-op if the room or listener is gone
    pub async fn close_listener(
        &self,
        room_id: &RoomId,
        listener_id: ListenerId,
    ) -> Result<(), AppError> {
        self.send(RoomCommand::CloseListener {
            room_id: room_id.clone(),
            listener_id,
        })
        .await
    }

    /// End every listener's stream, forget the room and purge its history
    pub async fn delete_room(&self, room_id: RoomId) -> Result<(), AppError> {
        self.send(RoomCommand::DeleteRoom { room_id }).await
    }

    /// Broadcast a chat message and append it to the room's history
    ///
    /// Returns once the command is enqueued. Persistence failures are not
    /// reported here.
    pub async fn submit(
        &self,
        sender_id: UserId,
        room_id: RoomId,
        text: impl Into<String>,
    ) -> Result<(), AppError> {
        let message = ChatMessage::new(sender_id, room_id, text);
        self.send(RoomCommand::Submit { message }).await
    }

    /// Listener count of a room, None if it does not exist
    pub async fn subscriber_count(&self, room_id: &RoomId) -> Result<Option<usize>, AppError> {
        let (reply, count) = oneshot::channel();
        self.send(RoomCommand::SubscriberCount {
            room_id: room_id.clone(),
            reply,
        })
        .await?;
        count.await.map_err(|_| AppError::ManagerClosed)
    }

    pub async fn room_exists(&self, room_id: &RoomId) -> Result<bool, AppError> {
        Ok(self.subscriber_count(room_id).await?.is_some())
    }

    /// Wait until every room-log write issued before this call is applied
    pub async fn flush_log(&self) -> Result<(), AppError> {
        let (reply, done) = oneshot::channel();
        self.send(RoomCommand::FlushLog { reply }).await?;
        done.await.map_err(|_| AppError::ManagerClosed)
    }

    /// Persisted messages of a room, oldest first
    ///
    /// Reads the log directly. A missing key is an empty history.
    pub async fn room_messages(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>, AppError> {
        let key = room_key(room_id);
        if !self.log.exists(&key).await? {
            return Ok(Vec::new());
        }
        let raw = self.log.range(&key, 0, -1).await?;
        Ok(decode_entries(&key, raw))
    }

    /// Store a direct message under sender → receiver
    pub async fn submit_direct(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        text: impl Into<String>,
    ) -> Result<(), AppError> {
        let key = dm_key(&sender_id, &receiver_id);
        let message = DirectMessage::new(sender_id, receiver_id, text);
        let value = serde_json::to_string(&message)?;

        self.log.push(&key, value).await?;
        self.log.expire(&key, self.message_ttl).await?;
        debug!("Stored direct message under {}", key);
        Ok(())
    }

    /// Direct messages stored under exactly sender → receiver
    ///
    /// Messages sent in the opposite direction live under another key and
    /// are not included.
    pub async fn get_direct_messages(
        &self,
        sender_id: &UserId,
        receiver_id: &UserId,
    ) -> Result<Vec<DirectMessage>, AppError> {
        let key = dm_key(sender_id, receiver_id);
        let raw = self.log.range(&key, 0, -1).await?;
        Ok(decode_entries(&key, raw))
    }

    pub async fn delete_direct_messages(
        &self,
        sender_id: &UserId,
        receiver_id: &UserId,
    ) -> Result<(), AppError> {
        self.log.delete(&dm_key(sender_id, receiver_id)).await?;
        Ok(())
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), AppError> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| AppError::ManagerClosed)
    }
}

/// Decode JSON log entries, skipping the ones that don't parse
fn decode_entries<T: DeserializeOwned>(key: &str, raw: Vec<String>) -> Vec<T> {
    raw.into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_str(&entry) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Skipping malformed entry {} in {}: {}", index, key, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::ManagerConfig;
    use crate::durable_log::MemoryLog;
    use crate::error::LogError;
    use crate::manager::RoomManager;

    fn spawn_with_memory_log() -> (RoomManagerHandle, MemoryLog) {
        let log = MemoryLog::new();
        let handle = RoomManager::spawn(Arc::new(log.clone()), ManagerConfig::default());
        (handle, log)
    }

    #[tokio::test]
    async fn test_direct_message_round_trip() {
        let (manager, _log) = spawn_with_memory_log();
        let a = UserId::new("A");
        let b = UserId::new("B");

        manager.submit_direct(a.clone(), b.clone(), "hi").await.unwrap();

        let messages = manager.get_direct_messages(&a, &b).await.unwrap();
        assert_eq!(messages, vec![DirectMessage::new(a.clone(), b.clone(), "hi")]);

        // Reversed direction is a different conversation key
        assert!(manager.get_direct_messages(&b, &a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_direct_messages_keep_order_and_expire() {
        let log = MemoryLog::new();
        let config = ManagerConfig {
            message_ttl: Duration::from_millis(50),
            ..ManagerConfig::default()
        };
        let manager = RoomManager::spawn(Arc::new(log.clone()), config);
        let a = UserId::new("A");
        let b = UserId::new("B");

        manager.submit_direct(a.clone(), b.clone(), "one").await.unwrap();
        manager.submit_direct(a.clone(), b.clone(), "two").await.unwrap();

        let texts: Vec<String> = manager
            .get_direct_messages(&a, &b)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["one", "two"]);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(manager.get_direct_messages(&a, &b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_entries_are_skipped() {
        let (manager, log) = spawn_with_memory_log();
        let a = UserId::new("A");
        let b = UserId::new("B");

        manager.submit_direct(a.clone(), b.clone(), "first").await.unwrap();
        log.push("dm:A:B", "{not json".to_string()).await.unwrap();
        manager.submit_direct(a.clone(), b.clone(), "second").await.unwrap();

        let messages = manager.get_direct_messages(&a, &b).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "first");
        assert_eq!(messages[1].text, "second");
    }

    #[tokio::test]
    async fn test_delete_direct_messages() {
        let (manager, log) = spawn_with_memory_log();
        let a = UserId::new("A");
        let b = UserId::new("B");

        manager.submit_direct(a.clone(), b.clone(), "hi").await.unwrap();
        manager.submit_direct(b.clone(), a.clone(), "hey").await.unwrap();

        manager.delete_direct_messages(&a, &b).await.unwrap();

        assert!(!log.exists("dm:A:B").await.unwrap());
        assert!(log.exists("dm:B:A").await.unwrap());
    }

    #[tokio::test]
    async fn test_room_messages_of_unknown_room_is_empty() {
        let (manager, _log) = spawn_with_memory_log();
        let history = manager.room_messages(&RoomId::new("none")).await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_room_messages_decode_in_order() {
        let (manager, _log) = spawn_with_memory_log();
        let r1 = RoomId::new("r1");

        manager.submit(UserId::new("u1"), r1.clone(), "first").await.unwrap();
        manager.submit(UserId::new("u2"), r1.clone(), "second").await.unwrap();
        manager.flush_log().await.unwrap();

        let history = manager.room_messages(&r1).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].sender_id, UserId::new("u1"));
        assert_eq!(history[1].text, "second");
        assert!(history[0].sent_at <= history[1].sent_at);
    }

    #[tokio::test]
    async fn test_submit_direct_propagates_log_failure() {
        struct DownLog;

        #[async_trait::async_trait]
        impl DurableLog for DownLog {
            async fn push(&self, _key: &str, _value: String) -> Result<(), LogError> {
                Err(LogError::Unavailable("down".into()))
            }
            async fn range(&self, _key: &str, _s: isize, _e: isize) -> Result<Vec<String>, LogError> {
                Err(LogError::Unavailable("down".into()))
            }
            async fn expire(&self, _key: &str, _ttl: Duration) -> Result<(), LogError> {
                Ok(())
            }
            async fn delete(&self, _key: &str) -> Result<(), LogError> {
                Err(LogError::Unavailable("down".into()))
            }
            async fn exists(&self, _key: &str) -> Result<bool, LogError> {
                Ok(false)
            }
        }

        let manager = RoomManager::spawn(Arc::new(DownLog), ManagerConfig::default());
        let a = UserId::new("A");
        let b = UserId::new("B");

        let err = manager.submit_direct(a.clone(), b.clone(), "hi").await.unwrap_err();
        assert!(matches!(err, AppError::Log(LogError::Unavailable(_))));
        assert!(manager.get_direct_messages(&a, &b).await.is_err());
        assert!(manager.delete_direct_messages(&a, &b).await.is_err());
    }
}
