//! Message definitions
//!
//! Two groups live here:
//! - persisted records (`ChatMessage`, `DirectMessage`) written as JSON to the durable log
//! - the JSON WebSocket protocol, using Serde's tagged enums like the records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::types::{RoomId, UserId};

/// A message submitted to a room
///
/// Broadcast to live listeners in its rendered form and appended to the
/// room's log key as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender_id: UserId,
    pub room_id: RoomId,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a message stamped with the current time
    pub fn new(sender_id: UserId, room_id: RoomId, text: impl Into<String>) -> Self {
        Self {
            sender_id,
            room_id,
            text: text.into(),
            sent_at: Utc::now(),
        }
    }

    /// Text delivered to listeners: `"{sender}: {text}"`
    pub fn render(&self) -> String {
        format!("{}: {}", self.sender_id, self.text)
    }
}

/// A point-to-point message, never broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: String,
    pub is_dm: bool,
}

impl DirectMessage {
    pub fn new(sender_id: UserId, receiver_id: UserId, text: impl Into<String>) -> Self {
        Self {
            sender_id,
            receiver_id,
            text: text.into(),
            is_dm: true,
        }
    }
}

/// Client → Server message
///
/// All messages from client to server. Uses tagged enum with snake_case naming.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Declare the user id for this connection (required before sending)
    Identify { user_id: String },
    /// Create a room without joining it
    CreateRoom { room_id: String },
    /// Start listening to a room, leaving any current one
    Join { room_id: String },
    /// Stop listening to the current room
    Leave,
    /// Send a chat message to the current room
    Chat { text: String },
    /// Delete a room, ending every listener's stream
    DeleteRoom { room_id: String },
    /// Fetch the persisted messages of a room
    History { room_id: String },
    /// Send a direct message from the identified user
    Direct { receiver_id: String, text: String },
    /// Fetch direct messages stored under sender → receiver
    FetchDirect { sender_id: String, receiver_id: String },
    /// Delete direct messages stored under sender → receiver
    DeleteDirect { sender_id: String, receiver_id: String },
}

/// Server → Client message
///
/// All messages from server to client. Uses tagged enum with snake_case naming.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection successful, connection ID issued
    Connected { connection_id: String },
    /// User id accepted
    Identified { user_id: String },
    /// Room exists (created now or before)
    RoomCreated { room_id: String },
    /// Listening to the room
    Joined { room_id: String },
    /// No longer listening to the room
    Left { room_id: String },
    /// Chat message accepted for broadcast
    Sent { room_id: String },
    /// Broadcast payload from the current room
    Message { room_id: String, payload: String },
    /// Room was deleted while listening
    RoomClosed { room_id: String },
    /// Room deletion accepted
    RoomDeleted { room_id: String },
    /// Persisted room messages
    History {
        room_id: String,
        messages: Vec<ChatMessage>,
    },
    /// Direct message stored
    DirectSent { receiver_id: String },
    /// Stored direct messages
    DirectMessages {
        sender_id: String,
        receiver_id: String,
        messages: Vec<DirectMessage>,
    },
    /// Direct messages removed
    DirectDeleted {
        sender_id: String,
        receiver_id: String,
    },
    /// Error occurred
    Error { code: ErrorCode, message: String },
}

/// Error codes for ServerMessage::Error
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Sent before `identify`
    NotIdentified,
    /// Chat without a joined room
    NotInRoom,
    /// Invalid message format
    InvalidMessage,
    /// Durable log could not serve the request
    StoreUnavailable,
    /// Anything else
    Internal,
}

/// Convert AppError to ServerMessage for client notification
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        let (code, message) = match &err {
            AppError::NotIdentified => {
                (ErrorCode::NotIdentified, "Identify before sending".to_string())
            }
            AppError::NotInRoom => (ErrorCode::NotInRoom, "You are not in a room".to_string()),
            AppError::Json(e) => {
                (ErrorCode::InvalidMessage, format!("Invalid message format: {}", e))
            }
            AppError::Log(e) => (ErrorCode::StoreUnavailable, e.to_string()),
            // Fatal errors are not typically converted (connection closes)
            _ => (ErrorCode::Internal, "Internal error".to_string()),
        };
        ServerMessage::Error { code, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LogError;

    #[test]
    fn test_render_chat_message() {
        let msg = ChatMessage::new(UserId::new("u1"), RoomId::new("r1"), "hello");
        assert_eq!(msg.render(), "u1: hello");
    }

    #[test]
    fn test_direct_message_sets_flag() {
        let dm = DirectMessage::new(UserId::new("a"), UserId::new("b"), "hi");
        assert!(dm.is_dm);

        let json = serde_json::to_string(&dm).unwrap();
        assert!(json.contains("\"is_dm\":true"));
        assert!(json.contains("\"sender_id\":\"a\""));
    }

    #[test]
    fn test_client_message_deserialize() {
        let json = r#"{"type": "join", "room_id": "r1"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Join { room_id } => assert_eq!(room_id, "r1"),
            _ => panic!("Wrong variant"),
        }

        let json = r#"{"type": "fetch_direct", "sender_id": "a", "receiver_id": "b"}"#;
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(json).unwrap(),
            ClientMessage::FetchDirect { .. }
        ));
    }

    #[test]
    fn test_server_message_serialize() {
        let msg = ServerMessage::Message {
            room_id: "r1".to_string(),
            payload: "u1: hello".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"message\""));
        assert!(json.contains("\"payload\":\"u1: hello\""));
    }

    #[test]
    fn test_log_error_maps_to_store_unavailable() {
        let msg: ServerMessage = AppError::Log(LogError::Unavailable("down".into())).into();
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"code\":\"store_unavailable\""));
    }
}
