//! Real-time chat room core
//!
//! In-process room broadcaster for a classroom chat service, with a
//! short-lived durable message log and point-to-point direct messages.
//!
//! # Features
//! - Room creation and deletion
//! - Live listeners with bounded, lossy per-listener buffers
//! - Fan-out of room messages to every current listener
//! - Room history appended to a TTL'd durable log (fire-and-forget)
//! - Direct messages stored under a sender → receiver key
//! - WebSocket transport streaming a room to each connection
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `RoomManager` is the central actor owning every room's `Broadcaster`
//! - `RoomManagerHandle` is the cloneable front door used by callers
//! - A `LogWriter` task applies room-log writes so the actor never awaits I/O
//! - No locks needed around rooms - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use classroom_chat::{handle_connection, ManagerConfig, MemoryLog, RoomManager};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let manager = RoomManager::spawn(Arc::new(MemoryLog::new()), ManagerConfig::default());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, manager.clone()));
//!     }
//! }
//! ```

pub mod broadcaster;
pub mod config;
pub mod durable_log;
pub mod error;
pub mod handle;
pub mod handler;
pub mod listener;
pub mod log_writer;
pub mod manager;
pub mod message;
pub mod types;

// Re-export main types for convenience
pub use broadcaster::{Broadcaster, PublishReport};
pub use config::{Config, ManagerConfig};
pub use durable_log::{DurableLog, MemoryLog, RedisLog};
pub use error::{AppError, LogError};
pub use handle::RoomManagerHandle;
pub use handler::handle_connection;
pub use listener::{Listener, StreamEnd};
pub use manager::{RoomCommand, RoomManager};
pub use message::{ChatMessage, ClientMessage, DirectMessage, ErrorCode, ServerMessage};
pub use types::{ListenerId, RoomId, UserId};
