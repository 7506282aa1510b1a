//! Error types for the chat core
//!
//! Defines durable-log errors and application-level errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Durable log errors
///
/// Raised by `DurableLog` implementations when the backing store
/// cannot serve a request.
#[derive(Debug, Error)]
pub enum LogError {
    /// Store is unreachable or refused the operation
    #[error("Durable log unavailable: {0}")]
    Unavailable(String),

    /// Redis protocol or connection error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Application-level errors
///
/// Covers transport failures (connection termination), log failures
/// on synchronous paths, and a stopped manager loop.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Durable log operation failed
    #[error(transparent)]
    Log(#[from] LogError),

    /// The room manager loop has stopped and no longer accepts commands
    #[error("Room manager closed")]
    ManagerClosed,

    /// Operation needs an identified user
    #[error("User not identified")]
    NotIdentified,

    /// Operation needs a joined room
    #[error("Not in room")]
    NotInRoom,
}
