//! Durable log capability
//!
//! A key-ordered append log with TTL and range reads. The chat core consumes
//! it through the `DurableLog` trait and never serializes access to it;
//! implementations handle their own synchronization.

mod memory;
mod redis_log;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::LogError;
use crate::types::{RoomId, UserId};

pub use memory::MemoryLog;
pub use redis_log::RedisLog;

/// Expiration applied to room and direct-message keys after each write
pub const MESSAGE_TTL: Duration = Duration::from_secs(60 * 60);

/// Append/range store with per-key expiration
///
/// `range` follows list-range conventions: both bounds are inclusive and
/// negative indices count from the end, so `range(key, 0, -1)` reads the
/// whole key. A missing key reads as empty.
#[async_trait]
pub trait DurableLog: Send + Sync {
    /// Append a value to the end of the key's list
    async fn push(&self, key: &str, value: String) -> Result<(), LogError>;

    /// Read values between `start` and `end` inclusive
    async fn range(&self, key: &str, start: isize, end: isize) -> Result<Vec<String>, LogError>;

    /// Set the key to expire `ttl` from now
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), LogError>;

    /// Remove the key and all its values
    async fn delete(&self, key: &str) -> Result<(), LogError>;

    /// Check whether the key currently holds values
    async fn exists(&self, key: &str) -> Result<bool, LogError>;
}

/// Log key holding a room's chat history
pub fn room_key(room_id: &RoomId) -> String {
    format!("chat:{}", room_id)
}

/// Log key holding direct messages from `sender` to `receiver`
///
/// The pair is used in the order given. `dm_key(a, b)` and `dm_key(b, a)`
/// are distinct keys.
pub fn dm_key(sender: &UserId, receiver: &UserId) -> String {
    format!("dm:{}:{}", sender, receiver)
}
