//! Basic type definitions for the chat core
//!
//! Provides newtype wrappers for type safety:
//! - `RoomId`: opaque room identifier chosen by the caller
//! - `UserId`: opaque sender/receiver identifier
//! - `ListenerId`: UUID-based identity of one subscriber channel

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque room identifier (newtype pattern)
///
/// Room ids are supplied by upstream request handlers and used verbatim,
/// both as registry keys and in durable-log keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque user identifier
///
/// Authentication happens upstream, so this is trusted as given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a single subscriber channel
///
/// Wraps a UUID v4 so the same room can hold many listeners
/// and each can be unregistered individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub Uuid);

impl ListenerId {
    /// Create a new random listener ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
