//! Configuration
//!
//! `Config` is the binary's command line (with env fallbacks); `ManagerConfig`
//! is what the library needs to start a room manager.

use std::time::Duration;

use clap::Parser;

use crate::broadcaster::SUBSCRIBER_BUFFER_SIZE;
use crate::durable_log::MESSAGE_TTL;

/// Channel buffer size for room commands
pub const COMMAND_BUFFER_SIZE: usize = 256;

/// Pending fire-and-forget log writes before new ones are dropped
pub const LOG_QUEUE_SIZE: usize = 1024;

/// Room manager tuning
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Bounded command channel capacity (caller backpressure)
    pub command_buffer: usize,
    /// Pending messages per listener before drops
    pub subscriber_buffer: usize,
    /// Queued room-log writes
    pub log_queue: usize,
    /// Expiration applied to log keys after each write
    pub message_ttl: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            command_buffer: COMMAND_BUFFER_SIZE,
            subscriber_buffer: SUBSCRIBER_BUFFER_SIZE,
            log_queue: LOG_QUEUE_SIZE,
            message_ttl: MESSAGE_TTL,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "classroom_chat")]
#[command(about = "WebSocket chat room server with a short-lived message log", long_about = None)]
pub struct Config {
    /// Host address to bind the server to
    #[arg(short = 'H', long, env = "CHAT_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, env = "CHAT_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Redis URL for the durable log; in-memory log when absent
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Room command channel capacity
    #[arg(long, env = "CHAT_COMMAND_BUFFER", default_value_t = COMMAND_BUFFER_SIZE)]
    pub command_buffer: usize,

    /// Pending messages per listener before drops
    #[arg(long, env = "CHAT_SUBSCRIBER_BUFFER", default_value_t = SUBSCRIBER_BUFFER_SIZE)]
    pub subscriber_buffer: usize,

    /// Queued room-log writes before drops
    #[arg(long, env = "CHAT_LOG_QUEUE", default_value_t = LOG_QUEUE_SIZE)]
    pub log_queue: usize,

    /// Seconds before a chat or direct-message key expires
    #[arg(long, env = "CHAT_MESSAGE_TTL_SECS", default_value_t = MESSAGE_TTL.as_secs())]
    pub message_ttl_secs: u64,
}

impl Config {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            command_buffer: self.command_buffer.max(1),
            subscriber_buffer: self.subscriber_buffer.max(1),
            log_queue: self.log_queue.max(1),
            message_ttl: Duration::from_secs(self.message_ttl_secs),
        }
    }
}
