//! Redis-backed durable log
//!
//! Each key is a Redis list: `RPUSH` appends, `LRANGE` reads, and the TTL is
//! a `PEXPIRE` on the list key so sub-second TTLs are honoured.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;
use tracing::info;

use super::DurableLog;
use crate::error::LogError;

/// `DurableLog` over a shared Redis connection manager
///
/// The connection manager multiplexes one connection and reconnects on
/// failure, so cloning the log per request is cheap.
#[derive(Clone)]
pub struct RedisLog {
    manager: ConnectionManager,
}

impl RedisLog {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    /// Open a connection manager for the given `redis://` URL
    pub async fn connect(url: &str) -> Result<Self, LogError> {
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        info!("Connected durable log to {}", url);
        Ok(Self { manager })
    }
}

/// Millisecond argument for `PEXPIRE`
///
/// A nonzero TTL never rounds down to zero, which Redis would treat as an
/// immediate delete.
fn expire_millis(ttl: Duration) -> u64 {
    if ttl.is_zero() {
        return 0;
    }
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl DurableLog for RedisLog {
    async fn push(&self, key: &str, value: String) -> Result<(), LogError> {
        let mut conn = self.manager.clone();
        redis::cmd("RPUSH")
            .arg(key)
            .arg(value)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn range(&self, key: &str, start: isize, end: isize) -> Result<Vec<String>, LogError> {
        let mut conn = self.manager.clone();
        let values = redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(end)
            .query_async::<_, Vec<String>>(&mut conn)
            .await?;
        Ok(values)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), LogError> {
        let mut conn = self.manager.clone();
        redis::cmd("PEXPIRE")
            .arg(key)
            .arg(expire_millis(ttl))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), LogError> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, LogError> {
        let mut conn = self.manager.clone();
        let found = redis::cmd("EXISTS")
            .arg(key)
            .query_async::<_, bool>(&mut conn)
            .await?;
        Ok(found)
    }
}
