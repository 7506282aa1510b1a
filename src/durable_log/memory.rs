//! In-process durable log for single-node deployments and tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::DurableLog;
use crate::error::LogError;

#[derive(Debug, Default)]
struct Entry {
    values: Vec<String>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Memory-backed `DurableLog`
///
/// Expired keys are evicted lazily when touched. Cloning shares the
/// underlying store.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| !entry.is_expired(now));
        entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Resolve inclusive, possibly negative, bounds against a list of `len` items
fn resolve_range(len: usize, start: isize, end: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let end = if end < 0 { len + end } else { end.min(len - 1) };

    if len == 0 || start > end || start >= len {
        return None;
    }
    Some((start as usize, end as usize))
}

#[async_trait]
impl DurableLog for MemoryLog {
    async fn push(&self, key: &str, value: String) -> Result<(), LogError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.to_string()).or_default();
        if entry.is_expired(now) {
            *entry = Entry::default();
        }
        entry.values.push(value);
        Ok(())
    }

    async fn range(&self, key: &str, start: isize, end: isize) -> Result<Vec<String>, LogError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let Some(entry) = entries.get(key) else {
            return Ok(Vec::new());
        };
        if entry.is_expired(now) {
            entries.remove(key);
            return Ok(Vec::new());
        }

        Ok(match resolve_range(entry.values.len(), start, end) {
            Some((from, to)) => entry.values[from..=to].to_vec(),
            None => Vec::new(),
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), LogError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(key) {
            if entry.is_expired(now) {
                entries.remove(key);
            } else {
                entry.expires_at = Some(now + ttl);
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), LogError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, LogError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(false)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }
}
