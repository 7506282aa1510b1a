//! Background writer for room-log side effects
//!
//! The room manager must never await the durable log, so room appends and
//! purges are queued here and applied one at a time, in the order the
//! manager issued them. Failures are logged and discarded.
//!
//! Only appends count against the queue bound. Purges and flush barriers
//! are always accepted, so a deleted room's history is never left behind
//! and no later append can overtake a purge.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::durable_log::DurableLog;
use crate::error::LogError;

/// A queued durable-log write
#[derive(Debug)]
pub enum LogWrite {
    /// Append a value and refresh the key's expiration
    Append {
        key: String,
        value: String,
        ttl: Duration,
    },
    /// Remove the key
    Purge { key: String },
    /// Resolves once every earlier write has been applied
    Flush(oneshot::Sender<()>),
}

/// Why a write was not queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// `capacity` appends are already waiting
    Full,
    /// The writer task has stopped
    Closed,
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::Full => write!(f, "log queue full"),
            QueueError::Closed => write!(f, "log writer stopped"),
        }
    }
}

/// Sending side of the log writer, held by the room manager
#[derive(Debug, Clone)]
pub struct LogQueue {
    sender: mpsc::UnboundedSender<LogWrite>,
    pending_appends: Arc<AtomicUsize>,
    capacity: usize,
}

impl LogQueue {
    /// Queue a write without waiting
    ///
    /// Appends beyond `capacity` pending ones are refused; purges and
    /// flushes are always queued behind everything already accepted.
    pub fn push(&self, write: LogWrite) -> Result<(), QueueError> {
        let is_append = matches!(write, LogWrite::Append { .. });
        if is_append {
            let reserved = self
                .pending_appends
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pending| {
                    (pending < self.capacity).then_some(pending + 1)
                });
            if reserved.is_err() {
                return Err(QueueError::Full);
            }
        }

        if self.sender.send(write).is_err() {
            if is_append {
                self.pending_appends.fetch_sub(1, Ordering::AcqRel);
            }
            return Err(QueueError::Closed);
        }
        Ok(())
    }

    /// Appends accepted but not yet applied
    pub fn pending_appends(&self) -> usize {
        self.pending_appends.load(Ordering::Acquire)
    }
}

pub struct LogWriter {
    log: Arc<dyn DurableLog>,
    receiver: mpsc::UnboundedReceiver<LogWrite>,
    pending_appends: Arc<AtomicUsize>,
}

impl LogWriter {
    /// Create a writer and the queue feeding it
    ///
    /// `capacity` is clamped to at least one pending append.
    pub fn new(log: Arc<dyn DurableLog>, capacity: usize) -> (Self, LogQueue) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending_appends = Arc::new(AtomicUsize::new(0));
        let queue = LogQueue {
            sender,
            pending_appends: pending_appends.clone(),
            capacity: capacity.max(1),
        };
        let writer = Self {
            log,
            receiver,
            pending_appends,
        };
        (writer, queue)
    }

    /// Apply writes until the manager drops its queue
    pub async fn run(mut self) {
        debug!("Log writer started");

        while let Some(write) = self.receiver.recv().await {
            match write {
                LogWrite::Append { key, value, ttl } => {
                    if let Err(e) = self.append(&key, value, ttl).await {
                        warn!("Dropping log append for {}: {}", key, e);
                    }
                    self.pending_appends.fetch_sub(1, Ordering::AcqRel);
                }
                LogWrite::Purge { key } => match self.log.delete(&key).await {
                    Ok(()) => debug!("Purged log key {}", key),
                    Err(e) => warn!("Failed to purge log key {}: {}", key, e),
                },
                LogWrite::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }

        info!("Log writer shutting down");
    }

    async fn append(&self, key: &str, value: String, ttl: Duration) -> Result<(), LogError> {
        self.log.push(key, value).await?;
        self.log.expire(key, ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::durable_log::MemoryLog;

    fn append(key: &str, value: &str) -> LogWrite {
        LogWrite::Append {
            key: key.to_string(),
            value: value.to_string(),
            ttl: Duration::from_secs(60),
        }
    }

    async fn flush(queue: &LogQueue) {
        let (done_tx, done_rx) = oneshot::channel();
        queue.push(LogWrite::Flush(done_tx)).unwrap();
        done_rx.await.unwrap();
    }

    #[tokio::test]
    async fn test_writes_apply_in_order() {
        let log = MemoryLog::new();
        let (writer, queue) = LogWriter::new(Arc::new(log.clone()), 8);
        tokio::spawn(writer.run());

        queue.push(append("chat:r1", "a")).unwrap();
        queue.push(append("chat:r1", "b")).unwrap();
        queue
            .push(LogWrite::Purge {
                key: "chat:r1".to_string(),
            })
            .unwrap();
        queue.push(append("chat:r1", "c")).unwrap();
        flush(&queue).await;

        assert_eq!(log.range("chat:r1", 0, -1).await.unwrap(), vec!["c"]);
        assert_eq!(queue.pending_appends(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_refuses_appends_but_not_purges() {
        let log = MemoryLog::new();
        let (writer, queue) = LogWriter::new(Arc::new(log.clone()), 1);

        // Writer not running yet, so nothing drains
        queue.push(append("chat:r1", "a")).unwrap();
        assert_eq!(queue.push(append("chat:r1", "b")), Err(QueueError::Full));
        queue
            .push(LogWrite::Purge {
                key: "chat:r1".to_string(),
            })
            .unwrap();

        tokio::spawn(writer.run());
        flush(&queue).await;

        assert!(!log.exists("chat:r1").await.unwrap());
        // Capacity is free again once the writer caught up
        queue.push(append("chat:r1", "c")).unwrap();
    }

    #[tokio::test]
    async fn test_push_after_writer_stopped() {
        let (writer, queue) = LogWriter::new(Arc::new(MemoryLog::new()), 4);
        drop(writer);

        assert_eq!(queue.push(append("chat:r1", "a")), Err(QueueError::Closed));
        assert_eq!(queue.pending_appends(), 0);
    }
}
