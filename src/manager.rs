//! RoomManager Actor implementation
//!
//! The single authority over room existence and membership. Owns the map of
//! room id → broadcaster and mutates it only from its own run loop, fed by a
//! bounded command channel. The loop never awaits I/O: durable-log side
//! effects are handed to the log writer's queue without waiting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::broadcaster::Broadcaster;
use crate::config::ManagerConfig;
use crate::durable_log::{room_key, DurableLog};
use crate::handle::RoomManagerHandle;
use crate::listener::Listener;
use crate::log_writer::{LogQueue, LogWrite, LogWriter};
use crate::message::ChatMessage;
use crate::types::{ListenerId, RoomId};

/// Commands sent from handles to the RoomManager actor
#[derive(Debug)]
pub enum RoomCommand {
    /// Create a room if absent
    CreateRoom { room_id: RoomId },
    /// Subscribe a new listener, creating the room if needed
    OpenListener {
        room_id: RoomId,
        reply: oneshot::Sender<Listener>,
    },
    /// Unsubscribe a listener
    CloseListener {
        room_id: RoomId,
        listener_id: ListenerId,
    },
    /// Close every listener, forget the room and purge its log key
    DeleteRoom { room_id: RoomId },
    /// Broadcast a message and append it to the room log
    Submit { message: ChatMessage },
    /// Current listener count, None if the room does not exist
    SubscriberCount {
        room_id: RoomId,
        reply: oneshot::Sender<Option<usize>>,
    },
    /// Resolve once every log write issued so far has been applied
    FlushLog { reply: oneshot::Sender<()> },
}

/// The room manager actor
///
/// Processes commands one at a time, so operations on a room are applied
/// in the order they were enqueued.
pub struct RoomManager {
    /// All active rooms: RoomId -> Broadcaster
    rooms: HashMap<RoomId, Broadcaster>,
    /// Command receiver channel
    receiver: mpsc::Receiver<RoomCommand>,
    /// Queue feeding the log writer
    log_writes: LogQueue,
    subscriber_buffer: usize,
    message_ttl: Duration,
}

impl RoomManager {
    /// Create a RoomManager with the given command receiver and log queue
    pub fn new(
        receiver: mpsc::Receiver<RoomCommand>,
        log_writes: LogQueue,
        config: &ManagerConfig,
    ) -> Self {
        Self {
            rooms: HashMap::new(),
            receiver,
            log_writes,
            subscriber_buffer: config.subscriber_buffer.max(1),
            message_ttl: config.message_ttl,
        }
    }

    /// Start the manager loop and its log writer, returning a handle
    ///
    /// Must be called from within a tokio runtime. Both tasks stop once every
    /// handle has been dropped. Zero-sized buffers are raised to one.
    pub fn spawn(log: Arc<dyn DurableLog>, config: ManagerConfig) -> RoomManagerHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer.max(1));
        let (writer, log_writes) = LogWriter::new(log.clone(), config.log_queue);

        tokio::spawn(writer.run());
        tokio::spawn(RoomManager::new(cmd_rx, log_writes, &config).run());

        RoomManagerHandle::new(cmd_tx, log, config.message_ttl)
    }

    /// Run the RoomManager event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("RoomManager started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        for room in self.rooms.values_mut() {
            room.close();
        }
        info!("RoomManager shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::CreateRoom { room_id } => {
                self.handle_create_room(room_id);
            }
            RoomCommand::OpenListener { room_id, reply } => {
                self.handle_open_listener(room_id, reply);
            }
            RoomCommand::CloseListener {
                room_id,
                listener_id,
            } => {
                self.handle_close_listener(&room_id, listener_id);
            }
            RoomCommand::DeleteRoom { room_id } => {
                self.handle_delete_room(&room_id);
            }
            RoomCommand::Submit { message } => {
                self.handle_submit(message);
            }
            RoomCommand::SubscriberCount { room_id, reply } => {
                let count = self.rooms.get(&room_id).map(Broadcaster::subscriber_count);
                let _ = reply.send(count);
            }
            RoomCommand::FlushLog { reply } => {
                self.handle_flush_log(reply);
            }
        }
    }

    /// Handle room creation
    fn handle_create_room(&mut self, room_id: RoomId) {
        if self.rooms.contains_key(&room_id) {
            info!("Room {} already exists", room_id);
            return;
        }

        info!("Room {} created", room_id);
        self.rooms.insert(room_id.clone(), Broadcaster::new(room_id));
        debug!("Total rooms: {}", self.rooms.len());
    }

    /// Handle listener subscription
    fn handle_open_listener(&mut self, room_id: RoomId, reply: oneshot::Sender<Listener>) {
        let room = self.rooms.entry(room_id.clone()).or_insert_with(|| {
            info!("Room {} created for first listener", room_id);
            Broadcaster::new(room_id.clone())
        });

        let listener_id = ListenerId::new();
        let (tx, rx) = mpsc::channel(self.subscriber_buffer);
        room.register(listener_id, tx);

        debug!(
            "Listener {} joined room {} ({} listening)",
            listener_id,
            room_id,
            room.subscriber_count()
        );

        // Caller gave up waiting; don't keep a subscriber nobody reads
        if reply.send(Listener::new(listener_id, room_id, rx)).is_err() {
            room.unregister(listener_id);
        }
    }

    /// Handle listener unsubscription
    fn handle_close_listener(&mut self, room_id: &RoomId, listener_id: ListenerId) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            debug!("Close of listener {} on absent room {}", listener_id, room_id);
            return;
        };

        if room.unregister(listener_id) {
            debug!(
                "Listener {} left room {} ({} listening)",
                listener_id,
                room_id,
                room.subscriber_count()
            );
        }
    }

    /// Handle room deletion
    fn handle_delete_room(&mut self, room_id: &RoomId) {
        let Some(mut room) = self.rooms.remove(room_id) else {
            debug!("Delete of absent room {}", room_id);
            return;
        };

        let listeners = room.subscriber_count();
        room.close();
        info!("Room {} deleted, {} listeners closed", room_id, listeners);

        self.queue_log_write(LogWrite::Purge {
            key: room_key(room_id),
        });
    }

    /// Handle message submission
    ///
    /// Broadcast and log append are independent: the broadcast happens here,
    /// the append is queued and its outcome never reported back.
    fn handle_submit(&mut self, message: ChatMessage) {
        match self.rooms.get_mut(&message.room_id) {
            Some(room) => {
                let report = room.publish(&message.render());
                debug!(
                    "Room {}: message from {} delivered to {}, dropped for {}",
                    message.room_id, message.sender_id, report.delivered, report.dropped
                );
            }
            None => {
                debug!(
                    "Room {} absent, message from {} not broadcast",
                    message.room_id, message.sender_id
                );
            }
        }

        match serde_json::to_string(&message) {
            Ok(value) => self.queue_log_write(LogWrite::Append {
                key: room_key(&message.room_id),
                value,
                ttl: self.message_ttl,
            }),
            Err(e) => warn!("Failed to serialize message for room {}: {}", message.room_id, e),
        }
    }

    /// Handle log flush barrier
    fn handle_flush_log(&self, reply: oneshot::Sender<()>) {
        // Dropping the reply on a stopped writer surfaces as ManagerClosed
        self.queue_log_write(LogWrite::Flush(reply));
    }

    /// Helper: Hand a write to the log writer without waiting
    ///
    /// Only appends can be refused; purges always keep their place in line.
    fn queue_log_write(&self, write: LogWrite) {
        if let Err(e) = self.log_writes.push(write) {
            warn!("Log write dropped: {}", e);
        }
    }
}
