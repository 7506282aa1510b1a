//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake, message
//! parsing, and the live room stream. Each joined room is streamed by its
//! own task, which closes the listener when the client leaves or disconnects.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::handle::RoomManagerHandle;
use crate::listener::StreamEnd;
use crate::message::{ClientMessage, ServerMessage};
use crate::types::{RoomId, UserId};

/// Outbound buffer between the connection's tasks and the socket writer
const OUTBOUND_BUFFER_SIZE: usize = 32;

/// Handle a new TCP connection
///
/// Performs WebSocket handshake, sets up bidirectional communication,
/// and manages the connection lifecycle.
pub async fn handle_connection(
    stream: TcpStream,
    manager: RoomManagerHandle,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let connection_id = Uuid::new_v4();
    info!("Connection {} opened from {}", connection_id, peer_addr);

    // Send connection success message
    let connected_msg = ServerMessage::Connected {
        connection_id: connection_id.to_string(),
    };
    let json = serde_json::to_string(&connected_msg)?;
    ws_sender.send(Message::Text(json.into())).await?;

    // Create channel for everything headed to the socket
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_BUFFER_SIZE);

    // Spawn write task (ServerMessage -> WebSocket)
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                }
            }
        }
        debug!("Write task ended");

        let _ = ws_sender.close().await;
    });

    let mut session = Session::new(manager, out_tx.clone());

    // Read loop (WebSocket -> manager)
    let read_loop = async {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    let reply = match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => session.dispatch(client_msg).await,
                        Err(e) => {
                            warn!("Invalid JSON from {}: {}", connection_id, e);
                            Err(AppError::Json(e))
                        }
                    };

                    let reply = match reply {
                        Ok(Some(msg)) => msg,
                        Ok(None) => continue,
                        Err(AppError::ManagerClosed) => {
                            error!("Room manager closed, dropping {}", connection_id);
                            break;
                        }
                        Err(e) => e.into(),
                    };
                    if out_tx.send(reply).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Connection {} sent close frame", connection_id);
                    break;
                }
                Ok(_) => {
                    // Binary, ping/pong - pong is handled by tungstenite
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", connection_id, e);
                    break;
                }
            }
        }
        debug!("Read loop ended for {}", connection_id);
    };

    // Wait for either side to finish
    tokio::select! {
        _ = read_loop => {}
        _ = &mut write_task => {
            debug!("Write task completed for {}", connection_id);
        }
    }

    // Release the live subscription, if any
    session.leave();
    write_task.abort();

    info!("Connection {} closed", connection_id);

    Ok(())
}

/// Room currently streamed to this connection
struct Joined {
    room_id: RoomId,
    cancel: oneshot::Sender<()>,
}

/// Per-connection state
struct Session {
    manager: RoomManagerHandle,
    outbound: mpsc::Sender<ServerMessage>,
    user_id: Option<UserId>,
    joined: Option<Joined>,
}

impl Session {
    fn new(manager: RoomManagerHandle, outbound: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            manager,
            outbound,
            user_id: None,
            joined: None,
        }
    }

    /// Execute one client request, returning the reply to send
    async fn dispatch(&mut self, msg: ClientMessage) -> Result<Option<ServerMessage>, AppError> {
        match msg {
            ClientMessage::Identify { user_id } => {
                info!("Connection identified as {}", user_id);
                self.user_id = Some(UserId::new(user_id.clone()));
                Ok(Some(ServerMessage::Identified { user_id }))
            }
            ClientMessage::CreateRoom { room_id } => {
                self.manager.create_room(RoomId::new(room_id.clone())).await?;
                Ok(Some(ServerMessage::RoomCreated { room_id }))
            }
            ClientMessage::Join { room_id } => {
                self.join(RoomId::new(room_id)).await?;
                Ok(None)
            }
            ClientMessage::Leave => match self.leave() {
                Some(room_id) => Ok(Some(ServerMessage::Left {
                    room_id: room_id.to_string(),
                })),
                None => Err(AppError::NotInRoom),
            },
            ClientMessage::Chat { text } => {
                let user_id = self.user_id.clone().ok_or(AppError::NotIdentified)?;
                let room_id = self
                    .joined
                    .as_ref()
                    .map(|joined| joined.room_id.clone())
                    .ok_or(AppError::NotInRoom)?;

                self.manager.submit(user_id, room_id.clone(), text).await?;
                Ok(Some(ServerMessage::Sent {
                    room_id: room_id.to_string(),
                }))
            }
            ClientMessage::DeleteRoom { room_id } => {
                self.manager.delete_room(RoomId::new(room_id.clone())).await?;
                Ok(Some(ServerMessage::RoomDeleted { room_id }))
            }
            ClientMessage::History { room_id } => {
                let messages = self.manager.room_messages(&RoomId::new(room_id.clone())).await?;
                Ok(Some(ServerMessage::History { room_id, messages }))
            }
            ClientMessage::Direct { receiver_id, text } => {
                let user_id = self.user_id.clone().ok_or(AppError::NotIdentified)?;
                self.manager
                    .submit_direct(user_id, UserId::new(receiver_id.clone()), text)
                    .await?;
                Ok(Some(ServerMessage::DirectSent { receiver_id }))
            }
            ClientMessage::FetchDirect {
                sender_id,
                receiver_id,
            } => {
                let messages = self
                    .manager
                    .get_direct_messages(
                        &UserId::new(sender_id.clone()),
                        &UserId::new(receiver_id.clone()),
                    )
                    .await?;
                Ok(Some(ServerMessage::DirectMessages {
                    sender_id,
                    receiver_id,
                    messages,
                }))
            }
            ClientMessage::DeleteDirect {
                sender_id,
                receiver_id,
            } => {
                self.manager
                    .delete_direct_messages(
                        &UserId::new(sender_id.clone()),
                        &UserId::new(receiver_id.clone()),
                    )
                    .await?;
                Ok(Some(ServerMessage::DirectDeleted {
                    sender_id,
                    receiver_id,
                }))
            }
        }
    }

    /// Subscribe to a room and start streaming it, leaving any current room
    async fn join(&mut self, room_id: RoomId) -> Result<(), AppError> {
        self.leave();

        let listener = self.manager.open_listener(room_id.clone()).await?;
        let (cancel, cancelled) = oneshot::channel::<()>();

        // Confirm before the stream task can push messages
        let _ = self
            .outbound
            .send(ServerMessage::Joined {
                room_id: room_id.to_string(),
            })
            .await;

        let manager = self.manager.clone();
        let outbound = self.outbound.clone();
        let stream_room = room_id.to_string();
        tokio::spawn(async move {
            let cancel_signal = async {
                let _ = cancelled.await;
            };
            let payload_room = stream_room.clone();
            let end = listener
                .pump(&manager, &outbound, cancel_signal, move |payload| {
                    ServerMessage::Message {
                        room_id: payload_room.clone(),
                        payload,
                    }
                })
                .await;

            if end == StreamEnd::RoomClosed {
                let _ = outbound
                    .send(ServerMessage::RoomClosed {
                        room_id: stream_room,
                    })
                    .await;
            }
        });

        self.joined = Some(Joined { room_id, cancel });
        Ok(())
    }

    /// Stop streaming the current room, returning its id
    fn leave(&mut self) -> Option<RoomId> {
        let joined = self.joined.take()?;
        // Stream task closes the listener when it sees this
        let _ = joined.cancel.send(());
        Some(joined.room_id)
    }
}
