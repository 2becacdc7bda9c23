//! Room actor implementation
//!
//! Each room runs its own actor task that exclusively owns the room's
//! membership. Admission, removal and broadcast all arrive as `RoomEvent`s
//! and are applied one at a time, so membership needs no locks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{self, Client, Connection};
use crate::config::ServerConfig;
use crate::error::{AppError, SendError};
use crate::handler;
use crate::message::ServerMessage;
use crate::registry::RegistryHandle;
use crate::types::{ConnectionId, RoomName};

/// Events processed by a room actor
#[derive(Debug)]
pub enum RoomEvent {
    /// Newly accepted connection: welcome it and start its reader
    Admit(Connection),
    /// Running client switching in from another room
    Enter {
        client: Client,
        ack: oneshot::Sender<()>,
    },
    /// Client left (disconnect or switch away)
    Remove {
        id: ConnectionId,
        ack: Option<oneshot::Sender<()>>,
    },
    /// Chat line for every current member, acknowledged once queued to all
    Broadcast {
        text: String,
        ack: oneshot::Sender<()>,
    },
    /// Snapshot of current member IDs
    Members {
        reply: oneshot::Sender<Vec<ConnectionId>>,
    },
}

/// Clonable handle for sending events to a room actor
#[derive(Debug, Clone)]
pub struct RoomHandle {
    name: RoomName,
    sender: mpsc::Sender<RoomEvent>,
}

impl RoomHandle {
    pub fn name(&self) -> &RoomName {
        &self.name
    }

    /// Admit a new connection
    pub async fn admit(&self, conn: Connection) -> Result<(), AppError> {
        self.send(RoomEvent::Admit(conn)).await
    }

    /// Register an already-running client and wait until it is a member
    pub async fn enter(&self, client: Client) -> Result<(), AppError> {
        let (ack, done) = oneshot::channel();
        self.send(RoomEvent::Enter { client, ack }).await?;
        done.await.map_err(|_| AppError::ChannelSend)
    }

    /// Remove a client without waiting for the room to apply it
    pub async fn remove(&self, id: ConnectionId) -> Result<(), AppError> {
        self.send(RoomEvent::Remove { id, ack: None }).await
    }

    /// Remove a client and wait until it is no longer a member
    pub async fn remove_and_wait(&self, id: ConnectionId) -> Result<(), AppError> {
        let (ack, done) = oneshot::channel();
        self.send(RoomEvent::Remove { id, ack: Some(ack) }).await?;
        done.await.map_err(|_| AppError::ChannelSend)
    }

    /// Broadcast a line and wait until every member has it queued
    ///
    /// Waiting here keeps a fast sender from running ahead of its room.
    pub async fn broadcast(&self, text: String) -> Result<(), AppError> {
        let (ack, done) = oneshot::channel();
        self.send(RoomEvent::Broadcast { text, ack }).await?;
        done.await.map_err(|_| AppError::ChannelSend)
    }

    pub async fn members(&self) -> Result<Vec<ConnectionId>, AppError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomEvent::Members { reply }).await?;
        rx.await.map_err(|_| AppError::ChannelSend)
    }

    async fn send(&self, event: RoomEvent) -> Result<(), AppError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| AppError::ChannelSend)
    }
}

/// Member entry: outbound handle plus join time
#[derive(Debug)]
struct Member {
    client: Client,
    joined_at: Instant,
}

/// The room actor
pub struct Room {
    /// Room name, immutable
    name: RoomName,
    /// Current members: ConnectionId -> Member
    members: HashMap<ConnectionId, Member>,
    /// Event receiver channel
    receiver: mpsc::Receiver<RoomEvent>,
    /// Own handle, given to the readers this room spawns
    handle: RoomHandle,
    /// Registry handle, given to the readers this room spawns
    registry: RegistryHandle,
    config: Arc<ServerConfig>,
}

impl Room {
    /// Start a room actor and return its handle
    ///
    /// The room holds a sender to itself, so its loop runs for the life of
    /// the process.
    pub fn spawn(name: RoomName, registry: RegistryHandle, config: Arc<ServerConfig>) -> RoomHandle {
        let (sender, receiver) = mpsc::channel(config.room_buffer);
        let handle = RoomHandle { name: name.clone(), sender };

        let room = Room {
            name,
            members: HashMap::new(),
            receiver,
            handle: handle.clone(),
            registry,
            config,
        };
        tokio::spawn(room.run());

        handle
    }

    /// Run the room event loop
    async fn run(mut self) {
        info!("Room {} started", self.name);

        while let Some(event) = self.receiver.recv().await {
            self.handle_event(event);
        }

        info!("Room {} shutting down", self.name);
    }

    /// Process a single event
    fn handle_event(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::Admit(conn) => self.handle_admit(conn),
            RoomEvent::Enter { client, ack } => {
                self.insert(client);
                let _ = ack.send(());
            }
            RoomEvent::Remove { id, ack } => {
                self.handle_remove(id);
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            RoomEvent::Broadcast { text, ack } => {
                self.handle_broadcast(text);
                let _ = ack.send(());
            }
            RoomEvent::Members { reply } => {
                let _ = reply.send(self.members.keys().copied().collect());
            }
        }
    }

    /// Handle a newly accepted connection
    fn handle_admit(&mut self, conn: Connection) {
        let Connection { id, peer, stream } = conn;
        let (read_half, write_half) = tokio::io::split(stream);

        let shutdown = CancellationToken::new();
        let sender = client::spawn_writer(id, write_half, self.config.outbound_buffer, shutdown.clone());
        let client = Client::with_shutdown(id, peer, sender, shutdown);

        if let Err(e) = client.send(ServerMessage::Welcome {
            room: self.name.clone(),
        }) {
            warn!("Failed to welcome {} ({}): {}", client.id, client.peer, e);
        }

        info!("Client {} ({}) admitted to room {}", client.id, client.peer, self.name);
        self.insert(client.clone());

        tokio::spawn(handler::read_lines(
            read_half,
            client,
            self.handle.clone(),
            self.registry.clone(),
            self.config.max_line_length,
        ));
    }

    /// Handle a departure; unknown IDs are ignored
    fn handle_remove(&mut self, id: ConnectionId) {
        match self.members.remove(&id) {
            Some(member) => {
                info!(
                    "Client {} left room {} after {:?}",
                    id,
                    self.name,
                    member.joined_at.elapsed()
                );
            }
            None => debug!("Client {} was not in room {}", id, self.name),
        }
        debug!("Room {} members: {}", self.name, self.members.len());
    }

    /// Queue a line to every member, sender included
    ///
    /// A member whose writer has failed is logged and stays a member; its
    /// reader removes it once the stream ends. A member whose queue is full
    /// has stopped reading: it is evicted and its connection closed.
    fn handle_broadcast(&mut self, text: String) {
        debug!("Broadcast in room {} to {} members", self.name, self.members.len());

        let mut stalled = Vec::new();
        for member in self.members.values() {
            let msg = ServerMessage::Chat { text: text.clone() };
            match member.client.send(msg) {
                Ok(()) => {}
                Err(SendError::BufferFull) => stalled.push(member.client.id),
                Err(e) => warn!(
                    "Failed to deliver to {} ({}) in room {}: {}",
                    member.client.id, member.client.peer, self.name, e
                ),
            }
        }

        for id in stalled {
            if let Some(member) = self.members.remove(&id) {
                warn!(
                    "Disconnecting {} ({}) from room {}: outbound queue full",
                    id, member.client.peer, self.name
                );
                member.client.close();
            }
        }
    }

    fn insert(&mut self, client: Client) {
        let id = client.id;
        self.members.insert(
            id,
            Member {
                client,
                joined_at: Instant::now(),
            },
        );
        debug!("Room {} members: {}", self.name, self.members.len());
    }
}
