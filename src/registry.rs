//! Room registry actor
//!
//! Maps room names to room actor handles. The map is owned by a single
//! task, so concurrent `/create` commands are applied one after another.
//! Entries are write-once: a name keeps the first room created for it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::room::{Room, RoomHandle};
use crate::types::RoomName;

/// Channel buffer size for registry commands
const REGISTRY_BUFFER_SIZE: usize = 64;

/// Commands sent to the registry actor
#[derive(Debug)]
pub enum RegistryCommand {
    /// Create the room unless it exists, reply with its handle
    GetOrCreate {
        name: RoomName,
        reply: oneshot::Sender<RoomHandle>,
    },
    /// Look up an existing room
    Get {
        name: RoomName,
        reply: oneshot::Sender<Option<RoomHandle>>,
    },
    /// List room names
    List { reply: oneshot::Sender<Vec<RoomName>> },
}

/// Clonable handle to the registry actor
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Start the registry actor
    pub fn spawn(config: Arc<ServerConfig>) -> Self {
        let (sender, receiver) = mpsc::channel(REGISTRY_BUFFER_SIZE);
        let handle = Self { sender };

        let registry = Registry {
            rooms: HashMap::new(),
            receiver,
            handle: handle.clone(),
            config,
        };
        tokio::spawn(registry.run());

        handle
    }

    /// Create a room, or return the existing one with that name
    pub async fn create_room(&self, name: RoomName) -> Result<RoomHandle, AppError> {
        let (reply, rx) = oneshot::channel();
        self.send(RegistryCommand::GetOrCreate { name, reply }).await?;
        rx.await.map_err(|_| AppError::ChannelSend)
    }

    /// Look up a room by name
    pub async fn get_room(&self, name: RoomName) -> Result<RoomHandle, AppError> {
        let (reply, rx) = oneshot::channel();
        self.send(RegistryCommand::Get {
            name: name.clone(),
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| AppError::ChannelSend)?
            .ok_or(AppError::RoomNotFound(name))
    }

    /// Names of all rooms, sorted
    pub async fn rooms(&self) -> Result<Vec<RoomName>, AppError> {
        let (reply, rx) = oneshot::channel();
        self.send(RegistryCommand::List { reply }).await?;
        rx.await.map_err(|_| AppError::ChannelSend)
    }

    async fn send(&self, cmd: RegistryCommand) -> Result<(), AppError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| AppError::ChannelSend)
    }
}

/// The registry actor
struct Registry {
    /// All rooms: RoomName -> RoomHandle
    rooms: HashMap<RoomName, RoomHandle>,
    /// Command receiver channel
    receiver: mpsc::Receiver<RegistryCommand>,
    /// Own handle, passed to every room it creates
    handle: RegistryHandle,
    config: Arc<ServerConfig>,
}

impl Registry {
    async fn run(mut self) {
        debug!("Registry started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        debug!("Registry shutting down");
    }

    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::GetOrCreate { name, reply } => {
                let room = self.get_or_create(name);
                let _ = reply.send(room);
            }
            RegistryCommand::Get { name, reply } => {
                let _ = reply.send(self.rooms.get(&name).cloned());
            }
            RegistryCommand::List { reply } => {
                let mut names: Vec<RoomName> = self.rooms.keys().cloned().collect();
                names.sort();
                let _ = reply.send(names);
            }
        }
    }

    fn get_or_create(&mut self, name: RoomName) -> RoomHandle {
        if let Some(room) = self.rooms.get(&name) {
            debug!("Room {} already exists, reusing it", name);
            return room.clone();
        }

        let room = Room::spawn(name.clone(), self.handle.clone(), self.config.clone());
        self.rooms.insert(name.clone(), room.clone());
        info!("Created room {} (total rooms: {})", name, self.rooms.len());

        room
    }
}
