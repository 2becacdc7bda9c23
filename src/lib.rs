//! Multi-room Line Chat Server Library
//!
//! A line-oriented TCP chat server where every room is its own actor.
//!
//! # Features
//! - Newline-delimited UTF-8 text protocol
//! - Every connection starts in the `main` room
//! - `/create <name>` creates a room (or reuses it) and moves into it
//! - `/join <name>` moves into an existing room
//! - Chat lines are broadcast to every member of the sender's room
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - Each `Room` actor exclusively owns its membership
//! - The registry actor owns the room name → room handle map
//! - Each connection has a reader task feeding its current room and a
//!   writer task draining a bounded outbound queue
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use multiroom_chat::{ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = ChatServer::new(ServerConfig::with_addr("127.0.0.1:9801"));
//!     server.listen_and_serve().await.unwrap();
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod room;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use client::{Client, Connection};
pub use config::ServerConfig;
pub use error::{AppError, SendError};
pub use handler::read_lines;
pub use message::{ClientLine, ServerMessage};
pub use registry::RegistryHandle;
pub use room::{Room, RoomEvent, RoomHandle};
pub use server::ChatServer;
pub use types::{ConnectionId, RoomName};
