//! Server configuration

use crate::types::RoomName;

/// Default listen address
pub const DEFAULT_ADDR: &str = "0.0.0.0:9801";

/// Room every new connection is admitted to
pub const INITIAL_ROOM: &str = "main";

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,

    /// Room new connections are admitted to
    pub initial_room: RoomName,

    /// Longest accepted line in bytes; a longer line disconnects the client
    pub max_line_length: usize,

    /// Per-connection outbound queue capacity, in lines. A member that falls
    /// this far behind is disconnected. Keep it above `room_buffer`.
    pub outbound_buffer: usize,

    /// Per-room event queue capacity
    pub room_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.to_string(),
            initial_room: RoomName::from(INITIAL_ROOM),
            max_line_length: 4096,
            outbound_buffer: 1024,
            room_buffer: 256,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: impl Into<String>) -> Self {
        Self {
            bind_addr: addr.into(),
            ..Default::default()
        }
    }
}
