//! Line protocol definitions
//!
//! Clients send newline-terminated text lines. The first whitespace-separated
//! token decides whether a line is a command or chat text. The server answers
//! with plain text lines.

use std::fmt;

use crate::error::AppError;
use crate::types::RoomName;

/// Client → Server line, after classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLine {
    /// `/create <name>`: create the room if needed and move into it
    Create(RoomName),
    /// `/join <name>`: move into an existing room
    Join(RoomName),
    /// `/leave`: recognized, no effect
    Leave,
    /// `/destroy <name>`: recognized, no effect
    Destroy(RoomName),
    /// Anything else, broadcast to the current room
    Chat(String),
    /// Blank line, ignored
    Empty,
}

impl ClientLine {
    /// Classify one received line
    ///
    /// Verbs are case-sensitive. A verb that needs a room name but has none
    /// is treated as chat text.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let mut tokens = line.split_whitespace();

        match (tokens.next(), tokens.next()) {
            (None, _) => ClientLine::Empty,
            (Some("/create"), Some(name)) => ClientLine::Create(RoomName::from(name)),
            (Some("/join"), Some(name)) => ClientLine::Join(RoomName::from(name)),
            (Some("/leave"), _) => ClientLine::Leave,
            (Some("/destroy"), Some(name)) => ClientLine::Destroy(RoomName::from(name)),
            _ => ClientLine::Chat(line.to_string()),
        }
    }
}

/// Server → Client line
///
/// `Display` renders the line without its terminator; the writer adds `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Sent on admission and after a room switch
    Welcome { room: RoomName },
    /// Broadcast text, no sender prefix
    Chat { text: String },
    /// Error occurred
    Error { message: String },
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Welcome { room } => write!(f, "Welcome to room {}", room),
            ServerMessage::Chat { text } => f.write_str(text),
            ServerMessage::Error { message } => write!(f, "Error: {}", message),
        }
    }
}

/// Convert AppError to ServerMessage for client notification
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        let message = match &err {
            AppError::RoomNotFound(room) => format!("Room '{}' does not exist", room),
            AppError::AlreadyInRoom(room) => format!("You are already in room '{}'", room),
            // Fatal errors are not typically converted (connection closes)
            _ => "Internal error".to_string(),
        };
        ServerMessage::Error { message }
    }
}
