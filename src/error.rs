//! Error types for the chat server
//!
//! Defines application-level errors and outbound send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;
use tokio_util::codec::AnyDelimiterCodecError;

use crate::types::RoomName;

/// Application-level errors
///
/// Covers both fatal errors (connection or listener termination) and
/// user errors (reported to the client as an error line).
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error, including over-long lines (fatal to the connection)
    #[error("Line codec error: {0}")]
    Codec(#[from] AnyDelimiterCodecError),

    /// Channel send error (fatal - actor queue closed)
    #[error("Channel send error")]
    ChannelSend,

    /// No room registered under the given name
    #[error("Room not found: {0}")]
    RoomNotFound(RoomName),

    /// Switch target is the room the client is already in
    #[error("Already in room: {0}")]
    AlreadyInRoom(RoomName),
}

/// Outbound message errors
///
/// Returned when queueing a line for a client's writer task fails.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The writer task has stopped
    #[error("Channel closed")]
    ChannelClosed,

    /// The client's outbound queue is full
    #[error("Outbound buffer full")]
    BufferFull,
}
