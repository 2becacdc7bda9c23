//! Client connection and outbound path
//!
//! A `Connection` is an accepted stream waiting for admission. Once a room
//! admits it, the write half moves into a dedicated writer task and the room
//! keeps a `Client` handle that queues lines for that task.

use std::fmt;

use futures_util::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::codec::{FramedWrite, LinesCodec};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, warn};

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::ConnectionId;

/// Byte stream a client talks over (TCP in production, duplex pipes in tests)
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Accepted connection that has not been admitted to a room yet
pub struct Connection {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Remote address, for logging
    pub peer: String,
    /// The underlying stream
    pub stream: Box<dyn Transport>,
}

impl Connection {
    /// Wrap a stream with a fresh connection ID
    pub fn new(stream: impl Transport, peer: impl Into<String>) -> Self {
        Self {
            id: ConnectionId::new(),
            peer: peer.into(),
            stream: Box::new(stream),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

/// Handle to a connected client's outbound queue
///
/// Clones share the same writer task and shutdown token. Rooms hold one per
/// member; the connection's reader holds another.
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique identifier for this client
    pub id: ConnectionId,
    /// Remote address, for logging
    pub peer: String,
    /// Room → writer task channel
    sender: mpsc::Sender<ServerMessage>,
    /// Cancelled when the server drops the connection
    shutdown: CancellationToken,
}

impl Client {
    /// Create a new client with the given ID and sender channel
    pub fn new(id: ConnectionId, peer: impl Into<String>, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self::with_shutdown(id, peer, sender, CancellationToken::new())
    }

    /// Create a client sharing `shutdown` with its writer task
    pub fn with_shutdown(
        id: ConnectionId,
        peer: impl Into<String>,
        sender: mpsc::Sender<ServerMessage>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            peer: peer.into(),
            sender,
            shutdown,
        }
    }

    /// Drop the connection: stops its writer and its reader
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once `close` has been called on any clone
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.shutdown.cancelled()
    }

    /// Queue a line for this client without waiting
    ///
    /// Fails with `BufferFull` when the client is not keeping up and with
    /// `ChannelClosed` once its writer has stopped.
    pub fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => SendError::BufferFull,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }
}

/// Spawn the writer task for one connection
///
/// Returns the sender side of its bounded queue. The task ends when every
/// sender is dropped, a write fails or `shutdown` is cancelled, and closes
/// the write half on exit.
pub fn spawn_writer<W>(
    id: ConnectionId,
    writer: W,
    buffer: usize,
    shutdown: CancellationToken,
) -> mpsc::Sender<ServerMessage>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(buffer);
    let mut sink = FramedWrite::new(writer, LinesCodec::new());

    tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Writer for {} shut down", id);
                    break;
                }
                msg = rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };

            if let Err(e) = sink.send(msg.to_string()).await {
                warn!("Write to {} failed: {}", id, e);
                break;
            }
        }
        debug!("Write task ended for {}", id);

        let _ = SinkExt::<String>::close(&mut sink).await;
    });

    tx
}
