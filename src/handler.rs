//! Connection reader
//!
//! Reads newline-delimited lines from one client, turns chat lines into room
//! broadcasts and runs `/create` and `/join` room switches. Every way out of
//! the read loop removes the client from the room it is in at that moment.
//! Bytes that are not valid UTF-8 are replaced, not treated as a read error.

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};
use tracing::{debug, error, info, warn};

use crate::client::Client;
use crate::error::AppError;
use crate::message::{ClientLine, ServerMessage};
use crate::registry::RegistryHandle;
use crate::room::RoomHandle;

/// Read lines from a client until its stream ends
///
/// `room` is the room that admitted the client; it is rebound on every
/// successful switch.
pub async fn read_lines<R>(
    reader: R,
    client: Client,
    mut room: RoomHandle,
    registry: RegistryHandle,
    max_line_length: usize,
) where
    R: AsyncRead + Send + Unpin + 'static,
{
    let codec = AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), max_line_length);
    let mut lines = FramedRead::new(reader, codec);

    loop {
        let result = tokio::select! {
            _ = client.closed() => {
                info!("Closing connection {} ({})", client.id, client.peer);
                break;
            }
            next = lines.next() => match next {
                Some(result) => result,
                None => break,
            },
        };

        let line = match result {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!("Read error for {}: {}", client.id, AppError::from(e));
                break;
            }
        };

        match handle_line(&line, &client, &mut room, &registry).await {
            Ok(()) => {}
            Err(AppError::ChannelSend) => {
                error!("Room queue closed, ending reader for {}", client.id);
                break;
            }
            Err(e) => {
                debug!("Command from {} rejected: {}", client.id, e);
                if let Err(e) = client.send(e.into()) {
                    warn!("Failed to send error to {}: {}", client.id, e);
                }
            }
        }
    }

    if let Err(e) = room.remove(client.id).await {
        error!("Failed to remove {} from room {}: {}", client.id, room.name(), e);
    }

    info!("Client {} ({}) disconnected", client.id, client.peer);
}

/// Apply one received line
async fn handle_line(
    line: &str,
    client: &Client,
    room: &mut RoomHandle,
    registry: &RegistryHandle,
) -> Result<(), AppError> {
    match ClientLine::parse(line) {
        ClientLine::Empty => Ok(()),
        ClientLine::Chat(text) => {
            debug!("{} in {}: {}", client.peer, room.name(), text);
            room.broadcast(text).await
        }
        ClientLine::Create(name) => {
            let target = registry.create_room(name).await?;
            switch_room(client, room, target).await
        }
        ClientLine::Join(name) => {
            let target = registry.get_room(name).await?;
            switch_room(client, room, target).await
        }
        ClientLine::Leave | ClientLine::Destroy(_) => {
            debug!("Ignoring unsupported command from {}: {}", client.id, line.trim());
            Ok(())
        }
    }
}

/// Move a client from `current` into `target`
///
/// The client enters the target before it leaves the source, so it is never
/// without a room while its reader runs. The welcome line is queued only
/// after both steps: no source-room line follows it, and anything the client
/// sends after seeing it lands in the new room. Lines broadcast in the target
/// while the switch is in progress may reach the client before the welcome,
/// interleaved with the last lines of the source room.
async fn switch_room(
    client: &Client,
    current: &mut RoomHandle,
    target: RoomHandle,
) -> Result<(), AppError> {
    if target.name() == current.name() {
        return Err(AppError::AlreadyInRoom(target.name().clone()));
    }

    target.enter(client.clone()).await?;
    current.remove_and_wait(client.id).await?;

    info!(
        "Client {} switched from room {} to room {}",
        client.id,
        current.name(),
        target.name()
    );
    *current = target;

    if let Err(e) = client.send(ServerMessage::Welcome {
        room: current.name().clone(),
    }) {
        warn!("Failed to welcome {} to room {}: {}", client.id, current.name(), e);
    }

    Ok(())
}
