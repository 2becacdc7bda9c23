//! Chat server listener
//!
//! Owns the room registry and admits every accepted connection into the
//! initial room. Everything after admission happens in room actors and
//! connection readers.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::client::Connection;
use crate::config::ServerConfig;
use crate::error::AppError;
use crate::registry::RegistryHandle;

/// The chat server
pub struct ChatServer {
    config: Arc<ServerConfig>,
    registry: RegistryHandle,
}

impl ChatServer {
    /// Create a server and start its registry
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ServerConfig) -> Self {
        let config = Arc::new(config);
        let registry = RegistryHandle::spawn(config.clone());
        Self { config, registry }
    }

    /// Get a reference to the room registry
    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Bind the configured address and serve forever
    pub async fn listen_and_serve(&self) -> Result<(), AppError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` and admit them to the initial room
    ///
    /// Only returns on an accept failure, which is not retried.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), AppError> {
        let initial = self
            .registry
            .create_room(self.config.initial_room.clone())
            .await?;
        info!("Chat server listening on {}", listener.local_addr()?);

        loop {
            let (stream, addr) = listener.accept().await.map_err(|e| {
                error!("Failed to accept connection: {}", e);
                e
            })?;
            info!("New connection from {}", addr);

            initial.admit(Connection::new(stream, addr.to_string())).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::net::TcpStream;
    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::room::RoomHandle;
    use crate::types::{ConnectionId, RoomName};

    struct TestClient {
        lines: Lines<BufReader<OwnedReadHalf>>,
        writer: OwnedWriteHalf,
    }

    impl TestClient {
        async fn connect(addr: SocketAddr) -> Self {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (read, writer) = stream.into_split();
            Self {
                lines: BufReader::new(read).lines(),
                writer,
            }
        }

        async fn say(&mut self, line: &str) {
            self.writer
                .write_all(format!("{}\n", line).as_bytes())
                .await
                .unwrap();
        }

        async fn expect(&mut self, line: &str) {
            let got = timeout(Duration::from_secs(2), self.lines.next_line())
                .await
                .expect("timed out waiting for a line")
                .unwrap();
            assert_eq!(got.as_deref(), Some(line));
        }
    }

    async fn start() -> (SocketAddr, RegistryHandle) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = ChatServer::new(ServerConfig::with_addr(addr.to_string()));
        let registry = server.registry().clone();
        tokio::spawn(async move { server.serve(listener).await });
        (addr, registry)
    }

    /// Member count of `room`, waiting up to two seconds for `expected`
    async fn wait_for_members(registry: &RegistryHandle, room: &str, expected: usize) -> usize {
        let room = registry.get_room(RoomName::from(room)).await.unwrap();
        for _ in 0..100 {
            let count = room.members().await.unwrap().len();
            if count == expected {
                return count;
            }
            sleep(Duration::from_millis(20)).await;
        }
        room.members().await.unwrap().len()
    }

    /// Number of `rooms` listing `id`, queried in order
    async fn rooms_holding(rooms: &[&RoomHandle], id: ConnectionId) -> usize {
        let mut count = 0;
        for room in rooms {
            if room.members().await.unwrap().contains(&id) {
                count += 1;
            }
        }
        count
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let (addr, _registry) = start().await;

        let mut x = TestClient::connect(addr).await;
        x.expect("Welcome to room main").await;
        let mut y = TestClient::connect(addr).await;
        y.expect("Welcome to room main").await;

        // sender receives its own broadcast
        x.say("hello").await;
        x.expect("hello").await;
        y.expect("hello").await;

        x.say("/create gamma").await;
        x.expect("Welcome to room gamma").await;

        y.say("world").await;
        y.expect("world").await;

        // x's next line is its own gamma message, not "world"
        x.say("only gamma").await;
        x.expect("only gamma").await;
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let (addr, _registry) = start().await;

        let mut a = TestClient::connect(addr).await;
        a.expect("Welcome to room main").await;
        a.say("/create red").await;
        a.expect("Welcome to room red").await;

        let mut b = TestClient::connect(addr).await;
        b.expect("Welcome to room main").await;
        b.say("/create blue").await;
        b.expect("Welcome to room blue").await;

        a.say("in red").await;
        a.expect("in red").await;
        b.say("in blue").await;
        b.expect("in blue").await;
    }

    #[tokio::test]
    async fn test_join_switches_membership() {
        let (addr, registry) = start().await;

        let mut host = TestClient::connect(addr).await;
        host.expect("Welcome to room main").await;
        host.say("/create other").await;
        host.expect("Welcome to room other").await;

        let mut x = TestClient::connect(addr).await;
        x.expect("Welcome to room main").await;
        let mut y = TestClient::connect(addr).await;
        y.expect("Welcome to room main").await;

        x.say("/join other").await;
        x.expect("Welcome to room other").await;
        assert_eq!(wait_for_members(&registry, "main", 1).await, 1);
        assert_eq!(wait_for_members(&registry, "other", 2).await, 2);

        y.say("main only").await;
        y.expect("main only").await;

        host.say("other only").await;
        host.expect("other only").await;
        x.expect("other only").await;
    }

    #[tokio::test]
    async fn test_join_missing_room_reports_error() {
        let (addr, _registry) = start().await;

        let mut x = TestClient::connect(addr).await;
        x.expect("Welcome to room main").await;
        x.say("/join nowhere").await;
        x.expect("Error: Room 'nowhere' does not exist").await;

        x.say("still in main").await;
        x.expect("still in main").await;
    }

    #[tokio::test]
    async fn test_duplicate_create_joins_existing_room() {
        let (addr, registry) = start().await;

        let mut a = TestClient::connect(addr).await;
        a.expect("Welcome to room main").await;
        a.say("/create gamma").await;
        a.expect("Welcome to room gamma").await;

        let mut b = TestClient::connect(addr).await;
        b.expect("Welcome to room main").await;
        b.say("/create gamma").await;
        b.expect("Welcome to room gamma").await;

        b.say("together").await;
        a.expect("together").await;
        b.expect("together").await;
        assert_eq!(
            registry.rooms().await.unwrap(),
            vec![RoomName::from("gamma"), RoomName::from("main")]
        );
    }

    #[tokio::test]
    async fn test_disconnect_cleans_up() {
        let (addr, registry) = start().await;

        let mut x = TestClient::connect(addr).await;
        x.expect("Welcome to room main").await;
        let mut y = TestClient::connect(addr).await;
        y.expect("Welcome to room main").await;
        assert_eq!(wait_for_members(&registry, "main", 2).await, 2);

        drop(x);
        assert_eq!(wait_for_members(&registry, "main", 1).await, 1);

        y.say("anyone?").await;
        y.expect("anyone?").await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_burst_reaches_every_member() {
        let (addr, _registry) = start().await;

        let x = TestClient::connect(addr).await;
        let mut y = TestClient::connect(addr).await;
        let TestClient {
            lines: mut x_lines,
            writer: mut x_writer,
        } = x;
        assert_eq!(
            x_lines.next_line().await.unwrap().as_deref(),
            Some("Welcome to room main")
        );
        y.expect("Welcome to room main").await;

        let x_drain = tokio::spawn(async move {
            let mut received = 0;
            while received < 200 {
                match x_lines.next_line().await {
                    Ok(Some(_)) => received += 1,
                    _ => break,
                }
            }
            received
        });

        let burst: String = (0..200).map(|i| format!("m{}\n", i)).collect();
        x_writer.write_all(burst.as_bytes()).await.unwrap();

        for i in 0..200 {
            y.expect(&format!("m{}", i)).await;
        }
        let echoed = timeout(Duration::from_secs(2), x_drain).await.unwrap().unwrap();
        assert_eq!(echoed, 200);
    }

    #[tokio::test]
    async fn test_switch_under_traffic() {
        let (addr, registry) = start().await;

        let mut host = TestClient::connect(addr).await;
        host.expect("Welcome to room main").await;
        host.say("/create other").await;
        host.expect("Welcome to room other").await;

        let mut x = TestClient::connect(addr).await;
        x.expect("Welcome to room main").await;
        let main = registry.get_room(RoomName::from("main")).await.unwrap();
        let other = registry.get_room(RoomName::from("other")).await.unwrap();
        let x_id = main.members().await.unwrap()[0];

        let y = TestClient::connect(addr).await;
        let TestClient {
            lines: mut y_lines,
            writer: mut y_writer,
        } = y;
        let y_drain = tokio::spawn(async move { while let Ok(Some(_)) = y_lines.next_line().await {} });
        assert_eq!(wait_for_members(&registry, "main", 2).await, 2);
        assert_eq!(rooms_holding(&[&main, &other], x_id).await, 1);

        let traffic = tokio::spawn(async move {
            for i in 0..100 {
                y_writer
                    .write_all(format!("n{}\n", i).as_bytes())
                    .await
                    .unwrap();
                tokio::task::yield_now().await;
            }
            y_writer
        });

        x.say("/join other").await;

        // main is queried before other: enter precedes remove, so a client
        // mid-switch is always seen at least once
        let mut seen = Vec::new();
        loop {
            assert!(rooms_holding(&[&main, &other], x_id).await >= 1);
            let line = timeout(Duration::from_secs(2), x.lines.next_line())
                .await
                .expect("timed out waiting for a line")
                .unwrap()
                .expect("connection closed");
            if line == "Welcome to room other" {
                break;
            }
            assert!(!seen.contains(&line), "{} delivered twice", line);
            seen.push(line);
        }
        assert_eq!(rooms_holding(&[&main, &other], x_id).await, 1);
        assert!(other.members().await.unwrap().contains(&x_id));

        let _y_writer = traffic.await.unwrap();
        assert_eq!(rooms_holding(&[&main, &other], x_id).await, 1);

        // nothing from main arrives after the welcome
        host.say("marker").await;
        host.expect("marker").await;
        x.expect("marker").await;

        y_drain.abort();
    }
}
