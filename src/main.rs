//! Multi-room Chat Server - Entry Point
//!
//! Starts the chat server on the address given as the first argument,
//! or on the default port.

use std::env;

use tracing_subscriber::EnvFilter;

use multiroom_chat::config::DEFAULT_ADDR;
use multiroom_chat::{ChatServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=multiroom_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("multiroom_chat=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Get bind address from command line or use default
    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let server = ChatServer::new(ServerConfig::with_addr(addr));

    // Only returns on a listener failure
    server.listen_and_serve().await?;

    Ok(())
}
