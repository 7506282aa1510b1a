//! Classroom chat server - Entry Point
//!
//! Starts the durable log, the RoomManager actor and the TCP listener,
//! accepting WebSocket connections.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use classroom_chat::{handle_connection, Config, DurableLog, MemoryLog, RedisLog, RoomManager};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=classroom_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("classroom_chat=info")),
        )
        .init();

    let config = Config::parse();

    // Durable log: Redis when configured, otherwise in-process
    let log: Arc<dyn DurableLog> = match &config.redis_url {
        Some(url) => Arc::new(RedisLog::connect(url).await?),
        None => {
            info!("No REDIS_URL set, using in-memory durable log");
            Arc::new(MemoryLog::new())
        }
    };

    let manager = RoomManager::spawn(log, config.manager_config());
    info!("RoomManager actor started");

    // Start TCP listener
    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("Chat server listening on {}", addr);

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let manager = manager.clone();

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, manager).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
