//! Utility functions and helper methods for the sync server.
//!
//! This module provides convenient factory functions for creating server
//! instances with different configurations and backends.

use crate::{config::ServerConfig, server::GameServer, store::MemoryStore, store::PlayerStore};
use std::sync::Arc;

/// Creates a new server with default configuration and an in-memory store.
///
/// This is a convenience function for quickly setting up a server
/// with sensible defaults for development and testing.
///
/// # Example
///
/// ```rust
/// # #[tokio::main]
/// # async fn main() {
/// use grid_sync::create_server;
///
/// let server = create_server();
/// assert_eq!(server.active_connections(), 0);
/// # }
/// ```
pub fn create_server() -> GameServer {
    GameServer::new(ServerConfig::default(), Arc::new(MemoryStore::new()))
}

/// Creates a new server with custom configuration and persistence backend.
///
/// # Example
///
/// ```rust
/// # #[tokio::main]
/// # async fn main() {
/// use grid_sync::{create_server_with_config, MemoryStore, ServerConfig};
/// use std::sync::Arc;
///
/// let config = ServerConfig {
///     bind_address: "0.0.0.0:9000".parse().unwrap(),
///     max_connections: 5000,
///     ..Default::default()
/// };
///
/// let server = create_server_with_config(config, Arc::new(MemoryStore::new()));
/// # }
/// ```
pub fn create_server_with_config(config: ServerConfig, store: Arc<dyn PlayerStore>) -> GameServer {
    GameServer::new(config, store)
}
