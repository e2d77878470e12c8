//! Server configuration types and defaults.
//!
//! This module contains the server configuration structure and default values
//! used to initialize the sync server and size its world.

use crate::error::ServerError;
use crate::types::WorldBounds;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};

/// Configuration structure for the sync server.
///
/// Contains the network settings, the world the engine manages and the
/// per-connection protection limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections allowed
    pub max_connections: usize,

    /// Dimensions, default room and randomness of the world
    pub world: WorldConfig,

    /// Security configuration settings
    pub security: SecurityConfig,
}

/// The grid players paint on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    pub cols: u32,
    pub rows: u32,

    /// Room used when a join names none
    pub default_room: String,

    /// Seed for spawn positions and colors; random when absent
    pub seed: Option<u64>,
}

/// Per-connection protection limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Frames each connection may send per second (0 disables limiting)
    pub max_messages_per_second: u32,

    /// Maximum message size in bytes
    pub max_message_size: usize,
}

impl ServerConfig {
    /// Rejects settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.max_connections == 0 {
            return Err(ServerError::Config("max_connections must be greater than 0".into()));
        }
        if self.world.cols == 0 || self.world.rows == 0 {
            return Err(ServerError::Config(format!(
                "world must have at least one cell, got {}x{}",
                self.world.cols, self.world.rows
            )));
        }
        if i32::try_from(self.world.cols).is_err() || i32::try_from(self.world.rows).is_err() {
            return Err(ServerError::Config(
                "world dimensions must fit in a signed 32-bit coordinate".into(),
            ));
        }
        if self.world.default_room.trim().is_empty() {
            return Err(ServerError::Config("default_room cannot be empty".into()));
        }
        if self.security.max_message_size == 0 {
            return Err(ServerError::Config("max_message_size must be greater than 0".into()));
        }
        Ok(())
    }
}

impl WorldConfig {
    pub fn bounds(&self) -> WorldBounds {
        WorldBounds::new(self.cols, self.rows)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::LOCALHOST, 5000)),
            max_connections: 1000,
            world: WorldConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            cols: 25,
            rows: 25,
            default_room: "main".to_string(),
            seed: None,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_messages_per_second: 30,
            max_message_size: 16 * 1024, // 16KB
        }
    }
}
