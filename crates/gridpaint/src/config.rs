//! Configuration management for the gridpaint server.
//!
//! This module handles loading, validation, and conversion of server configuration
//! from TOML files and command-line arguments.

use crate::cli::CliArgs;
use grid_sync::{SecurityConfig, ServerConfig, WorldConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

fn default_max_connections() -> usize {
    1000
}

fn default_max_messages_per_second() -> u32 {
    30
}

fn default_max_message_size() -> usize {
    16 * 1024
}

/// Application configuration loaded from TOML file.
///
/// This is the main configuration structure that encompasses all server settings
/// including networking, the world, protection limits and logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration settings
    pub server: ServerSettings,
    /// World configuration settings
    #[serde(default)]
    pub world: WorldSettings,
    /// Per-connection protection limits
    #[serde(default)]
    pub security: SecuritySettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Server-specific configuration settings.
///
/// Controls network binding and connection limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:5000")
    pub bind_address: String,
    /// Maximum number of concurrent client connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// The painted grid and its rooms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSettings {
    pub cols: u32,
    pub rows: u32,
    /// Room used by joins that do not name one
    pub default_room: String,
    /// Fixed seed for spawn positions and colors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySettings {
    /// Frames per second each connection may send (0 disables limiting)
    #[serde(default = "default_max_messages_per_second")]
    pub max_messages_per_second: u32,
    /// Largest accepted text frame in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Logging system configuration.
///
/// Controls log output format and level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for WorldSettings {
    fn default() -> Self {
        let world = WorldConfig::default();
        Self {
            cols: world.cols,
            rows: world.rows,
            default_room: world.default_room,
            seed: world.seed,
        }
    }
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            max_messages_per_second: default_max_messages_per_second(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_address: "127.0.0.1:5000".to_string(),
                max_connections: default_max_connections(),
            },
            world: WorldSettings::default(),
            security: SecuritySettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the specified path
    /// and returns the default configuration.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// The loaded or default configuration, or an error if loading/creation failed.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Create default config file
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies command-line overrides on top of the file settings.
    pub fn apply_cli(&mut self, args: &CliArgs) {
        if let Some(bind_address) = &args.bind_address {
            self.server.bind_address = bind_address.clone();
        }

        if let Some(log_level) = &args.log_level {
            self.logging.level = log_level.clone();
        }

        if args.json_logs {
            self.logging.json_format = true;
        }

        if args.seed.is_some() {
            self.world.seed = args.seed;
        }
    }

    /// Converts the application configuration to a sync server configuration.
    ///
    /// # Returns
    ///
    /// A `ServerConfig` instance ready for use with the server.
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        Ok(ServerConfig {
            bind_address: self.server.bind_address.parse()?,
            max_connections: self.server.max_connections,
            world: WorldConfig {
                cols: self.world.cols,
                rows: self.world.rows,
                default_room: self.world.default_room.clone(),
                seed: self.world.seed,
            },
            security: SecurityConfig {
                max_messages_per_second: self.security.max_messages_per_second,
                max_message_size: self.security.max_message_size,
            },
        })
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        // Validate bind address
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "Invalid bind address: {}",
                &self.server.bind_address
            ));
        }

        if self.server.max_connections == 0 {
            return Err("server.max_connections must be greater than 0".to_string());
        }

        if self.world.cols == 0 || self.world.rows == 0 {
            return Err(format!(
                "World must have at least one cell, got {}x{}",
                self.world.cols, self.world.rows
            ));
        }
        // Coordinates travel as i32
        if self.world.cols > i32::MAX as u32 || self.world.rows > i32::MAX as u32 {
            return Err("World dimensions must fit in a signed 32-bit coordinate".to_string());
        }

        if self.world.default_room.trim().is_empty() {
            return Err("world.default_room cannot be empty".to_string());
        }

        if self.security.max_message_size == 0 {
            return Err("security.max_message_size must be greater than 0".to_string());
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
