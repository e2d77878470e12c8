//! Main application logic and lifecycle management.
//!
//! This module contains the `Application` struct that orchestrates
//! server startup, periodic health logging and graceful shutdown.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{setup_signal_handlers, setup_signal_handlers_silent},
};
use grid_sync::{GameServer, MemoryStore};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{error, info, warn};

/// Seconds between health log lines
const HEALTH_INTERVAL_SECS: u64 = 60;

pub struct Application {
    config: AppConfig,
    server: Arc<GameServer>,
}

impl Application {
    /// Loads and validates configuration, applies CLI overrides and builds the server.
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        config.apply_cli(&args);

        // Validate configuration
        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        } else {
            info!("✅ Configuration loaded and validated successfully");
        }

        display_banner();

        let server_config = config.to_server_config()?;
        let server = Arc::new(GameServer::new(server_config, Arc::new(MemoryStore::new())));

        Ok(Self { config, server })
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting gridpaint server");
        self.log_configuration_summary();

        // Start server in background
        let server_handle = {
            let server = self.server.clone();
            tokio::spawn(async move {
                match server.start().await {
                    Ok(()) => {
                        info!("✅ Server completed successfully");
                    }
                    Err(e) => {
                        error!("❌ Server error: {:?}", e);
                        std::process::exit(1);
                    }
                }
            })
        };

        // Periodic health logging
        let monitoring_handle = {
            let server = self.server.clone();
            tokio::spawn(async move {
                let mut interval =
                    tokio::time::interval(Duration::from_secs(HEALTH_INTERVAL_SECS));
                interval.tick().await;
                loop {
                    interval.tick().await;
                    let summary = server.get_engine().summary().await;
                    info!(
                        "📊 System Health - {} connection(s) | {} player(s) | {} room(s) | {} painted cell(s)",
                        server.active_connections(),
                        summary.active_players,
                        summary.rooms,
                        summary.painted_cells
                    );
                }
            })
        };

        info!(
            "🎮 Ready to accept connections on {}",
            self.config.server.bind_address
        );
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        setup_signal_handlers().await?;

        // merciless shutdown
        tokio::spawn(async move {
            if let Err(e) = setup_signal_handlers_silent().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }

            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        monitoring_handle.abort();

        info!("🧹 Stopping accept loop...");
        self.server.shutdown().await?;
        match tokio::time::timeout(Duration::from_secs(8), server_handle).await {
            Ok(_) => info!("✅ Server task completed gracefully"),
            Err(e) => warn!("⏰ Server task did not complete within timeout: {:?}", e),
        }

        let summary = self.server.get_engine().summary().await;
        info!("📊 Final Statistics:");
        info!("  - Players still active: {}", summary.active_players);
        info!("  - Painted cells: {}", summary.painted_cells);
        info!("✅ Gridpaint server shutdown complete");

        Ok(())
    }

    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!(
            "  🌍 World: {}x{} | default room '{}'",
            self.config.world.cols, self.config.world.rows, self.config.world.default_room
        );
        info!(
            "  👥 Max connections: {}",
            self.config.server.max_connections
        );
        info!(
            "  🛡️ Rate limit: {} msg/s | max frame {} bytes",
            self.config.security.max_messages_per_second, self.config.security.max_message_size
        );
        if let Some(seed) = self.config.world.seed {
            info!("  🎲 Seed: {}", seed);
        }
    }
}
