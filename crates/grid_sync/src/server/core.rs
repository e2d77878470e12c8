//! Core game server implementation.
//!
//! This module contains the main `GameServer` struct and its implementation,
//! providing the accept loop, connection admission and shutdown coordination
//! around the sync [`Engine`].

use crate::{
    config::ServerConfig,
    engine::Engine,
    error::ServerError,
    security::RateLimiter,
    server::handlers::handle_connection,
    store::PlayerStore,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// The core game server structure.
///
/// `GameServer` owns the transport side of the system: it accepts WebSocket
/// connections, admits them against the connection limit and hands each one
/// to [`handle_connection`]. All game state lives in the shared [`Engine`].
pub struct GameServer {
    /// Server configuration settings
    config: ServerConfig,

    /// The sync engine every connection feeds events into
    engine: Arc<Engine>,

    /// Per-connection frame budget
    rate_limiter: Arc<RateLimiter>,

    /// Channel for coordinating server shutdown
    shutdown_sender: broadcast::Sender<()>,

    /// Number of connections currently being handled
    active_connections: Arc<AtomicUsize>,
}

impl GameServer {
    /// Creates a new game server with the specified configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Configuration parameters for server behavior
    /// * `store` - Persistence backend for stats, avatars and achievements
    pub fn new(config: ServerConfig, store: Arc<dyn PlayerStore>) -> Self {
        let engine = Arc::new(Engine::new(&config.world, store));
        let rate_limiter = Arc::new(RateLimiter::per_second(
            config.security.max_messages_per_second,
        ));
        let (shutdown_sender, _) = broadcast::channel(1);

        Self {
            config,
            engine,
            rate_limiter,
            shutdown_sender,
            active_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Binds the configured address and serves until shutdown.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the server stopped cleanly, a `ServerError::Config` for
    /// unusable settings, or a `ServerError::Network` if the address could not
    /// be bound.
    pub async fn start(&self) -> Result<(), ServerError> {
        self.config.validate()?;
        let listener = TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| {
                ServerError::Network(format!(
                    "Failed to bind {}: {e}",
                    self.config.bind_address
                ))
            })?;
        self.serve(listener).await
    }

    /// Runs the accept loop on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Network(e.to_string()))?;
        info!("🚀 Starting grid sync server on {}", local_addr);
        info!(
            "🌍 World {}x{}, default room '{}'",
            self.config.world.cols, self.config.world.rows, self.config.world.default_room
        );

        let mut shutdown_receiver = self.shutdown_sender.subscribe();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => self.admit(stream, addr),
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                },
                _ = shutdown_receiver.recv() => {
                    info!("Internal shutdown signal received");
                    break;
                }
            }
        }

        info!("Server stopped");
        Ok(())
    }

    fn admit(&self, stream: tokio::net::TcpStream, addr: SocketAddr) {
        let active = self.active_connections.fetch_add(1, Ordering::AcqRel);
        if active >= self.config.max_connections {
            self.active_connections.fetch_sub(1, Ordering::AcqRel);
            warn!(
                "🚫 Refusing connection from {}: limit of {} reached",
                addr, self.config.max_connections
            );
            return;
        }

        let engine = self.engine.clone();
        let rate_limiter = self.rate_limiter.clone();
        let active_connections = self.active_connections.clone();
        let max_message_size = self.config.security.max_message_size;

        // Spawn individual connection handler
        tokio::spawn(async move {
            if let Err(e) =
                handle_connection(stream, addr, engine, rate_limiter, max_message_size).await
            {
                debug!("Connection error: {:?}", e);
            }
            active_connections.fetch_sub(1, Ordering::AcqRel);
        });
    }

    /// Initiates server shutdown.
    ///
    /// Signals the accept loop to stop. Open connections keep running until
    /// their transports close.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        info!("🛑 Shutting down server...");
        let _ = self.shutdown_sender.send(());
        Ok(())
    }

    /// Gets a reference to the sync engine.
    pub fn get_engine(&self) -> Arc<Engine> {
        self.engine.clone()
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
