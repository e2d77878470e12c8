//! # Grid Sync - Presence and Painting Server
//!
//! The real-time synchronization engine behind a multiplayer painting game.
//! Players join a room under a username, walk around a bounded grid, and
//! every cell they step on becomes theirs until someone else steps on it.
//! The server keeps every connected client's view of players and grid
//! ownership consistent, and folds each finished session's score into
//! persisted stats.
//!
//! ## Architecture Overview
//!
//! ### Core Components
//!
//! * **Connection Registry** ([`connection`]) - Maps connections (tabs) to identities
//! * **Presence Store** ([`presence`]) - One live record per identity, plus a
//!   process-lifetime color and position cache
//! * **Grid Ownership** ([`grid`]) - Current owner of every cell; scores are derived from it
//! * **Room Dispatcher** ([`dispatch`]) - Fan-out of deltas to room members
//! * **Stats Aggregation** ([`stats`]) - End-of-session fold into [`StatsRecord`]
//!
//! All of them live inside one [`WorldState`] driven by the [`Engine`].
//!
//! ### Message Flow
//!
//! 1. Client sends a WebSocket text frame `{"event": ..., "data": {...}}`
//! 2. [`messaging::route_client_message`] validates it and builds a [`GameEvent`]
//! 3. [`Engine::process`] applies the event under the world lock
//! 4. Resulting deltas are queued to each recipient's outbox
//! 5. The connection's outgoing task writes them to the socket in order
//!
//! ### Session Lifecycle
//!
//! An identity becomes active when its first tab joins and stays active
//! while any tab is open. Closing the last tab broadcasts `player_left`
//! and flushes the session score. Intermediate tab closes are silent.
//!
//! ## Configuration
//!
//! The server can be configured through the [`ServerConfig`] struct:
//!
//! * **Network settings** - Bind address and connection limit
//! * **World** - Grid dimensions, default room and optional RNG seed
//! * **Security** - Per-connection frame rate and message size limits
//!
//! ## Error Handling
//!
//! The server uses structured error types ([`ServerError`]) to categorize failures.
//! Malformed frames and failing persistence calls are logged and never take
//! the server down.

// Re-export core types and functions for easy access
pub use config::{SecurityConfig, ServerConfig, WorldConfig};
pub use engine::{DropReason, Engine, GameEvent, Outcome, WorldState, WorldSummary};
pub use error::{MessageError, ServerError, StoreError};
pub use server::GameServer;
pub use stats::StatsRecord;
pub use store::{MemoryStore, PlayerStore};
pub use types::{Color, Identity, Position, RoomId, WorldBounds};
pub use utils::{create_server, create_server_with_config};

// Public module declarations
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod grid;
pub mod messaging;
pub mod presence;
pub mod security;
pub mod server;
pub mod stats;
pub mod store;
pub mod types;
pub mod utils;

// Internal modules (not part of public API)
mod tests;
