//! The synchronization engine.
//!
//! All in-memory state (connection registry, presence store, grid ownership
//! and room membership) lives in one [`WorldState`] owned by the [`Engine`]
//! behind a single `tokio::sync::Mutex`. Every inbound [`GameEvent`] goes
//! through [`Engine::process`], which takes the lock once per state
//! transition, so no two events interleave their reads and writes.
//!
//! Outbound messages are queued into per-connection outboxes while the lock
//! is held. Queuing never blocks, and it keeps each connection's view in
//! event order. The only awaits are persistence calls (avatar lookup on
//! session start, stats flush on session end), and they always run with the
//! lock released.
//!
//! ## Session lifecycle per identity
//!
//! ```text
//! Absent --first tab joins--> Active --more tabs--> Active
//!   ^                            |
//!   +------last tab closes-------+  (player_left + stats flush)
//! ```

use crate::config::WorldConfig;
use crate::connection::{ConnectionId, ConnectionRegistry};
use crate::dispatch::{Audience, Outbox, RoomDispatcher};
use crate::grid::GridOwnership;
use crate::messaging::{Achievements, CellView, PlayerView, ServerMessage};
use crate::presence::{PresenceRecord, PresenceStore};
use crate::stats::{flush_session, StatsRecord};
use crate::store::PlayerStore;
use crate::types::{Color, Identity, Position, RoomId};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace};

/// An inbound event, raised by the transport or decoded from a client frame.
#[derive(Debug)]
pub enum GameEvent {
    /// A transport connected; `outbox` receives everything addressed to it
    Connect {
        connection_id: ConnectionId,
        outbox: Outbox,
    },
    /// The connection asks to play as `identity`
    Join {
        connection_id: ConnectionId,
        identity: Identity,
        room: Option<RoomId>,
    },
    Move {
        connection_id: ConnectionId,
        position: Position,
    },
    /// The transport closed
    Disconnect { connection_id: ConnectionId },
    /// Achievement write, not gated by presence
    AchievementUpdate {
        identity: Identity,
        achievements: Achievements,
    },
    /// The identity's avatar reference changed upstream
    AvatarChange {
        identity: Identity,
        avatar: Option<String>,
    },
}

/// Result of processing one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Dropped(DropReason),
}

/// Why an event was dropped without touching state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The connection is not (or no longer) known to the engine
    UnknownConnection,
    /// The connection or identity has not joined
    NotJoined,
    /// A join arrived on a connection that already joined
    AlreadyJoined,
    /// A move targeted a cell outside the world
    OutOfBounds,
}

/// What a join changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub record: PresenceRecord,
    /// `true` on the Absent→Active transition, `false` for an extra tab
    pub first_connection: bool,
}

/// An identity whose last connection just closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEnd {
    pub identity: Identity,
    pub room: RoomId,
    pub score: u64,
}

/// Point-in-time counters for health logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorldSummary {
    pub active_players: usize,
    pub rooms: usize,
    pub painted_cells: usize,
}

/// The complete in-memory game state.
#[derive(Debug)]
pub struct WorldState {
    registry: ConnectionRegistry,
    presence: PresenceStore,
    grid: GridOwnership,
    dispatcher: RoomDispatcher,
    default_room: RoomId,
}

impl WorldState {
    pub fn new(config: &WorldConfig, rng: StdRng) -> Self {
        let bounds = config.bounds();
        Self {
            registry: ConnectionRegistry::new(),
            presence: PresenceStore::new(bounds, rng),
            grid: GridOwnership::new(bounds),
            dispatcher: RoomDispatcher::new(),
            default_room: RoomId::new(config.default_room.as_str()),
        }
    }

    pub fn presence(&self) -> &PresenceStore {
        &self.presence
    }

    pub fn grid(&self) -> &GridOwnership {
        &self.grid
    }

    /// Registers a bare transport connection.
    pub fn connect(&mut self, connection_id: ConnectionId, outbox: Outbox) {
        self.dispatcher.attach(connection_id, outbox);
    }

    /// Binds a connection to an identity and sends the resulting deltas.
    ///
    /// On the identity's first connection the spawn cell is painted and the
    /// room is told about the newcomer. Every join sends the joining
    /// connection its bootstrap: `player_data`, `game_state` and `grid_state`.
    pub fn join(
        &mut self,
        connection_id: ConnectionId,
        identity: &Identity,
        requested_room: Option<RoomId>,
        avatar: Option<String>,
    ) -> Result<JoinOutcome, DropReason> {
        if !self.dispatcher.is_attached(connection_id) {
            return Err(DropReason::UnknownConnection);
        }
        if self.registry.resolve(connection_id).is_some() {
            return Err(DropReason::AlreadyJoined);
        }

        let requested_room = requested_room.unwrap_or_else(|| self.default_room.clone());
        let (record, first_connection) = self.presence.ensure(identity, requested_room, avatar);
        let record = record.clone();
        let tabs = self.registry.register(connection_id, identity.clone());
        self.dispatcher.join(connection_id, record.room.clone());

        let room = &record.room;
        let me = PlayerView::from(&record);
        self.dispatcher.deliver(
            room,
            Audience::Connection(connection_id),
            ServerMessage::PlayerData(me.clone()),
        );
        self.dispatcher.deliver(
            room,
            Audience::Connection(connection_id),
            self.game_state_for(identity, room),
        );

        if first_connection {
            if let Err(e) = self.grid.paint(record.position, identity) {
                error!("Spawn cell of {} rejected: {}", identity, e);
            }
            self.dispatcher.deliver(
                room,
                Audience::RoomExcept(connection_id),
                ServerMessage::PlayerJoined(me),
            );
            self.dispatcher.deliver(
                room,
                Audience::Room,
                ServerMessage::CellPainted(CellView::new(
                    record.position,
                    identity.clone(),
                    record.color.clone(),
                )),
            );
            self.dispatcher
                .deliver(room, Audience::Room, self.grid_state());
            info!(
                "🎮 {} joined room {} at {} (connection {})",
                identity, room, record.position, connection_id
            );
        } else {
            self.dispatcher.deliver(
                room,
                Audience::Connection(connection_id),
                self.grid_state(),
            );
            debug!(
                "🗂️ {} opened tab {} in room {} ({} open)",
                identity, connection_id, room, tabs
            );
        }

        Ok(JoinOutcome {
            record,
            first_connection,
        })
    }

    /// Moves the identity joined on `connection_id` and paints the destination.
    ///
    /// `player_moved` is always queued before `cell_painted` for the same move.
    pub fn apply_move(
        &mut self,
        connection_id: ConnectionId,
        position: Position,
    ) -> Result<(), DropReason> {
        let Some(identity) = self.registry.resolve(connection_id).cloned() else {
            return Err(DropReason::NotJoined);
        };
        if !self.grid.bounds().contains(position) {
            return Err(DropReason::OutOfBounds);
        }
        if !self.presence.set_position(&identity, position) {
            return Err(DropReason::NotJoined);
        }
        self.grid
            .paint(position, &identity)
            .map_err(|_| DropReason::OutOfBounds)?;

        let Some(record) = self.presence.get(&identity) else {
            return Err(DropReason::NotJoined);
        };
        let room = record.room.clone();
        let color = record.color.clone();
        self.dispatcher.deliver(
            &room,
            Audience::Room,
            ServerMessage::PlayerMoved(PlayerView::from(record)),
        );
        self.dispatcher.deliver(
            &room,
            Audience::Room,
            ServerMessage::CellPainted(CellView::new(position, identity.clone(), color)),
        );
        trace!("➡️ {} moved to {}", identity, position);
        Ok(())
    }

    /// Tears down a connection.
    ///
    /// # Returns
    ///
    /// `Ok(Some(_))` when this was the identity's last connection, after
    /// `player_left` has been queued to the room and the presence record
    /// removed. `Ok(None)` for intermediate tabs and never-joined connections.
    pub fn disconnect(
        &mut self,
        connection_id: ConnectionId,
    ) -> Result<Option<SessionEnd>, DropReason> {
        let attached = self.dispatcher.is_attached(connection_id);
        self.dispatcher.detach(connection_id);

        let Some((identity, remaining)) = self.registry.unregister(connection_id) else {
            return if attached {
                Ok(None)
            } else {
                Err(DropReason::UnknownConnection)
            };
        };
        if remaining > 0 {
            debug!(
                "🗂️ {} closed tab {} ({} still open)",
                identity, connection_id, remaining
            );
            return Ok(None);
        }

        let Some(record) = self.presence.remove(&identity) else {
            return Ok(None);
        };
        let score = self.grid.score_of(&identity);
        self.dispatcher.deliver(
            &record.room,
            Audience::Room,
            ServerMessage::PlayerLeft {
                username: identity.clone(),
            },
        );
        info!(
            "👋 {} left room {} with {} cell(s)",
            identity, record.room, score
        );
        Ok(Some(SessionEnd {
            identity,
            room: record.room,
            score,
        }))
    }

    /// Replaces the avatar of an active identity.
    ///
    /// Connected clients are not notified; the new reference shows up in
    /// every `player_*` view produced afterwards.
    pub fn change_avatar(
        &mut self,
        identity: &Identity,
        avatar: Option<String>,
    ) -> Result<(), DropReason> {
        if !self.presence.set_avatar(identity, avatar) {
            return Err(DropReason::NotJoined);
        }
        debug!("🖼️ Avatar of {} updated", identity);
        Ok(())
    }

    /// Number of cells `identity` currently owns.
    pub fn score_of(&self, identity: &Identity) -> u64 {
        self.grid.score_of(identity)
    }

    pub fn summary(&self) -> WorldSummary {
        WorldSummary {
            active_players: self.presence.len(),
            rooms: self.dispatcher.room_count(),
            painted_cells: self.grid.painted_count(),
        }
    }

    /// Full ownership snapshot as a `grid_state` message.
    pub fn grid_state(&self) -> ServerMessage {
        let mut user_colors = BTreeMap::new();
        let cells = self
            .grid
            .snapshot()
            .into_iter()
            .map(|(at, owner)| {
                let color = self.color_of(&owner);
                user_colors
                    .entry(owner.clone())
                    .or_insert_with(|| color.clone());
                CellView::new(at, owner, color)
            })
            .collect();
        ServerMessage::GridState { cells, user_colors }
    }

    /// Everyone in `room` except `identity`, as a `game_state` message.
    fn game_state_for(&self, identity: &Identity, room: &RoomId) -> ServerMessage {
        let mut players: Vec<PlayerView> = self
            .presence
            .in_room(room)
            .filter(|record| &record.identity != identity)
            .map(PlayerView::from)
            .collect();
        players.sort_by(|a, b| a.username.cmp(&b.username));
        ServerMessage::GameState { players }
    }

    fn color_of(&self, identity: &Identity) -> Color {
        self.presence
            .color_of(identity)
            .cloned()
            .unwrap_or_else(Color::neutral)
    }
}

/// Owns the world state and the persistence collaborator.
pub struct Engine {
    state: Mutex<WorldState>,
    store: Arc<dyn PlayerStore>,
    /// Serializes stats flushes so two session ends never race on one record
    flush_gate: Mutex<()>,
    next_connection_id: AtomicUsize,
}

impl Engine {
    /// Creates an engine. `config.seed` makes spawn and color choices reproducible.
    pub fn new(config: &WorldConfig, store: Arc<dyn PlayerStore>) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, store, rng)
    }

    pub fn with_rng(config: &WorldConfig, store: Arc<dyn PlayerStore>, rng: StdRng) -> Self {
        Self {
            state: Mutex::new(WorldState::new(config, rng)),
            store,
            flush_gate: Mutex::new(()),
            next_connection_id: AtomicUsize::new(1),
        }
    }

    /// Allocates a process-unique connection ID.
    pub fn allocate_connection_id(&self) -> ConnectionId {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Direct access to the world state, mainly for inspection.
    pub fn state(&self) -> &Mutex<WorldState> {
        &self.state
    }

    /// Processes one event to completion.
    pub async fn process(&self, event: GameEvent) -> Outcome {
        let result = match event {
            GameEvent::Connect {
                connection_id,
                outbox,
            } => {
                self.state.lock().await.connect(connection_id, outbox);
                Ok(())
            }
            GameEvent::Join {
                connection_id,
                identity,
                room,
            } => self.join(connection_id, identity, room).await,
            GameEvent::Move {
                connection_id,
                position,
            } => self.state.lock().await.apply_move(connection_id, position),
            GameEvent::Disconnect { connection_id } => self.disconnect(connection_id).await,
            GameEvent::AchievementUpdate {
                identity,
                achievements,
            } => {
                self.update_achievements(identity, achievements).await;
                Ok(())
            }
            GameEvent::AvatarChange { identity, avatar } => {
                self.state.lock().await.change_avatar(&identity, avatar)
            }
        };

        match result {
            Ok(()) => Outcome::Applied,
            Err(DropReason::OutOfBounds) => {
                debug!("Move outside the world dropped");
                Outcome::Dropped(DropReason::OutOfBounds)
            }
            Err(reason) => {
                trace!("Event dropped: {:?}", reason);
                Outcome::Dropped(reason)
            }
        }
    }

    /// Number of cells `identity` currently owns.
    pub async fn score_of(&self, identity: &Identity) -> u64 {
        self.state.lock().await.score_of(identity)
    }

    /// Current presence record of `identity`, if it is active.
    pub async fn presence_of(&self, identity: &Identity) -> Option<PresenceRecord> {
        self.state.lock().await.presence().get(identity).cloned()
    }

    pub async fn summary(&self) -> WorldSummary {
        self.state.lock().await.summary()
    }

    async fn join(
        &self,
        connection_id: ConnectionId,
        identity: Identity,
        room: Option<RoomId>,
    ) -> Result<(), DropReason> {
        // `None` until the store has been consulted for this join
        let mut avatar: Option<Option<String>> = None;
        loop {
            {
                let mut state = self.state.lock().await;
                // Presence check and join share one acquisition
                if avatar.is_some() || state.presence().contains(&identity) {
                    return state
                        .join(connection_id, &identity, room, avatar.flatten())
                        .map(|_| ());
                }
            }
            // Looked up with the lock released; a slow store must not stall the world.
            avatar = Some(self.find_avatar(&identity).await);
        }
    }

    async fn find_avatar(&self, identity: &Identity) -> Option<String> {
        match self.store.find_avatar(identity).await {
            Ok(avatar) => avatar,
            Err(e) => {
                error!("❌ Avatar lookup for {} failed: {}", identity, e);
                None
            }
        }
    }

    async fn disconnect(&self, connection_id: ConnectionId) -> Result<(), DropReason> {
        let ended = self.state.lock().await.disconnect(connection_id)?;
        if let Some(session) = ended {
            self.flush(session).await;
        }
        Ok(())
    }

    async fn flush(&self, session: SessionEnd) -> Option<StatsRecord> {
        let _gate = self.flush_gate.lock().await;
        match flush_session(self.store.as_ref(), &session.identity, session.score).await {
            Ok(record) => Some(record),
            Err(e) => {
                error!(
                    "❌ Stats flush for {} (score {}) failed: {}",
                    session.identity, session.score, e
                );
                None
            }
        }
    }

    async fn update_achievements(&self, identity: Identity, achievements: Achievements) {
        let count = achievements.len();
        match self.store.update_achievements(&identity, achievements).await {
            Ok(()) => debug!("🏆 Stored {} achievement flag(s) for {}", count, identity),
            Err(e) => error!("❌ Achievement update for {} failed: {}", identity, e),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("next_connection_id", &self.next_connection_id)
            .finish_non_exhaustive()
    }
}
