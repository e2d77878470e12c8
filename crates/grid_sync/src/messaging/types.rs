//! Message type definitions for client-server communication.
//!
//! Every WebSocket text frame, in either direction, is a JSON object with an
//! `event` name and a `data` payload:
//!
//! ```json
//! { "event": "move", "data": { "position": { "x": 3, "y": 4 } } }
//! ```

use crate::presence::PresenceRecord;
use crate::types::{Color, Identity, Position};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Achievement flags keyed by achievement name.
pub type Achievements = BTreeMap<String, bool>;

/// A message sent from a client to the server.
///
/// `connect` and `disconnect` are not frames; the transport raises them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter the game as `username`, in `room` or the default room
    JoinGame(JoinRequest),
    /// Move the joined identity to a cell
    Move(MoveRequest),
    /// Store achievement flags for a user
    UpdateAchievements(AchievementsUpdate),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JoinRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub room: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MoveRequest {
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AchievementsUpdate {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub achievements: Achievements,
}

/// A message sent from the server to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The joining identity's own record
    PlayerData(PlayerView),
    /// Everyone else present in the joined room
    GameState { players: Vec<PlayerView> },
    /// Full ownership table
    GridState {
        cells: Vec<CellView>,
        user_colors: BTreeMap<Identity, Color>,
    },
    PlayerJoined(PlayerView),
    PlayerLeft { username: Identity },
    PlayerMoved(PlayerView),
    CellPainted(CellView),
}

impl ServerMessage {
    /// Wire name of the event.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::PlayerData(_) => "player_data",
            Self::GameState { .. } => "game_state",
            Self::GridState { .. } => "grid_state",
            Self::PlayerJoined(_) => "player_joined",
            Self::PlayerLeft { .. } => "player_left",
            Self::PlayerMoved(_) => "player_moved",
            Self::CellPainted(_) => "cell_painted",
        }
    }
}

/// Public view of a presence record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerView {
    pub username: Identity,
    pub position: Position,
    pub color: Color,
    pub avatar: Option<String>,
}

impl From<&PresenceRecord> for PlayerView {
    fn from(record: &PresenceRecord) -> Self {
        Self {
            username: record.identity.clone(),
            position: record.position,
            color: record.color.clone(),
            avatar: record.avatar.clone(),
        }
    }
}

/// One painted cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellView {
    pub x: i32,
    pub y: i32,
    pub username: Identity,
    pub color: Color,
}

impl CellView {
    pub fn new(at: Position, username: Identity, color: Color) -> Self {
        Self {
            x: at.x,
            y: at.y,
            username,
            color,
        }
    }
}
