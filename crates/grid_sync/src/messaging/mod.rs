//! Message handling and routing for client-server communication.
//!
//! This module provides the wire types exchanged with clients and the
//! decoding of inbound frames into engine events.

pub mod router;
pub mod types;

pub use router::{decode_client_message, route_client_message};
pub use types::{
    Achievements, AchievementsUpdate, CellView, ClientMessage, JoinRequest, MoveRequest,
    PlayerView, ServerMessage,
};
