//! Routing of raw client frames into engine events.
//!
//! Malformed frames are rejected here and never reach the engine. The caller
//! logs the error and keeps the connection open; nothing is sent back.

use crate::{
    connection::ConnectionId,
    engine::{Engine, GameEvent, Outcome},
    error::MessageError,
    messaging::ClientMessage,
    types::{Identity, RoomId},
};
use tracing::debug;

/// Parses and validates a raw text frame.
///
/// Beyond JSON shape, a join or achievement update with an empty username
/// is rejected as [`MessageError::MissingField`].
pub fn decode_client_message(text: &str) -> Result<ClientMessage, MessageError> {
    let message: ClientMessage = serde_json::from_str(text)?;
    let username = match &message {
        ClientMessage::JoinGame(join) => Some(join.username.as_str()),
        ClientMessage::UpdateAchievements(update) => Some(update.username.as_str()),
        ClientMessage::Move(_) => None,
    };
    if username.is_some_and(|name| name.trim().is_empty()) {
        return Err(MessageError::MissingField("username"));
    }
    Ok(message)
}

/// Converts a decoded message into the event it raises on `connection_id`.
pub fn into_event(message: ClientMessage, connection_id: ConnectionId) -> GameEvent {
    match message {
        ClientMessage::JoinGame(join) => GameEvent::Join {
            connection_id,
            identity: Identity::from(join.username),
            room: join
                .room
                .filter(|room| !room.trim().is_empty())
                .map(RoomId::new),
        },
        ClientMessage::Move(request) => GameEvent::Move {
            connection_id,
            position: request.position,
        },
        ClientMessage::UpdateAchievements(update) => GameEvent::AchievementUpdate {
            identity: Identity::from(update.username),
            achievements: update.achievements,
        },
    }
}

/// Routes a raw client frame to the engine.
///
/// # Message Flow
///
/// 1. Reject frames above `max_size` bytes
/// 2. Parse and validate the frame as a [`ClientMessage`]
/// 3. Convert it into a [`GameEvent`] bound to the connection
/// 4. Process the event to completion
///
/// # Returns
///
/// The engine's outcome, or a [`MessageError`] if the frame was malformed.
pub async fn route_client_message(
    text: &str,
    connection_id: ConnectionId,
    max_size: usize,
    engine: &Engine,
) -> Result<Outcome, MessageError> {
    if text.len() > max_size {
        return Err(MessageError::TooLarge {
            size: text.len(),
            limit: max_size,
        });
    }

    let message = decode_client_message(text)?;
    debug!("📨 Routing message from connection {}: {:?}", connection_id, message);
    Ok(engine.process(into_event(message, connection_id)).await)
}
