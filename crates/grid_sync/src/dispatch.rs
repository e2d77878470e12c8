//! Room-scoped fan-out of server messages.
//!
//! Every live connection owns an unbounded outbox drained by its transport
//! task. The dispatcher maps rooms to the connections joined to them and
//! pushes messages into those outboxes. Delivery is fire-and-forget: a
//! connection whose transport already closed simply misses the message, and
//! the next bootstrap on re-join resynchronizes it.

use crate::connection::ConnectionId;
use crate::messaging::ServerMessage;
use crate::types::RoomId;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// Per-connection sender for outbound messages.
pub type Outbox = mpsc::UnboundedSender<Arc<ServerMessage>>;

/// Receiving half of an [`Outbox`].
pub type Inbox = mpsc::UnboundedReceiver<Arc<ServerMessage>>;

/// Which connections of a room receive a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every connection in the room, including the originator's tabs
    Room,
    /// Every connection in the room except the triggering connection
    RoomExcept(ConnectionId),
    /// Only the triggering connection
    Connection(ConnectionId),
}

/// Tracks outboxes and room membership of live connections.
#[derive(Debug, Default)]
pub struct RoomDispatcher {
    outboxes: HashMap<ConnectionId, Outbox>,
    members: HashMap<RoomId, BTreeSet<ConnectionId>>,
    rooms: HashMap<ConnectionId, RoomId>,
}

impl RoomDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the outbox of a freshly connected transport.
    pub fn attach(&mut self, connection_id: ConnectionId, outbox: Outbox) {
        self.outboxes.insert(connection_id, outbox);
    }

    pub fn is_attached(&self, connection_id: ConnectionId) -> bool {
        self.outboxes.contains_key(&connection_id)
    }

    /// Adds an attached connection to a room, leaving any previous room.
    ///
    /// # Returns
    ///
    /// `false` if the connection is not attached.
    pub fn join(&mut self, connection_id: ConnectionId, room: RoomId) -> bool {
        if !self.is_attached(connection_id) {
            return false;
        }
        self.leave(connection_id);
        self.members
            .entry(room.clone())
            .or_default()
            .insert(connection_id);
        self.rooms.insert(connection_id, room);
        true
    }

    /// Drops a connection's outbox and room membership.
    ///
    /// # Returns
    ///
    /// The room the connection was in, if it had joined one.
    pub fn detach(&mut self, connection_id: ConnectionId) -> Option<RoomId> {
        self.outboxes.remove(&connection_id);
        self.leave(connection_id)
    }

    /// Connections currently joined to `room`, in ascending id order.
    pub fn members_of(&self, room: &RoomId) -> impl Iterator<Item = ConnectionId> + '_ {
        self.members.get(room).into_iter().flatten().copied()
    }

    /// Number of rooms with at least one member.
    pub fn room_count(&self) -> usize {
        self.members.len()
    }

    /// Delivers `message` to the audience within `room`.
    ///
    /// # Returns
    ///
    /// The number of outboxes the message was queued in.
    pub fn deliver(&self, room: &RoomId, audience: Audience, message: ServerMessage) -> usize {
        let message = Arc::new(message);
        let delivered = match audience {
            Audience::Connection(connection_id) => {
                usize::from(self.push(connection_id, &message))
            }
            Audience::Room => self
                .members_of(room)
                .filter(|&connection_id| self.push(connection_id, &message))
                .count(),
            Audience::RoomExcept(excluded) => self
                .members_of(room)
                .filter(|&connection_id| connection_id != excluded)
                .filter(|&connection_id| self.push(connection_id, &message))
                .count(),
        };
        trace!(
            "📡 {} delivered to {} connection(s) in room {}",
            message.event_name(),
            delivered,
            room
        );
        delivered
    }

    fn push(&self, connection_id: ConnectionId, message: &Arc<ServerMessage>) -> bool {
        match self.outboxes.get(&connection_id) {
            Some(outbox) => outbox.send(Arc::clone(message)).is_ok(),
            None => false,
        }
    }

    fn leave(&mut self, connection_id: ConnectionId) -> Option<RoomId> {
        let room = self.rooms.remove(&connection_id)?;
        if let Some(members) = self.members.get_mut(&room) {
            members.remove(&connection_id);
            if members.is_empty() {
                self.members.remove(&room);
            }
        }
        Some(room)
    }
}
