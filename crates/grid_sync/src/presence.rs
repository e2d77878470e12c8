//! Canonical per-identity presence records.
//!
//! Exactly one [`PresenceRecord`] exists per identity holding at least one
//! connection, no matter how many tabs it has open. Alongside the live
//! records the store remembers, for the whole process lifetime, the color and
//! last position handed to every identity it has ever seen. A reconnect or a
//! later re-join therefore resumes with the same color and position instead
//! of respawning. Nothing here survives a process restart.

use crate::types::{Color, Identity, Position, RoomId, WorldBounds};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Live state of one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub identity: Identity,
    pub room: RoomId,
    pub position: Position,
    pub color: Color,
    pub avatar: Option<String>,
}

/// What the process remembers about an identity between sessions.
#[derive(Debug, Clone)]
struct Profile {
    color: Color,
    last_position: Position,
}

/// Store of presence records plus the process-lifetime profile cache.
#[derive(Debug)]
pub struct PresenceStore {
    bounds: WorldBounds,
    rng: StdRng,
    records: HashMap<Identity, PresenceRecord>,
    profiles: HashMap<Identity, Profile>,
}

impl PresenceStore {
    /// Creates an empty store.
    ///
    /// `rng` drives spawn positions and colors; seed it for reproducible
    /// assignments.
    pub fn new(bounds: WorldBounds, rng: StdRng) -> Self {
        Self {
            bounds,
            rng,
            records: HashMap::new(),
            profiles: HashMap::new(),
        }
    }

    /// Returns the identity's record, creating it if absent.
    ///
    /// An existing record is returned untouched and `requested_room` is
    /// ignored: the room is sticky to the join that created the record.
    /// A new record takes the identity's remembered color and last position,
    /// or fresh random ones on the identity's first join in this process.
    /// `avatar` is only consulted when a record is created.
    ///
    /// # Returns
    ///
    /// The record and whether it was created by this call.
    pub fn ensure(
        &mut self,
        identity: &Identity,
        requested_room: RoomId,
        avatar: Option<String>,
    ) -> (&PresenceRecord, bool) {
        let created = !self.records.contains_key(identity);
        if created {
            let profile = self.profile_for(identity);
            let record = PresenceRecord {
                identity: identity.clone(),
                room: requested_room,
                position: profile.last_position,
                color: profile.color,
                avatar,
            };
            debug!(
                "🎨 Presence created for {} in room {} at {}",
                identity, record.room, record.position
            );
            self.records.insert(identity.clone(), record);
        }

        // The record was either present or inserted just above.
        let record = &self.records[identity];
        (record, created)
    }

    pub fn get(&self, identity: &Identity) -> Option<&PresenceRecord> {
        self.records.get(identity)
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.records.contains_key(identity)
    }

    /// Moves an identity. A no-op returning `false` when it has no record.
    pub fn set_position(&mut self, identity: &Identity, position: Position) -> bool {
        let Some(record) = self.records.get_mut(identity) else {
            return false;
        };
        record.position = position;
        if let Some(profile) = self.profiles.get_mut(identity) {
            profile.last_position = position;
        }
        true
    }

    /// Replaces the cached avatar reference. A no-op when the identity has no record.
    pub fn set_avatar(&mut self, identity: &Identity, avatar: Option<String>) -> bool {
        match self.records.get_mut(identity) {
            Some(record) => {
                record.avatar = avatar;
                true
            }
            None => false,
        }
    }

    /// Deletes an identity's record. Its color and last position stay cached.
    pub fn remove(&mut self, identity: &Identity) -> Option<PresenceRecord> {
        self.records.remove(identity)
    }

    /// Records of every identity currently in `room`.
    pub fn in_room<'a>(&'a self, room: &'a RoomId) -> impl Iterator<Item = &'a PresenceRecord> + 'a {
        self.records.values().filter(move |record| &record.room == room)
    }

    /// The color ever assigned to `identity` in this process, live or not.
    pub fn color_of(&self, identity: &Identity) -> Option<&Color> {
        self.profiles.get(identity).map(|profile| &profile.color)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn profile_for(&mut self, identity: &Identity) -> Profile {
        if let Some(profile) = self.profiles.get(identity) {
            return profile.clone();
        }
        let profile = Profile {
            color: Color::random(&mut self.rng),
            last_position: self.bounds.random_position(&mut self.rng),
        };
        self.profiles.insert(identity.clone(), profile.clone());
        profile
    }
}
