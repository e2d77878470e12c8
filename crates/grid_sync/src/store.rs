//! Persistence collaborator seam.
//!
//! The engine reads and upserts score records, reads avatar references and
//! passes achievement writes through. It never depends on the backend's
//! schema. [`MemoryStore`] is the in-process backend used by the binary and
//! by tests; a database-backed store implements the same trait.

use crate::error::StoreError;
use crate::messaging::Achievements;
use crate::stats::StatsRecord;
use crate::types::Identity;
use async_trait::async_trait;
use dashmap::DashMap;

/// Narrow read/upsert interface to the persistence backend.
#[async_trait]
pub trait PlayerStore: Send + Sync {
    async fn find_stats(&self, identity: &Identity) -> Result<Option<StatsRecord>, StoreError>;

    async fn upsert_stats(&self, record: StatsRecord) -> Result<(), StoreError>;

    /// Avatar reference of an identity, consulted once per session start.
    async fn find_avatar(&self, identity: &Identity) -> Result<Option<String>, StoreError>;

    async fn update_achievements(
        &self,
        identity: &Identity,
        achievements: Achievements,
    ) -> Result<(), StoreError>;
}

/// Concurrent in-memory backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    stats: DashMap<Identity, StatsRecord>,
    avatars: DashMap<Identity, String>,
    achievements: DashMap<Identity, Achievements>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an avatar reference.
    pub fn set_avatar(&self, identity: Identity, avatar: impl Into<String>) {
        self.avatars.insert(identity, avatar.into());
    }

    pub fn stats_of(&self, identity: &Identity) -> Option<StatsRecord> {
        self.stats.get(identity).map(|entry| entry.value().clone())
    }

    pub fn achievements_of(&self, identity: &Identity) -> Option<Achievements> {
        self.achievements.get(identity).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl PlayerStore for MemoryStore {
    async fn find_stats(&self, identity: &Identity) -> Result<Option<StatsRecord>, StoreError> {
        Ok(self.stats_of(identity))
    }

    async fn upsert_stats(&self, record: StatsRecord) -> Result<(), StoreError> {
        self.stats.insert(record.username.clone(), record);
        Ok(())
    }

    async fn find_avatar(&self, identity: &Identity) -> Result<Option<String>, StoreError> {
        Ok(self.avatars.get(identity).map(|entry| entry.value().clone()))
    }

    async fn update_achievements(
        &self,
        identity: &Identity,
        achievements: Achievements,
    ) -> Result<(), StoreError> {
        self.achievements.insert(identity.clone(), achievements);
        Ok(())
    }
}
