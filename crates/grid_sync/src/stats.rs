//! End-of-session score aggregation.
//!
//! When an identity's last tab closes, its current owned-cell count is folded
//! into the persisted [`StatsRecord`]. The fold always starts from the stored
//! record, never from a delta log, so a write that failed once is still
//! consistent when the next session ends.

use crate::error::StoreError;
use crate::store::PlayerStore;
use crate::types::Identity;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// `min_score` of an identity that has never finished a session.
pub const UNSCORED_MIN: u64 = u64::MAX;

/// Aggregate score history of one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRecord {
    pub username: Identity,
    pub games_played: u64,
    pub max_score: u64,
    pub min_score: u64,
    pub total_score: u64,
    pub average_score: f64,
}

impl StatsRecord {
    /// Record of an identity with no finished session.
    pub fn empty(username: Identity) -> Self {
        Self {
            username,
            games_played: 0,
            max_score: 0,
            min_score: UNSCORED_MIN,
            total_score: 0,
            average_score: 0.0,
        }
    }

    /// Folds one finished session's score into the record.
    pub fn record_session(mut self, score: u64) -> Self {
        self.games_played += 1;
        self.total_score += score;
        self.max_score = self.max_score.max(score);
        self.min_score = self.min_score.min(score);
        self.average_score = self.total_score as f64 / self.games_played as f64;
        self
    }
}

/// Reads the prior record, folds in `score` and upserts the result.
///
/// # Returns
///
/// The record that was written.
pub async fn flush_session(
    store: &dyn PlayerStore,
    identity: &Identity,
    score: u64,
) -> Result<StatsRecord, StoreError> {
    let prior = store
        .find_stats(identity)
        .await?
        .unwrap_or_else(|| StatsRecord::empty(identity.clone()));
    let updated = prior.record_session(score);
    store.upsert_stats(updated.clone()).await?;
    debug!(
        "💾 Stats for {}: {} game(s), score {} (avg {:.2})",
        identity, updated.games_played, score, updated.average_score
    );
    Ok(updated)
}
