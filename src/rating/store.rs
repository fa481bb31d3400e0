//! Rating record persistence

use dashmap::DashMap;

use crate::combatant::CombatantId;

use super::RatingRecord;

/// Persistence contract for rating records.
///
/// Saves are fire-and-forget from the core's point of view; implementations
/// that talk to a remote store should queue the write and log failures.
pub trait RatingStore: Send + Sync {
    fn load(&self, id: CombatantId) -> Option<RatingRecord>;
    fn save(&self, id: CombatantId, record: &RatingRecord);

    /// Load a record, falling back to a fresh default one
    fn load_or_default(&self, id: CombatantId) -> RatingRecord {
        self.load(id).unwrap_or_default()
    }
}

/// Process-local store, used by the headless binary and in tests
#[derive(Debug, Default)]
pub struct MemoryRatingStore {
    records: DashMap<CombatantId, RatingRecord>,
}

impl MemoryRatingStore {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RatingStore for MemoryRatingStore {
    fn load(&self, id: CombatantId) -> Option<RatingRecord> {
        self.records.get(&id).map(|r| r.clone())
    }

    fn save(&self, id: CombatantId, record: &RatingRecord) {
        tracing::debug!(combatant = %id, rating = record.rating, "Rating record saved");
        self.records.insert(id, record.clone());
    }
}
