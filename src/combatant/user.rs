//! Per-combatant session state owned by the core

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::game::{GameVariant, Stats};
use crate::matchmaking::compat::MatchCandidate;
use crate::matchmaking::window::{PingWindow, RatingWindow};
use crate::rating::{RatingRecord, RatingStore};

use super::{ping_of, Combatant, CombatantId, DeviceClass};

/// What a combatant is willing to be matched against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPreferences {
    /// Extra latency tolerated on top of the combatant's own; `None` accepts any
    pub ping_tolerance: Option<u32>,
    pub accepted_devices: Vec<DeviceClass>,
}

impl Default for MatchPreferences {
    fn default() -> Self {
        Self {
            ping_tolerance: None,
            accepted_devices: DeviceClass::ALL.to_vec(),
        }
    }
}

/// Statistics of every participant of a finished match, keyed by name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostMatchStats {
    pub match_id: Uuid,
    pub variant: GameVariant,
    pub stats: BTreeMap<String, Stats>,
}

#[derive(Debug)]
struct UserState {
    record: RatingRecord,
    preferences: MatchPreferences,
    ping_window: PingWindow,
    rating_window: RatingWindow,
    recent_opponent: Option<CombatantId>,
    queued_since: Instant,
    post_match: Option<PostMatchStats>,
}

/// A registered combatant: the session handle plus everything matchmaking
/// tracks about it.
pub struct User {
    handle: Arc<dyn Combatant>,
    ratings: Arc<dyn RatingStore>,
    state: Mutex<UserState>,
}

impl User {
    pub fn new(
        handle: Arc<dyn Combatant>,
        record: RatingRecord,
        preferences: MatchPreferences,
        ratings: Arc<dyn RatingStore>,
    ) -> Self {
        Self {
            handle,
            ratings,
            state: Mutex::new(UserState {
                record,
                preferences,
                ping_window: PingWindow::unrestricted(),
                rating_window: RatingWindow::around(0),
                recent_opponent: None,
                queued_since: Instant::now(),
                post_match: None,
            }),
        }
    }

    pub fn id(&self) -> CombatantId {
        self.handle.id()
    }

    pub fn handle(&self) -> &Arc<dyn Combatant> {
        &self.handle
    }

    pub fn name(&self) -> String {
        self.handle.name()
    }

    pub fn display_name(&self) -> String {
        self.handle.display_name()
    }

    pub fn record(&self) -> RatingRecord {
        self.state.lock().record.clone()
    }

    /// Replace the rating record and hand it to the persistence layer
    pub fn set_record(&self, record: RatingRecord) {
        self.ratings.save(self.id(), &record);
        self.state.lock().record = record;
    }

    pub fn variant_rating(&self, variant: GameVariant) -> i32 {
        self.state.lock().record.variant_rating(variant)
    }

    pub fn preferences(&self) -> MatchPreferences {
        self.state.lock().preferences.clone()
    }

    pub fn set_preferences(&self, preferences: MatchPreferences) {
        self.state.lock().preferences = preferences;
    }

    pub fn ping_window(&self) -> PingWindow {
        self.state.lock().ping_window
    }

    pub fn rating_window(&self) -> RatingWindow {
        self.state.lock().rating_window
    }

    /// Reset both windows around the current values and restart the queue clock
    pub fn begin_queue(&self, variant: GameVariant) {
        let ping = ping_of(self.handle.as_ref());
        let mut state = self.state.lock();
        state.ping_window = match state.preferences.ping_tolerance {
            Some(tolerance) => PingWindow::around(ping).extend(tolerance as i64),
            None => PingWindow::unrestricted(),
        };
        state.rating_window =
            RatingWindow::around(state.record.variant_rating(variant) as i64).extend(
                crate::matchmaking::window::INITIAL_RATING_SPREAD,
            );
        state.queued_since = Instant::now();
    }

    /// Widen the ping window and, for ranked queues, the rating window
    pub fn widen_windows(&self, ranked: bool) {
        let mut state = self.state.lock();
        state.ping_window = state
            .ping_window
            .extend(crate::matchmaking::window::PING_STEP);
        if ranked {
            state.rating_window = state
                .rating_window
                .extend(crate::matchmaking::window::RATING_STEP);
        }
    }

    pub fn queued_for(&self) -> Duration {
        self.state.lock().queued_since.elapsed()
    }

    pub fn recent_opponent(&self) -> Option<CombatantId> {
        self.state.lock().recent_opponent
    }

    pub fn set_recent_opponent(&self, opponent: CombatantId) {
        self.state.lock().recent_opponent = Some(opponent);
    }

    pub fn reset_recent_opponent(&self) {
        self.state.lock().recent_opponent = None;
    }

    pub fn post_match_stats(&self) -> Option<PostMatchStats> {
        self.state.lock().post_match.clone()
    }

    pub fn set_post_match_stats(&self, stats: PostMatchStats) {
        self.state.lock().post_match = Some(stats);
    }

    /// Snapshot of everything the matching rule looks at
    pub fn candidate(&self, variant: GameVariant) -> MatchCandidate {
        let ping = ping_of(self.handle.as_ref());
        let device = self.handle.device();
        let state = self.state.lock();
        MatchCandidate {
            id: self.id(),
            ping,
            device,
            rating: state.record.variant_rating(variant) as i64,
            ping_window: state.ping_window,
            rating_window: state.rating_window,
            accepted_devices: state.preferences.accepted_devices.clone(),
            recent_opponent: state.recent_opponent,
        }
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{user_with, MockCombatant};

    #[tokio::test]
    async fn windows_start_around_current_values() {
        let c = MockCombatant::new("alpha").with_latency(40);
        let user = user_with(&c, 1200, Some(10));

        user.begin_queue(GameVariant::NoDebuff);

        let ping = user.ping_window();
        assert!(ping.contains(30) && ping.contains(50));
        assert!(!ping.contains(51));

        let rating = user.rating_window();
        assert_eq!((rating.min(), rating.max()), (1100, 1300));
    }

    #[tokio::test]
    async fn ranked_widening_moves_rating_window() {
        let c = MockCombatant::new("alpha").with_latency(40);
        let user = user_with(&c, 1200, Some(10));
        user.begin_queue(GameVariant::NoDebuff);

        user.widen_windows(false);
        assert_eq!(user.rating_window().max(), 1300);

        user.widen_windows(true);
        assert_eq!(user.rating_window().max(), 1320);
        assert!(user.ping_window().contains(54));
    }

    #[tokio::test]
    async fn set_record_persists() {
        let c = MockCombatant::new("alpha");
        let store = Arc::new(crate::rating::MemoryRatingStore::default());
        let user = User::new(
            c.clone(),
            RatingRecord::default(),
            MatchPreferences::default(),
            store.clone(),
        );

        let mut record = user.record();
        record.ranked_wins = 4;
        user.set_record(record);

        assert_eq!(store.load(user.id()).map(|r| r.ranked_wins), Some(4));
    }
}
