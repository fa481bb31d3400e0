//! Matchmaking service - owns both providers and combatant registration

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::app::Services;
use crate::combatant::{Combatant, CombatantId, Loadout, MatchPreferences, User};
use crate::game::{FreeForAll, FreeForAllError, GameVariant, Grid, Match, Removal};

use super::provider::{Provider, ProviderSettings, ProviderStats};
use super::Ranking;

/// Matchmaking service
pub struct MatchmakingService {
    services: Services,
    grid: Arc<Grid>,
    ranked: Arc<Provider>,
    unranked: Arc<Provider>,
    free_for_all: Vec<Arc<FreeForAll>>,
}

impl MatchmakingService {
    /// Both providers share one placement grid. Ranked never takes duel requests.
    pub fn new(services: Services, grid_radius: u32, settings: ProviderSettings) -> Self {
        let grid = Arc::new(Grid::new(grid_radius));
        let ranked = Provider::new(
            Ranking::Ranked,
            grid.clone(),
            services.clone(),
            ProviderSettings {
                duels_enabled: false,
                ..settings.clone()
            },
        );
        let free_for_all = open_free_for_all(&services, &grid, settings.spacing);
        let unranked = Provider::new(Ranking::Unranked, grid.clone(), services.clone(), settings);
        Self {
            services,
            grid,
            ranked,
            unranked,
            free_for_all,
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    pub fn provider(&self, ranking: Ranking) -> &Arc<Provider> {
        match ranking {
            Ranking::Ranked => &self.ranked,
            Ranking::Unranked => &self.unranked,
        }
    }

    pub fn free_for_all(&self, variant: GameVariant) -> Option<&Arc<FreeForAll>> {
        self.free_for_all.iter().find(|f| f.variant() == variant)
    }

    pub fn free_for_all_arenas(&self) -> &[Arc<FreeForAll>] {
        &self.free_for_all
    }

    /// Drop a combatant into the open-world arena of `variant`
    pub fn join_free_for_all(&self, variant: GameVariant, user: &Arc<User>) -> Result<(), FreeForAllError> {
        self.free_for_all(variant)
            .ok_or(FreeForAllError::NotOpenWorld(variant))?
            .add_player(user)
    }

    /// Leave whichever open-world arena the combatant is in
    pub fn leave_free_for_all(&self, id: CombatantId) -> bool {
        self.free_for_all.iter().any(|f| f.remove_player(id, false))
    }

    fn providers(&self) -> [&Arc<Provider>; 2] {
        [&self.ranked, &self.unranked]
    }

    /// Register a connected combatant (called when its session starts).
    /// Returns the existing user when it is already registered.
    pub fn register_combatant(
        &self,
        handle: Arc<dyn Combatant>,
        preferences: MatchPreferences,
    ) -> Arc<User> {
        let id = handle.id();
        if let Some(existing) = self.services.registry.user(id) {
            return existing;
        }

        let record = self.services.ratings.load_or_default(id);
        let user = Arc::new(User::new(
            handle,
            record,
            preferences,
            self.services.ratings.clone(),
        ));
        self.services.registry.register(user.clone());

        let h = user.handle();
        h.apply_loadout(Loadout::Lobby);
        self.services.lobby.add(h);
        info!(combatant = %id, name = %user.name(), "Combatant registered");
        user
    }

    /// Tear down everything a disconnecting combatant is part of
    pub fn unregister_combatant(&self, id: CombatantId) {
        let Some(user) = self.services.registry.user(id) else {
            return;
        };

        for provider in self.providers() {
            provider.leave_queue(id);
            provider.remove_request_to(id);
            provider.remove_requests_from(id);
            if let Some(m) = provider.match_of(id) {
                m.remove_combatant(id, Removal::Forced { requested: false });
            }
        }
        if let Some(m) = self.spectating(id) {
            m.remove_spectator(id, true);
        }
        for ffa in &self.free_for_all {
            ffa.remove_player(id, true);
        }

        self.services.ratings.save(id, &user.record());
        self.services.registry.unregister(id);
        info!(combatant = %id, "Combatant unregistered");
    }

    /// The running match a combatant plays in, whichever provider owns it
    pub fn lookup_match(&self, id: CombatantId) -> Option<Arc<Match>> {
        self.providers().into_iter().find_map(|p| p.match_of(id))
    }

    pub fn match_by_id(&self, id: Uuid) -> Option<(Ranking, Arc<Match>)> {
        self.providers()
            .into_iter()
            .find_map(|p| p.match_by_id(id).map(|m| (p.ranking(), m)))
    }

    /// The match a combatant is watching
    pub fn spectating(&self, id: CombatantId) -> Option<Arc<Match>> {
        self.running_matches()
            .into_iter()
            .find(|m| m.is_spectating(id))
    }

    pub fn running_matches(&self) -> Vec<Arc<Match>> {
        self.providers()
            .into_iter()
            .flat_map(|p| p.running_matches())
            .collect()
    }

    /// Stop a running match through its provider. Returns false when unknown.
    pub fn stop_match(&self, id: Uuid) -> bool {
        let Some((ranking, m)) = self.match_by_id(id) else {
            return false;
        };
        self.provider(ranking).stop_match(&m);
        info!(match_id = %id, "Match stopped by staff");
        true
    }

    pub fn stats(&self, ranking: Ranking) -> ProviderStats {
        self.provider(ranking).stats()
    }

    pub fn shutdown(&self) {
        for provider in self.providers() {
            provider.shutdown();
        }
        for ffa in &self.free_for_all {
            ffa.close();
            self.grid.open(ffa.grid_pos());
        }
    }
}

/// One open-world arena per variant that has a capacity, each on its own grid cell
fn open_free_for_all(services: &Services, grid: &Grid, spacing: i32) -> Vec<Arc<FreeForAll>> {
    let mut arenas = Vec::new();
    for variant in GameVariant::ALL.into_iter().filter(|v| v.free_for_all()) {
        let Some(template) = services.arenas.for_variant(variant).first().cloned() else {
            warn!(variant = %variant, "No arena for the free-for-all, skipped");
            continue;
        };
        let Some(pos) = grid.reserve() else {
            warn!(variant = %variant, "Grid exhausted, free-for-all skipped");
            break;
        };
        match FreeForAll::new(variant, template, pos, spacing, services.clone()) {
            Ok(ffa) => arenas.push(Arc::new(ffa)),
            Err(e) => {
                grid.open(pos);
                warn!(variant = %variant, error = %e, "Free-for-all not opened");
            }
        }
    }
    arenas
}

impl std::fmt::Debug for MatchmakingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchmakingService")
            .field("grid_capacity", &self.grid.capacity())
            .field("grid_occupied", &self.grid.occupied())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{GameVariant, Phase};
    use crate::rating::RatingStore;
    use crate::testing::{Fixture, MockCombatant};

    fn service(fx: &Fixture) -> MatchmakingService {
        MatchmakingService::new(fx.services.clone(), 4, ProviderSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn registration_loads_stored_ratings() {
        let fx = Fixture::new();
        let svc = service(&fx);
        let c = MockCombatant::new("alpha");
        let mut record = crate::rating::RatingRecord::default();
        record.ranked_wins = 7;
        fx.ratings.save(c.id(), &record);

        let user = svc.register_combatant(c.clone(), MatchPreferences::default());
        assert_eq!(user.record().ranked_wins, 7);
        assert!(fx.registry().is_registered(c.id()));
        assert!(fx.lobby.contains(c.id()));

        let again = svc.register_combatant(c.clone(), MatchPreferences::default());
        assert!(Arc::ptr_eq(&user, &again));
    }

    #[tokio::test(start_paused = true)]
    async fn providers_share_one_grid() {
        let fx = Fixture::new();
        let svc = service(&fx);
        assert!(Arc::ptr_eq(
            svc.provider(Ranking::Ranked).grid(),
            svc.provider(Ranking::Unranked).grid()
        ));

        let users: Vec<_> = ["a", "b", "c", "d"]
            .into_iter()
            .map(|n| svc.register_combatant(MockCombatant::new(n), MatchPreferences::default()))
            .collect();
        let ranked = svc
            .provider(Ranking::Ranked)
            .start_match(GameVariant::Gapple, None, users[..2].to_vec(), true)
            .unwrap();
        let unranked = svc
            .provider(Ranking::Unranked)
            .start_match(GameVariant::Gapple, None, users[2..].to_vec(), true)
            .unwrap();

        assert_ne!(ranked.grid_pos(), unranked.grid_pos());
        // two open-world arenas plus the two matches
        assert_eq!(svc.grid().occupied(), 4);
        assert_eq!(svc.running_matches().len(), 2);
        assert_eq!(
            svc.match_by_id(unranked.id()).map(|(r, _)| r),
            Some(Ranking::Unranked)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ranked_provider_rejects_duels() {
        let fx = Fixture::new();
        let svc = service(&fx);
        let a = svc.register_combatant(MockCombatant::new("a"), MatchPreferences::default());
        let b = svc.register_combatant(MockCombatant::new("b"), MatchPreferences::default());
        assert!(svc
            .provider(Ranking::Ranked)
            .request_duel(GameVariant::Sumo, None, &a, &b)
            .is_err());
        assert!(svc
            .provider(Ranking::Unranked)
            .request_duel(GameVariant::Sumo, None, &a, &b)
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_mid_match_ends_it() {
        let fx = Fixture::new();
        let svc = service(&fx);
        let a = MockCombatant::new("alpha");
        let b = MockCombatant::new("bravo");
        let ua = svc.register_combatant(a.clone(), MatchPreferences::default());
        let ub = svc.register_combatant(b.clone(), MatchPreferences::default());

        let m = svc
            .provider(Ranking::Unranked)
            .start_match(GameVariant::NoDebuff, None, vec![ua, ub], true)
            .unwrap();
        svc.unregister_combatant(b.id());

        assert_eq!(m.phase(), Phase::Ending);
        assert!(!fx.registry().is_registered(b.id()));
        assert_eq!(svc.lookup_match(a.id()).map(|m| m.id()), Some(m.id()));
        assert!(fx.ratings.load(b.id()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_while_queued_or_spectating() {
        let fx = Fixture::new();
        let svc = service(&fx);
        let q = MockCombatant::new("queued");
        let uq = svc.register_combatant(q.clone(), MatchPreferences::default());
        svc.provider(Ranking::Ranked).enter_queue(GameVariant::Soup, &uq);

        let users: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|n| svc.register_combatant(MockCombatant::new(n), MatchPreferences::default()))
            .collect();
        let m = svc
            .provider(Ranking::Unranked)
            .start_match(GameVariant::Soup, None, users, true)
            .unwrap();
        let s = MockCombatant::new("watcher");
        let us = svc.register_combatant(s.clone(), MatchPreferences::default());
        assert!(m.add_spectator(&us, true));
        assert!(!m.add_spectator(&uq, true));
        assert!(svc.provider(Ranking::Ranked).queued(GameVariant::Soup, q.id()));
        assert_eq!(svc.spectating(s.id()).map(|m| m.id()), Some(m.id()));

        svc.unregister_combatant(q.id());
        svc.unregister_combatant(s.id());

        assert!(!svc.provider(Ranking::Ranked).queued(GameVariant::Soup, q.id()));
        assert!(!m.is_spectating(s.id()));
        assert_eq!(fx.registry().online(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn staff_stop_closes_and_releases() {
        let fx = Fixture::new();
        let svc = service(&fx);
        let users: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|n| svc.register_combatant(MockCombatant::new(n), MatchPreferences::default()))
            .collect();
        let m = svc
            .provider(Ranking::Unranked)
            .start_match(GameVariant::Combo, None, users, true)
            .unwrap();

        assert!(svc.stop_match(m.id()));
        assert!(!svc.stop_match(m.id()));
        assert!(m.is_closed());
        assert_eq!(svc.grid().occupied(), 2);

        svc.shutdown();
        assert!(svc.running_matches().is_empty());
        assert_eq!(svc.grid().occupied(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn open_world_variants_get_a_free_for_all() {
        let fx = Fixture::new();
        let svc = service(&fx);
        let variants: Vec<_> = svc.free_for_all_arenas().iter().map(|f| f.variant()).collect();
        assert_eq!(variants, vec![GameVariant::NoDebuff, GameVariant::Sumo]);
        assert!(svc.free_for_all(GameVariant::Boxing).is_none());

        let c = MockCombatant::new("alpha");
        let u = svc.register_combatant(c.clone(), MatchPreferences::default());
        assert_eq!(
            svc.join_free_for_all(GameVariant::Boxing, &u),
            Err(FreeForAllError::NotOpenWorld(GameVariant::Boxing))
        );
        svc.join_free_for_all(GameVariant::Sumo, &u).unwrap();

        // an open-world player cannot queue, duel or join a second arena
        svc.provider(Ranking::Unranked).enter_queue(GameVariant::Sumo, &u);
        assert!(!svc.provider(Ranking::Unranked).queued(GameVariant::Sumo, c.id()));
        let other = svc.register_combatant(MockCombatant::new("b"), MatchPreferences::default());
        assert!(matches!(
            svc.provider(Ranking::Unranked).request_duel(GameVariant::Sumo, None, &other, &u),
            Err(crate::matchmaking::MatchmakingError::Busy)
        ));
        assert_eq!(
            svc.join_free_for_all(GameVariant::NoDebuff, &u),
            Err(FreeForAllError::Busy)
        );

        assert!(svc.leave_free_for_all(c.id()));
        assert!(fx.lobby.contains(c.id()));
        svc.provider(Ranking::Unranked).enter_queue(GameVariant::Sumo, &u);
        assert!(svc.provider(Ranking::Unranked).queued(GameVariant::Sumo, c.id()));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_leaves_the_free_for_all() {
        let fx = Fixture::new();
        let svc = service(&fx);
        let c = MockCombatant::new("alpha");
        let u = svc.register_combatant(c.clone(), MatchPreferences::default());
        svc.join_free_for_all(GameVariant::NoDebuff, &u).unwrap();

        svc.unregister_combatant(c.id());
        assert_eq!(svc.free_for_all(GameVariant::NoDebuff).map(|f| f.player_count()), Some(0));
        assert!(!fx.lobby.contains(c.id()));
    }
}
