//! Ranked and unranked matchmaking providers

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::Services;
use crate::combatant::{Board, CombatantId, Loadout, User};
use crate::game::{ArenaTemplate, GameVariant, Grid, Match, MatchParams, MatchTimers};
use crate::notify::MatchEvent;
use crate::util::rate_limit::{DuelRateLimiter, DUEL_REQUESTS_PER_MINUTE};

use super::duel::DuelRequest;
use super::queue::QueueBook;
use super::{can_match, can_match_ranked, MatchmakingError, Ranking};

const SECOND: Duration = Duration::from_secs(1);

/// Recent opponents are forgotten every this many queue seconds
const RECENT_OPPONENT_RESET_SECS: u64 = 5;
/// Windows widen and a pairing is attempted every this many queue seconds
const SEARCH_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Distance between grid cells in blocks
    pub spacing: i32,
    pub timers: MatchTimers,
    /// Accept direct duel requests (unranked only)
    pub duels_enabled: bool,
    pub duel_requests_per_minute: u32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            spacing: 1000,
            timers: MatchTimers::default(),
            duels_enabled: true,
            duel_requests_per_minute: DUEL_REQUESTS_PER_MINUTE,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VariantStats {
    pub variant: GameVariant,
    pub queued: usize,
    pub playing: usize,
}

/// Snapshot for the admin surface
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStats {
    pub ranking: Ranking,
    pub queued: usize,
    pub playing: usize,
    pub running_matches: usize,
    pub pending_duels: usize,
    pub variants: Vec<VariantStats>,
}

pub(super) struct ProviderState {
    pub(super) queue: QueueBook,
    pub(super) matches: HashMap<Uuid, Arc<Match>>,
    /// Pending duel requests keyed by target
    pub(super) duels: HashMap<CombatantId, DuelRequest>,
}

/// Owns the queues, queue tasks and running matches of one ranking.
pub struct Provider {
    ranking: Ranking,
    grid: Arc<Grid>,
    pub(super) services: Services,
    pub(super) settings: ProviderSettings,
    pub(super) state: Mutex<ProviderState>,
    pub(super) duel_limiter: DuelRateLimiter,
    rng: Mutex<ChaCha8Rng>,
    pub(super) me: Weak<Provider>,
}

impl Provider {
    pub fn new(
        ranking: Ranking,
        grid: Arc<Grid>,
        services: Services,
        settings: ProviderSettings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            ranking,
            grid,
            services,
            duel_limiter: DuelRateLimiter::new(settings.duel_requests_per_minute),
            settings,
            state: Mutex::new(ProviderState {
                queue: QueueBook::new(),
                matches: HashMap::new(),
                duels: HashMap::new(),
            }),
            rng: Mutex::new(ChaCha8Rng::from_entropy()),
            me: me.clone(),
        })
    }

    pub fn ranking(&self) -> Ranking {
        self.ranking
    }

    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// Queue a registered, idle combatant for `variant`
    pub fn enter_queue(&self, variant: GameVariant, user: &Arc<User>) {
        let id = user.id();
        let registry = &self.services.registry;
        if !registry.is_registered(id) || registry.is_busy(id) {
            debug!(combatant = %id, "Queue entry ignored");
            return;
        }

        user.begin_queue(variant);
        registry.assign(id, self.ranking);
        let Some(cancel) = self.state.lock().queue.enqueue(variant, user.clone()) else {
            return;
        };

        let h = user.handle();
        h.apply_loadout(Loadout::Queue);
        h.message(
            "queue.message.enter",
            &[self.ranking.label().into(), variant.name().into()],
        );
        self.spawn_queue_task(variant, user.clone(), cancel);

        info!(
            combatant = %id,
            variant = %variant,
            ranking = %self.ranking,
            "Combatant entered queue"
        );
        self.services.notifier.notify(MatchEvent::QueueEntered {
            combatant: id,
            name: user.name(),
            variant,
            ranking: self.ranking,
        });
    }

    /// Leave the queue and go back to the lobby. Returns false when the
    /// combatant was not queued here.
    pub fn exit_queue(&self, id: CombatantId) -> bool {
        let Some(entry) = self.leave_queue(id) else {
            return false;
        };
        let h = entry.user.handle();
        h.message("queue.message.leave", &[]);
        h.apply_loadout(Loadout::Lobby);
        self.services.lobby.add(h);
        info!(combatant = %id, variant = %entry.variant, ranking = %self.ranking, "Combatant left queue");
        true
    }

    /// Drop a combatant from the queue without touching its session
    pub(crate) fn leave_queue(&self, id: CombatantId) -> Option<super::queue::QueueEntry> {
        let entry = self.state.lock().queue.dequeue(id)?;
        self.services.registry.unassign(id);
        Some(entry)
    }

    pub fn queued(&self, variant: GameVariant, id: CombatantId) -> bool {
        self.state.lock().queue.contains(variant, id)
    }

    pub fn queued_users(&self, variant: GameVariant) -> usize {
        self.state.lock().queue.len(variant)
    }

    /// Combatants still alive in running matches of `variant`
    pub fn playing_users(&self, variant: GameVariant) -> usize {
        let matches: Vec<Arc<Match>> = self
            .state
            .lock()
            .matches
            .values()
            .filter(|m| m.variant() == variant)
            .cloned()
            .collect();
        matches.iter().map(|m| m.total_alive()).sum()
    }

    /// Allocate a grid cell and start a match. A random arena supporting the
    /// variant is used when none is given. On failure the combatants are sent
    /// back to the lobby.
    pub fn start_match(
        &self,
        variant: GameVariant,
        arena: Option<Arc<ArenaTemplate>>,
        players: Vec<Arc<User>>,
        update_stats: bool,
    ) -> Result<Arc<Match>, MatchmakingError> {
        let Some(arena) = arena.or_else(|| self.random_arena(variant)) else {
            warn!(variant = %variant, "No arena available");
            self.send_to_lobby(&players, "match.message.no_arena");
            return Err(MatchmakingError::NoArena(variant));
        };
        let Some(grid_pos) = self.grid.reserve() else {
            warn!(
                variant = %variant,
                capacity = self.grid.capacity(),
                "Grid exhausted, match rejected"
            );
            self.send_to_lobby(&players, "match.message.no_space");
            return Err(MatchmakingError::GridExhausted);
        };

        let params = MatchParams {
            variant,
            ranking: self.ranking,
            arena,
            grid_pos,
            spacing: self.settings.spacing,
            duel: players.len() == 2,
            update_stats,
            timers: self.settings.timers,
            players: players.clone(),
        };
        match Match::new(params, self.me.clone(), self.services.clone()) {
            Ok(m) => {
                self.state.lock().matches.insert(m.id(), m.clone());
                m.start_ticking();
                Ok(m)
            }
            Err(e) => {
                self.grid.open(grid_pos);
                error!(variant = %variant, error = %e, "Failed to create match");
                self.send_to_lobby(&players, "match.message.failed");
                Err(e.into())
            }
        }
    }

    /// Close a match and release its grid cell
    pub fn stop_match(&self, m: &Match) {
        m.close();
        let removed = self.state.lock().matches.remove(&m.id()).is_some();
        if removed {
            self.grid.open(m.grid_pos());
            debug!(match_id = %m.id(), "Match stopped");
        }
    }

    pub fn running_matches(&self) -> Vec<Arc<Match>> {
        self.state.lock().matches.values().cloned().collect()
    }

    pub fn match_by_id(&self, id: Uuid) -> Option<Arc<Match>> {
        self.state.lock().matches.get(&id).cloned()
    }

    /// The running match a combatant plays in
    pub fn match_of(&self, id: CombatantId) -> Option<Arc<Match>> {
        self.state
            .lock()
            .matches
            .values()
            .find(|m| m.has_player(id))
            .cloned()
    }

    /// The variant a combatant is queued for or playing
    pub fn variant_of(&self, id: CombatantId) -> Option<GameVariant> {
        let state = self.state.lock();
        state.queue.variant_of(id).or_else(|| {
            state
                .matches
                .values()
                .find(|m| m.has_player(id))
                .map(|m| m.variant())
        })
    }

    /// Pair `user` with the first compatible combatant in queue order
    pub fn try_match(&self, variant: GameVariant, user: &Arc<User>) {
        let opponent = {
            let mut state = self.state.lock();
            if !state.queue.contains(variant, user.id()) {
                return;
            }
            let me = user.candidate(variant);
            let ranked = self.ranking.is_ranked();
            let found = state.queue.users(variant).into_iter().find(|o| {
                let other = o.candidate(variant);
                if ranked {
                    can_match_ranked(&me, &other)
                } else {
                    can_match(&me, &other)
                }
            });
            let Some(opponent) = found else {
                return;
            };

            user.set_recent_opponent(opponent.id());
            opponent.set_recent_opponent(user.id());
            state.queue.dequeue(user.id());
            state.queue.dequeue(opponent.id());
            opponent
        };

        info!(
            variant = %variant,
            ranking = %self.ranking,
            a = %user.id(),
            b = %opponent.id(),
            "Paired combatants"
        );
        if let Err(e) = self.start_match(variant, None, vec![user.clone(), opponent], true) {
            warn!(variant = %variant, error = %e, "Queued match not started");
        }
    }

    /// Cancel every queue task and duel request, then stop every match
    pub fn shutdown(&self) {
        let (entries, duels, matches) = {
            let mut state = self.state.lock();
            let duels: Vec<DuelRequest> = state.duels.drain().map(|(_, r)| r).collect();
            let matches: Vec<Arc<Match>> = state.matches.values().cloned().collect();
            (state.queue.drain(), duels, matches)
        };
        for entry in &entries {
            self.services.registry.unassign(entry.id());
        }
        for request in &duels {
            request.cancel.cancel();
        }
        for m in &matches {
            self.stop_match(m);
        }
        info!(
            ranking = %self.ranking,
            queued = entries.len(),
            matches = matches.len(),
            "Provider shut down"
        );
    }

    pub fn stats(&self) -> ProviderStats {
        let variants: Vec<VariantStats> = GameVariant::ALL
            .iter()
            .map(|&variant| VariantStats {
                variant,
                queued: self.queued_users(variant),
                playing: self.playing_users(variant),
            })
            .collect();
        let (running_matches, pending_duels) = {
            let state = self.state.lock();
            (state.matches.len(), state.duels.len())
        };
        ProviderStats {
            ranking: self.ranking,
            queued: variants.iter().map(|v| v.queued).sum(),
            playing: variants.iter().map(|v| v.playing).sum(),
            running_matches,
            pending_duels,
            variants,
        }
    }

    pub(super) fn random_arena(&self, variant: GameVariant) -> Option<Arc<ArenaTemplate>> {
        self.services.arenas.random(variant, &mut *self.rng.lock())
    }

    fn send_to_lobby(&self, players: &[Arc<User>], key: &str) {
        for u in players {
            let h = u.handle();
            h.message(key, &[]);
            h.apply_loadout(Loadout::Lobby);
            self.services.registry.unassign(u.id());
            self.services.lobby.add(h);
        }
    }

    fn spawn_queue_task(&self, variant: GameVariant, user: Arc<User>, cancel: CancellationToken) {
        let me = self.me.clone();
        tokio::spawn(async move {
            let mut ticker = interval(SECOND);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut elapsed: u64 = 0;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(provider) = me.upgrade() else {
                    break;
                };
                provider.queue_tick(variant, &user, elapsed);
                elapsed += 1;
            }
            debug!(combatant = %user.id(), "Queue task stopped");
        });
    }

    /// One second of a combatant's queue task
    fn queue_tick(&self, variant: GameVariant, user: &Arc<User>, elapsed: u64) {
        if elapsed > 0 && elapsed % RECENT_OPPONENT_RESET_SECS == 0 {
            user.reset_recent_opponent();
        }
        if elapsed % SEARCH_INTERVAL_SECS == 0 {
            if elapsed > 0 {
                user.widen_windows(self.ranking.is_ranked());
            }
            self.send_queue_status(variant, user);
            self.try_match(variant, user);
        }
        if self.queued(variant, user.id()) {
            self.send_queue_scoreboard(variant, user);
        }
    }

    fn send_queue_status(&self, variant: GameVariant, user: &User) {
        let devices: Vec<String> = user
            .preferences()
            .accepted_devices
            .iter()
            .map(|d| d.to_string())
            .collect();
        let mut args = vec![
            self.ranking.label().into(),
            variant.name().into(),
            user.ping_window().to_string().into(),
            devices.join(", ").into(),
        ];
        if self.ranking.is_ranked() {
            args.push(user.rating_window().to_string().into());
        }
        user.handle().message("queue.message.status", &args);
    }

    /// Status panel shown while waiting
    pub fn send_queue_scoreboard(&self, variant: GameVariant, user: &User) {
        let key = if self.ranking.is_ranked() {
            "scoreboard.queue.ranked"
        } else {
            "scoreboard.queue.unranked"
        };
        let mut args = vec![
            self.services.registry.online().into(),
            variant.name().into(),
            user.ping_window().to_string().into(),
        ];
        if self.ranking.is_ranked() {
            args.push(user.rating_window().to_string().into());
        }
        args.push(user.queued_for().into());
        self.services
            .scoreboard
            .render(user.handle(), &Board::new(key, args));
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("ranking", &self.ranking)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
