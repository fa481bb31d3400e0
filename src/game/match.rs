//! A running match and its 1 Hz state machine

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::app::Services;
use crate::combatant::{ping_of, Arg, Board, CombatantId, PostMatchStats, Title, User};
use crate::matchmaking::{Provider, Ranking};
use crate::notify::MatchEvent;
use crate::rating;
use crate::world::{BlockPos, Region, Structure, Vec3};

use super::arena::{ArenaTemplate, DUEL_SPAWN_A, DUEL_SPAWN_B, GROUP_SPAWN};
use super::grid::GridPos;
use super::win_condition::{HitVerdict, HitsToWin, HookContext, RoundsToWin, Strategy, WinCondition};
use super::{GameVariant, Stats, WinRule};

const SECOND: Duration = Duration::from_secs(1);

/// Damage immunity granted at preparation and on victory
pub const SPAWN_IMMUNITY: Duration = Duration::from_secs(6);

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("a match needs at least two combatants, got {0}")]
    NotEnoughCombatants(usize),
    #[error("a duel needs exactly two combatants, got {0}")]
    DuelSize(usize),
    #[error("{0} can only be played as a duel")]
    DuelOnly(GameVariant),
}

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Countdown,
    Fighting,
    Ending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchTimers {
    pub countdown: Duration,
    pub ending: Duration,
    /// Fight length after which the match is stopped without a winner
    pub max_duration: Duration,
}

impl Default for MatchTimers {
    fn default() -> Self {
        Self {
            countdown: Duration::from_secs(6),
            ending: Duration::from_secs(3),
            max_duration: Duration::from_secs(30 * 60),
        }
    }
}

/// Everything needed to build a match
#[derive(Debug)]
pub struct MatchParams {
    pub variant: GameVariant,
    pub ranking: Ranking,
    pub arena: Arc<ArenaTemplate>,
    pub grid_pos: GridPos,
    /// Distance between neighbouring grid cells in blocks
    pub spacing: i32,
    pub players: Vec<Arc<User>>,
    pub duel: bool,
    pub update_stats: bool,
    pub timers: MatchTimers,
}

/// How a combatant leaves a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Killed in the fight; strategies may veto
    Eliminated,
    /// Left the match. `requested` sends them back to the lobby, otherwise
    /// they are only dropped from tracking (disconnect).
    Forced { requested: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    Removed,
    Vetoed,
    Ignored,
}

pub(crate) struct MatchCore {
    pub(crate) phase: Phase,
    pub(crate) started: bool,
    pub(crate) alive: HashSet<CombatantId>,
    pub(crate) dead: HashSet<CombatantId>,
    pub(crate) spectators: HashMap<CombatantId, Arc<User>>,
    pub(crate) stats: HashMap<CombatantId, Stats>,
    pub(crate) spawns: HashMap<CombatantId, Vec3>,
    pub(crate) center: Vec3,
    pub(crate) blocks: HashSet<BlockPos>,
    pub(crate) start_count: Duration,
    pub(crate) end_count: Duration,
    pub(crate) duration: Duration,
    pub(crate) max_duration: Duration,
}

struct MatchState {
    core: MatchCore,
    strategies: Vec<Strategy>,
}

/// Admin view of a match
#[derive(Debug, Clone, Serialize)]
pub struct MatchSummary {
    pub id: Uuid,
    pub variant: GameVariant,
    pub ranking: Ranking,
    pub arena: String,
    pub grid: GridPos,
    pub phase: Phase,
    pub duel: bool,
    pub update_stats: bool,
    pub duration_secs: u64,
    pub alive: Vec<String>,
    pub dead: Vec<String>,
    pub spectators: usize,
}

/// One running match. Created by a provider, closed exactly once.
pub struct Match {
    id: Uuid,
    variant: GameVariant,
    ranking: Ranking,
    arena: Arc<ArenaTemplate>,
    grid_pos: GridPos,
    origin: BlockPos,
    duel: bool,
    update_stats: bool,
    players: Vec<Arc<User>>,
    provider: Weak<Provider>,
    services: Services,
    state: Mutex<MatchState>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl Match {
    /// Validate, build and prepare a match. Ticking starts with
    /// [`Match::start_ticking`].
    pub fn new(
        params: MatchParams,
        provider: Weak<Provider>,
        services: Services,
    ) -> Result<Arc<Self>, MatchError> {
        let count = params.players.len();
        if count < 2 {
            return Err(MatchError::NotEnoughCombatants(count));
        }
        if params.duel && count != 2 {
            return Err(MatchError::DuelSize(count));
        }
        let strategy = match params.variant.win_rule() {
            WinRule::Elimination => Strategy::Default,
            WinRule::Hits(_) | WinRule::Rounds(_) if !params.duel => {
                return Err(MatchError::DuelOnly(params.variant))
            }
            WinRule::Hits(n) => Strategy::HitsToWin(HitsToWin::new(params.duel, n)),
            WinRule::Rounds(n) => Strategy::RoundsToWin(RoundsToWin::new(params.duel, n)),
        };

        let core = MatchCore {
            phase: Phase::Countdown,
            started: false,
            alive: params.players.iter().map(|u| u.id()).collect(),
            dead: HashSet::new(),
            spectators: HashMap::new(),
            stats: HashMap::new(),
            spawns: HashMap::new(),
            center: Vec3::default(),
            blocks: HashSet::new(),
            start_count: params.timers.countdown,
            end_count: params.timers.ending,
            duration: Duration::ZERO,
            max_duration: params.timers.max_duration,
        };

        let m = Arc::new(Self {
            id: Uuid::new_v4(),
            variant: params.variant,
            ranking: params.ranking,
            origin: params.grid_pos.region_origin(params.spacing),
            arena: params.arena,
            grid_pos: params.grid_pos,
            duel: params.duel,
            update_stats: params.update_stats,
            players: params.players,
            provider,
            services,
            state: Mutex::new(MatchState {
                core,
                strategies: vec![strategy],
            }),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        });
        m.prepare();

        m.services.notifier.notify(MatchEvent::MatchStarted {
            match_id: m.id,
            variant: m.variant,
            ranking: m.ranking,
            arena: m.arena.name.clone(),
            combatants: m.players.iter().map(|u| u.name()).collect(),
        });
        info!(
            match_id = %m.id,
            variant = %m.variant,
            ranking = %m.ranking,
            arena = %m.arena.name,
            grid_x = m.grid_pos.x,
            grid_y = m.grid_pos.y,
            players = m.players.len(),
            "Match created"
        );
        Ok(m)
    }

    /// Spawn the 1 Hz task driving the state machine. Stops on close.
    pub fn start_ticking(self: &Arc<Self>) {
        let m = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(SECOND);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = m.cancel.cancelled() => break,
                    _ = ticker.tick() => m.tick(),
                }
            }
            debug!(match_id = %m.id, "Match ticker stopped");
        });
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn variant(&self) -> GameVariant {
        self.variant
    }

    pub fn ranking(&self) -> Ranking {
        self.ranking
    }

    pub fn arena(&self) -> &Arc<ArenaTemplate> {
        &self.arena
    }

    pub fn grid_pos(&self) -> GridPos {
        self.grid_pos
    }

    pub fn origin(&self) -> BlockPos {
        self.origin
    }

    pub fn is_duel(&self) -> bool {
        self.duel
    }

    pub fn updates_stats(&self) -> bool {
        self.update_stats
    }

    pub fn players(&self) -> &[Arc<User>] {
        &self.players
    }

    /// Lock-free: the participant list never changes after creation
    pub fn has_player(&self, id: CombatantId) -> bool {
        self.players.iter().any(|u| u.id() == id)
    }

    pub fn player(&self, id: CombatantId) -> Option<&Arc<User>> {
        self.players.iter().find(|u| u.id() == id)
    }

    pub fn opponent_of(&self, id: CombatantId) -> Option<&Arc<User>> {
        if !self.has_player(id) {
            return None;
        }
        self.players.iter().find(|u| u.id() != id)
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().core.phase
    }

    pub fn total_alive(&self) -> usize {
        self.state.lock().core.alive.len()
    }

    pub fn is_alive(&self, id: CombatantId) -> bool {
        self.state.lock().core.alive.contains(&id)
    }

    pub fn duration(&self) -> Duration {
        self.state.lock().core.duration
    }

    pub fn max_duration(&self) -> Duration {
        self.state.lock().core.max_duration
    }

    pub fn center(&self) -> Vec3 {
        self.state.lock().core.center
    }

    pub fn spawn_of(&self, id: CombatantId) -> Option<Vec3> {
        self.state.lock().core.spawns.get(&id).copied()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn logged_hits(&self, id: CombatantId) -> u32 {
        self.state.lock().core.stats.get(&id).map_or(0, |s| s.hits)
    }

    pub fn logged_damage(&self, id: CombatantId) -> f64 {
        self.state.lock().core.stats.get(&id).map_or(0.0, |s| s.damage)
    }

    /// Count a hit. Ignored unless the attacker is alive; strategies may
    /// cancel it or turn it into an elimination of the victim.
    pub fn log_hit(&self, attacker: CombatantId, victim: CombatantId) {
        let refresh = {
            let mut guard = self.state.lock();
            let MatchState { core, strategies } = &mut *guard;
            if !core.alive.contains(&attacker) {
                return;
            }

            let hits = core.stats.get(&attacker).map_or(0, |s| s.hits) + 1;
            let mut verdict = HitVerdict::Allow;
            {
                let mut ctx = HookContext { m: self, core: &mut *core };
                for s in strategies.iter_mut() {
                    verdict = s.on_start_hit(&mut ctx, attacker, victim, hits);
                    if verdict != HitVerdict::Allow {
                        break;
                    }
                }
            }

            match verdict {
                HitVerdict::Cancel => return,
                HitVerdict::Eliminate => {
                    self.eliminate_in(core, strategies, victim);
                    false
                }
                HitVerdict::Allow => {
                    if let Some(stats) = core.stats.get_mut(&attacker) {
                        stats.hits = hits;
                    }
                    let mut ctx = HookContext { m: self, core: &mut *core };
                    let mut refresh = false;
                    for s in strategies.iter_mut() {
                        refresh |= s.on_hit(&mut ctx, attacker, victim);
                    }
                    refresh
                }
            }
        };

        if refresh {
            for id in [attacker, victim] {
                if let Some(u) = self.player(id) {
                    self.send_scoreboard(u);
                }
            }
        }
    }

    /// Accumulate damage dealt by a living attacker
    pub fn log_damage(&self, attacker: CombatantId, _victim: CombatantId, amount: f64) {
        let mut guard = self.state.lock();
        let core = &mut guard.core;
        if core.alive.contains(&attacker) {
            if let Some(stats) = core.stats.get_mut(&attacker) {
                stats.damage += amount;
            }
        }
    }

    /// Track a placed block. Only accepted while fighting.
    pub fn log_placement(&self, pos: BlockPos) -> bool {
        let mut guard = self.state.lock();
        let core = &mut guard.core;
        if core.phase == Phase::Fighting {
            core.blocks.insert(pos);
            return true;
        }
        false
    }

    pub fn logged_placement(&self, pos: BlockPos) -> bool {
        self.state.lock().core.blocks.contains(&pos)
    }

    pub fn log_destruction(&self, pos: BlockPos) {
        self.state.lock().core.blocks.remove(&pos);
    }

    /// Revert every tracked placement to air
    pub fn clear_placements(&self) {
        let mut guard = self.state.lock();
        self.clear_placements_in(&mut guard.core);
    }

    pub(crate) fn clear_placements_in(&self, core: &mut MatchCore) {
        for pos in core.blocks.drain() {
            self.services.world.clear_block(pos);
        }
    }

    /// Take a combatant out of the fight
    pub fn remove_combatant(&self, id: CombatantId, removal: Removal) -> RemovalOutcome {
        let mut guard = self.state.lock();
        let MatchState { core, strategies } = &mut *guard;
        match removal {
            Removal::Eliminated => self.eliminate_in(core, strategies, id),
            Removal::Forced { requested } => {
                if !self.has_player(id) {
                    return RemovalOutcome::Ignored;
                }
                if requested {
                    self.disconnect_in(core, id, false);
                } else {
                    core.alive.remove(&id);
                    core.dead.remove(&id);
                    self.services.registry.unassign(id);
                }
                info!(match_id = %self.id, combatant = %id, requested, "Combatant left match");
                if core.phase != Phase::Ending && core.alive.len() <= 1 {
                    self.end_in(core);
                }
                RemovalOutcome::Removed
            }
        }
    }

    fn eliminate_in(
        &self,
        core: &mut MatchCore,
        strategies: &mut [Strategy],
        victim: CombatantId,
    ) -> RemovalOutcome {
        if core.phase == Phase::Ending || !core.alive.contains(&victim) {
            return RemovalOutcome::Ignored;
        }

        {
            let mut ctx = HookContext { m: self, core: &mut *core };
            for s in strategies.iter_mut() {
                if !s.on_user_remove(&mut ctx, victim) {
                    return RemovalOutcome::Vetoed;
                }
            }
        }

        if let Some(u) = self.player(victim) {
            u.handle().send_title(
                Title::new("match.title.defeat")
                    .with_subtitle("match.subtitle.defeat", Vec::new())
                    .with_fade_in(Duration::ZERO)
                    .with_duration(Duration::from_secs(3))
                    .with_fade_out(Duration::ZERO),
            );
        }
        core.alive.remove(&victim);
        core.dead.insert(victim);
        debug!(match_id = %self.id, combatant = %victim, alive = core.alive.len(), "Combatant eliminated");

        if core.alive.len() <= 1 {
            self.end_in(core);
        }
        RemovalOutcome::Removed
    }

    /// Send a combatant back to the lobby, optionally with the match statistics
    fn disconnect_in(&self, core: &mut MatchCore, id: CombatantId, show_stats: bool) {
        core.alive.remove(&id);
        self.services.registry.unassign(id);

        let Some(u) = self.player(id) else {
            return;
        };
        self.services.lobby.add(u.handle());
        if show_stats && self.services.registry.is_registered(id) {
            u.set_post_match_stats(self.post_match_stats(core));
        }
        u.handle().set_mobile();
    }

    fn post_match_stats(&self, core: &MatchCore) -> PostMatchStats {
        PostMatchStats {
            match_id: self.id,
            variant: self.variant,
            stats: self
                .players
                .iter()
                .filter_map(|u| core.stats.get(&u.id()).map(|s| (u.name(), s.clone())))
                .collect(),
        }
    }

    /// Let a registered combatant watch. Refused for players, for anyone a
    /// provider already owns (queued, playing or spectating) and once the
    /// match is closed.
    pub fn add_spectator(&self, user: &Arc<User>, silent: bool) -> bool {
        let id = user.id();
        let registry = &self.services.registry;
        if !registry.is_registered(id) || self.has_player(id) {
            return false;
        }

        // close() drains spectators under this lock, so checking here means
        // nobody is admitted after the drain
        let mut guard = self.state.lock();
        if self.is_closed() || registry.is_busy(id) {
            debug!(match_id = %self.id, combatant = %id, "Spectator refused");
            return false;
        }
        registry.assign(id, self.ranking);

        let h = user.handle();
        self.services.lobby.remove(h);
        h.clear_loadout();
        h.set_spectating(true);
        self.services.world.add_combatant(h);

        let core = &mut guard.core;
        h.teleport(core.center);
        h.message("match.message.spectate.join", &[]);
        if !silent {
            self.broadcast(core, true, "match.message.spectate.joined", &[user.display_name().into()]);
        }
        for p in &self.players {
            p.handle().hide(id);
        }
        core.spectators.insert(id, user.clone());
        true
    }

    /// Stop spectating. `force` skips the return to the lobby (disconnects).
    pub fn remove_spectator(&self, id: CombatantId, force: bool) {
        let user = {
            let mut guard = self.state.lock();
            let core = &mut guard.core;
            let Some(user) = core.spectators.remove(&id) else {
                return;
            };
            user.handle().message("match.message.spectate.leave", &[]);
            self.broadcast(core, true, "match.message.spectate.left", &[user.display_name().into()]);
            user
        };

        self.services.registry.unassign(id);
        for p in &self.players {
            p.handle().show(id);
        }
        user.handle().set_spectating(false);
        if !force {
            self.services.lobby.add(user.handle());
        }
    }

    pub fn spectators(&self) -> Vec<Arc<User>> {
        self.state.lock().core.spectators.values().cloned().collect()
    }

    pub fn is_spectating(&self, id: CombatantId) -> bool {
        self.state.lock().core.spectators.contains_key(&id)
    }

    /// Render the current scoreboard to one participant. The board is built
    /// under the lock and rendered after it is released.
    pub fn send_scoreboard(&self, user: &Arc<User>) {
        let board = {
            let mut guard = self.state.lock();
            let MatchState { core, strategies } = &mut *guard;
            let mut custom = None;
            {
                let mut ctx = HookContext { m: self, core: &mut *core };
                for s in strategies.iter_mut() {
                    if let Some(b) = s.on_scoreboard(&mut ctx, user) {
                        custom = Some(b);
                    }
                }
            }
            custom.unwrap_or_else(|| self.default_board(core, user))
        };
        self.services.scoreboard.render(user.handle(), &board);
    }

    fn default_board(&self, core: &MatchCore, user: &User) -> Board {
        if self.duel {
            let opponent_ping = self
                .opponent_of(user.id())
                .map_or(0, |o| ping_of(o.handle().as_ref()));
            return Board::new(
                "scoreboard.duels",
                vec![
                    core.duration.into(),
                    ping_of(user.handle().as_ref()).into(),
                    opponent_ping.into(),
                ],
            );
        }
        Board::new(
            "scoreboard.matches",
            vec![
                core.duration.into(),
                core.alive.len().into(),
                self.players.len().into(),
            ],
        )
    }

    /// Ask the owning provider to stop this match, or close it directly when
    /// the provider is gone.
    pub fn request_stop(&self) {
        match self.provider.upgrade() {
            Some(provider) => provider.stop_match(self),
            None => self.close(),
        }
    }

    /// Tear the match down. Runs once; later calls are no-ops.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();

        let (finished, duration) = {
            let mut guard = self.state.lock();
            let core = &mut guard.core;

            let remaining: Vec<CombatantId> = core.alive.iter().chain(core.dead.iter()).copied().collect();
            for id in remaining {
                self.disconnect_in(core, id, true);
            }
            core.dead.clear();

            for (id, spectator) in core.spectators.drain() {
                let h = spectator.handle();
                h.message("match.message.spectate.end", &[]);
                for p in &self.players {
                    p.handle().show(id);
                }
                h.set_spectating(false);
                self.services.registry.unassign(id);
                self.services.lobby.add(h);
            }
            core.blocks.clear();
            (core.phase == Phase::Ending, core.duration)
        };

        let dims = self.arena.dimensions;
        self.services
            .world
            .build_structure(self.origin, Structure::Empty(dims));
        self.services.world.remove_entities_within(Region {
            min: self.origin,
            max: self.origin.offset(dims),
        });

        if !finished {
            self.services.notifier.notify(MatchEvent::MatchEnded {
                match_id: self.id,
                variant: self.variant,
                ranking: self.ranking,
                winner: None,
                duration_secs: duration.as_secs(),
            });
        }
        info!(match_id = %self.id, "Match closed");
    }

    pub fn summary(&self) -> MatchSummary {
        let guard = self.state.lock();
        let core = &guard.core;
        let names = |set: &HashSet<CombatantId>| {
            self.players
                .iter()
                .filter(|u| set.contains(&u.id()))
                .map(|u| u.name())
                .collect()
        };
        MatchSummary {
            id: self.id,
            variant: self.variant,
            ranking: self.ranking,
            arena: self.arena.name.clone(),
            grid: self.grid_pos,
            phase: core.phase,
            duel: self.duel,
            update_stats: self.update_stats,
            duration_secs: core.duration.as_secs(),
            alive: names(&core.alive),
            dead: names(&core.dead),
            spectators: core.spectators.len(),
        }
    }

    /// Build the arena, equip everyone and put them on their spawns
    fn prepare(&self) {
        let services = &self.services;
        services
            .world
            .build_structure(self.origin, Structure::Arena(&self.arena));

        let mut guard = self.state.lock();
        let MatchState { core, strategies } = &mut *guard;
        {
            let mut ctx = HookContext { m: self, core: &mut *core };
            for s in strategies.iter_mut() {
                s.on_prepare(&mut ctx);
            }
        }

        for u in &self.players {
            let h = u.handle();
            h.set_interactible(false);
            services.lobby.remove(h);
            services.registry.assign(u.id(), self.ranking);
            h.apply_loadout(self.variant.loadout());
            h.set_attack_immunity(SPAWN_IMMUNITY);
            {
                let mut ctx = HookContext { m: self, core: &mut *core };
                for s in strategies.iter_mut() {
                    s.on_user_add(&mut ctx, u);
                }
            }
            core.stats.insert(u.id(), Stats::default());
            services.world.add_combatant(h);
        }

        if self.duel {
            self.announce_opponents();
        }

        let offset = self.origin.to_vec3();
        core.center = offset + self.arena.spawn(GROUP_SPAWN);
        if self.duel {
            core.spawns
                .insert(self.players[0].id(), offset + self.arena.spawn(DUEL_SPAWN_A));
            core.spawns
                .insert(self.players[1].id(), offset + self.arena.spawn(DUEL_SPAWN_B));
        } else {
            for u in &self.players {
                core.spawns.insert(u.id(), core.center);
            }
        }
        self.teleport_in(core);
    }

    fn announce_opponents(&self) {
        for u in &self.players {
            let Some(opponent) = self.opponent_of(u.id()) else {
                continue;
            };
            if !self.services.registry.is_registered(opponent.id()) {
                continue;
            }
            let h = u.handle();
            h.message("match.message.found", &[]);
            h.message("match.message.opponent", &[opponent.display_name().into()]);
            h.message("match.message.ping", &[ping_of(opponent.handle().as_ref()).into()]);
            if self.ranking.is_ranked() {
                let own = u.variant_rating(self.variant);
                let theirs = opponent.variant_rating(self.variant);
                h.message("match.message.elo", &[theirs.into(), (own - theirs).into()]);
            }
            h.message("match.message.map", &[self.arena.name.clone().into()]);
        }
    }

    /// Move every living combatant to its spawn; duelists face each other
    pub(crate) fn teleport_in(&self, core: &MatchCore) {
        for u in &self.players {
            if !core.alive.contains(&u.id()) {
                continue;
            }
            let Some(pos) = core.spawns.get(&u.id()).copied() else {
                continue;
            };
            let h = u.handle();
            h.teleport(pos);

            if !self.duel {
                continue;
            }
            let target = self
                .opponent_of(u.id())
                .and_then(|o| core.spawns.get(&o.id()).copied());
            if let Some(target) = target {
                let (yaw, pitch) = facing(pos, target);
                let current = h.rotation();
                h.rotate(yaw - current.yaw, pitch - current.pitch);
            }
        }
    }

    /// Advance the state machine by one second
    pub(crate) fn tick(&self) {
        let mut refresh = false;
        let mut stop = false;
        let mut begin = None;
        {
            let mut guard = self.state.lock();
            let core = &mut guard.core;
            match core.phase {
                Phase::Countdown => {
                    let was_started = core.started;
                    core.start_count = core.start_count.saturating_sub(SECOND);
                    if !core.start_count.is_zero() {
                        let remaining = core.start_count.as_secs();
                        self.broadcast(core, true, "match.message.count", &[remaining.into()]);
                        for u in &self.players {
                            let h = u.handle();
                            if !was_started {
                                h.send_title(
                                    Title::new("match.title.count").with_args(vec![remaining.into()]),
                                );
                            }
                            h.play_sound("note.harp", 1.0);
                        }
                    } else {
                        begin = Some(!core.started);
                    }

                    // no scoreboard before the first start
                    if was_started {
                        (refresh, stop) = self.advance_fight(core);
                    }
                }
                Phase::Fighting => {
                    (refresh, stop) = self.advance_fight(core);
                }
                Phase::Ending => {
                    core.end_count = core.end_count.saturating_sub(SECOND);
                    stop = core.end_count.is_zero();
                }
            }
        }

        if let Some(initial) = begin {
            self.release_players(initial);
            let mut guard = self.state.lock();
            let MatchState { core, strategies } = &mut *guard;
            self.start_in(core, strategies, initial);
        }
        if refresh {
            for u in &self.players {
                self.send_scoreboard(u);
            }
        }
        if stop {
            self.request_stop();
        }
    }

    /// Returns (refresh scoreboards, stop match)
    fn advance_fight(&self, core: &mut MatchCore) -> (bool, bool) {
        core.duration += SECOND;
        if core.duration >= core.max_duration {
            self.broadcast(core, true, "match.message.late", &[]);
            info!(match_id = %self.id, duration_secs = core.duration.as_secs(), "Match ran out of time");
            return (true, true);
        }
        (true, false)
    }

    /// Let everyone move and fight. Called without the match lock held.
    fn release_players(&self, initial: bool) {
        for u in &self.players {
            let h = u.handle();
            h.play_sound("note.harp", 2.0);
            h.set_interactible(true);
            if initial {
                h.message("match.message.start", &[]);
            }
            h.send_title(Title::blank());
            h.set_mobile();
        }
    }

    fn start_in(&self, core: &mut MatchCore, strategies: &mut [Strategy], initial: bool) {
        // a removal while the lock was released may already have ended it
        if core.phase != Phase::Countdown {
            return;
        }
        core.phase = Phase::Fighting;
        core.started = true;
        let mut ctx = HookContext { m: self, core: &mut *core };
        for s in strategies.iter_mut() {
            s.on_start(&mut ctx, initial);
        }
        if initial {
            debug!(match_id = %self.id, "Fight started");
        }
    }

    /// Enter the ending phase and settle the result
    fn end_in(&self, core: &mut MatchCore) {
        core.phase = Phase::Ending;
        for u in &self.players {
            if let Some(stats) = core.stats.get_mut(&u.id()) {
                stats.items = u.handle().inventory();
            }
        }

        let winners: Vec<&Arc<User>> = self
            .players
            .iter()
            .filter(|u| core.alive.contains(&u.id()))
            .collect();

        for winner in &winners {
            let h = winner.handle();
            h.send_title(
                Title::new("match.title.victory")
                    .with_subtitle("match.subtitle.victory", Vec::new())
                    .with_fade_in(Duration::ZERO)
                    .with_fade_out(Duration::ZERO)
                    .with_duration(Duration::from_secs(3)),
            );
            h.set_attack_immunity(SPAWN_IMMUNITY);
            h.set_mobile();
            h.clear_loadout();

            if !self.duel {
                continue;
            }
            let Some(loser) = self.opponent_of(winner.id()) else {
                continue;
            };
            let registry = &self.services.registry;
            if !registry.is_registered(winner.id()) || !registry.is_registered(loser.id()) {
                continue;
            }

            self.broadcast(core, false, "match.message.end", &[]);
            self.broadcast(
                core,
                true,
                "match.message.details",
                &[winner.display_name().into(), loser.display_name().into()],
            );
            if !core.spectators.is_empty() {
                let names: Vec<String> = core.spectators.values().map(|s| s.display_name()).collect();
                self.broadcast(
                    core,
                    true,
                    "match.message.spectators",
                    &[names.len().into(), names.join(", ").into()],
                );
            }

            if self.ranking.is_ranked() {
                self.settle_ranked(core, winner, loser);
            } else if self.update_stats {
                let mut w = winner.record();
                let mut l = loser.record();
                rating::settle_unranked(&mut w, &mut l);
                winner.set_record(w);
                loser.set_record(l);
            }
        }

        let winner = winners.first().map(|u| u.name());
        info!(
            match_id = %self.id,
            winner = winner.as_deref().unwrap_or("none"),
            duration_secs = core.duration.as_secs(),
            "Match ended"
        );
        self.services.notifier.notify(MatchEvent::MatchEnded {
            match_id: self.id,
            variant: self.variant,
            ranking: self.ranking,
            winner,
            duration_secs: core.duration.as_secs(),
        });
    }

    fn settle_ranked(&self, core: &MatchCore, winner: &User, loser: &User) {
        let mut w = winner.record();
        let mut l = loser.record();
        let change = rating::settle_ranked(self.variant, &mut w, &mut l);
        let (winner_rating, loser_rating) = (w.variant_rating(self.variant), l.variant_rating(self.variant));
        winner.set_record(w);
        loser.set_record(l);

        self.broadcast(
            core,
            true,
            "match.message.elo.changes",
            &[
                winner.name().into(),
                change.winner_before.into(),
                change.gained.into(),
                loser.name().into(),
                change.loser_before.into(),
                change.lost.into(),
            ],
        );
        self.services.notifier.notify(MatchEvent::RatingChanged {
            match_id: self.id,
            variant: self.variant,
            winner: winner.name(),
            loser: loser.name(),
            winner_rating,
            loser_rating,
            gained: change.gained,
            lost: change.lost,
        });
    }

    fn broadcast(&self, core: &MatchCore, spectators: bool, key: &str, args: &[Arg]) {
        for u in &self.players {
            u.handle().message(key, args);
        }
        if spectators {
            for s in core.spectators.values() {
                s.handle().message(key, args);
            }
        }
    }
}

impl std::fmt::Debug for Match {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Match")
            .field("id", &self.id)
            .field("variant", &self.variant)
            .field("ranking", &self.ranking)
            .field("grid_pos", &self.grid_pos)
            .finish_non_exhaustive()
    }
}

/// Yaw and pitch (degrees) that look from `from` towards `to`
fn facing(from: Vec3, to: Vec3) -> (f64, f64) {
    let diff = to - from;
    let horizontal = diff.horizontal_len();
    let pitch = (-diff.y.atan2(horizontal)).to_degrees();
    let mut yaw = diff.z.atan2(diff.x).to_degrees() - 90.0;
    if yaw < 0.0 {
        yaw += 360.0;
    }
    (yaw, pitch)
}
