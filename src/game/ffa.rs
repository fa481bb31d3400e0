//! Open-world free-for-all arenas: combatants drop in and leave at will

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::app::Services;
use crate::combatant::{Board, CombatantId, Loadout, User};
use crate::world::{BlockPos, Region, Structure, Vec3};

use super::arena::{ArenaTemplate, GROUP_SPAWN};
use super::{GameVariant, GridPos};

/// Immunity granted on joining and on every respawn
pub const RESPAWN_IMMUNITY: Duration = Duration::from_secs(3);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FreeForAllError {
    #[error("{0} has no open-world arena")]
    NotOpenWorld(GameVariant),
    #[error("arena {arena} does not support {variant}")]
    Unsupported { arena: String, variant: GameVariant },
    #[error("combatant is not registered")]
    NotRegistered,
    #[error("combatant is busy")]
    Busy,
    #[error("the {0} arena is closed")]
    Closed(GameVariant),
    #[error("the {0} arena is full")]
    Full(GameVariant),
}

/// Kill record of one combatant for the time it spends in the arena
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FreeForAllStats {
    pub kills: u32,
    pub streak: u32,
    pub deaths: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct FreeForAllSummary {
    pub variant: GameVariant,
    pub arena: String,
    pub players: usize,
    pub capacity: usize,
    pub open: bool,
    pub pvp: bool,
}

struct Entry {
    user: Arc<User>,
    stats: FreeForAllStats,
}

/// One persistent arena per open-world variant, capped at the variant's
/// capacity. Unlike a match it has no phases and never ends on its own.
pub struct FreeForAll {
    variant: GameVariant,
    capacity: usize,
    arena: Arc<ArenaTemplate>,
    grid_pos: GridPos,
    origin: BlockPos,
    services: Services,
    players: Mutex<HashMap<CombatantId, Entry>>,
    open: AtomicBool,
    pvp: AtomicBool,
}

impl FreeForAll {
    /// Build the arena at `grid_pos`. The caller owns the grid reservation.
    pub fn new(
        variant: GameVariant,
        arena: Arc<ArenaTemplate>,
        grid_pos: GridPos,
        spacing: i32,
        services: Services,
    ) -> Result<Self, FreeForAllError> {
        let capacity = variant
            .capacity()
            .ok_or(FreeForAllError::NotOpenWorld(variant))?;
        if !arena.supports(variant) {
            return Err(FreeForAllError::Unsupported {
                arena: arena.name.clone(),
                variant,
            });
        }

        let origin = grid_pos.region_origin(spacing);
        services
            .world
            .build_structure(origin, Structure::Arena(&arena));
        info!(
            variant = %variant,
            arena = %arena.name,
            capacity,
            grid_x = grid_pos.x,
            grid_y = grid_pos.y,
            "Free-for-all arena opened"
        );

        Ok(Self {
            variant,
            capacity,
            arena,
            grid_pos,
            origin,
            services,
            players: Mutex::new(HashMap::new()),
            open: AtomicBool::new(true),
            pvp: AtomicBool::new(true),
        })
    }

    pub fn variant(&self) -> GameVariant {
        self.variant
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn grid_pos(&self) -> GridPos {
        self.grid_pos
    }

    pub fn spawn(&self) -> Vec3 {
        self.origin.to_vec3() + self.arena.spawn(GROUP_SPAWN)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn is_pvp(&self) -> bool {
        self.pvp.load(Ordering::SeqCst)
    }

    /// Flip whether new combatants may join. Returns the previous value.
    pub fn toggle_open(&self) -> bool {
        let old = self.open.fetch_xor(true, Ordering::SeqCst);
        info!(variant = %self.variant, open = !old, "Free-for-all status toggled");
        old
    }

    /// Flip whether kills count. Returns the previous value.
    pub fn toggle_pvp(&self) -> bool {
        let old = self.pvp.fetch_xor(true, Ordering::SeqCst);
        info!(variant = %self.variant, pvp = !old, "Free-for-all pvp toggled");
        old
    }

    pub fn players(&self) -> Vec<Arc<User>> {
        self.players.lock().values().map(|e| e.user.clone()).collect()
    }

    pub fn player_count(&self) -> usize {
        self.players.lock().len()
    }

    pub fn contains(&self, id: CombatantId) -> bool {
        self.players.lock().contains_key(&id)
    }

    pub fn stats_of(&self, id: CombatantId) -> Option<FreeForAllStats> {
        self.players.lock().get(&id).map(|e| e.stats)
    }

    /// Drop a registered, idle combatant into the arena
    pub fn add_player(&self, user: &Arc<User>) -> Result<(), FreeForAllError> {
        let id = user.id();
        let registry = &self.services.registry;
        if !registry.is_registered(id) {
            return Err(FreeForAllError::NotRegistered);
        }
        if !self.is_open() {
            return Err(FreeForAllError::Closed(self.variant));
        }
        {
            let mut players = self.players.lock();
            if registry.is_busy(id) {
                return Err(FreeForAllError::Busy);
            }
            if players.len() >= self.capacity {
                return Err(FreeForAllError::Full(self.variant));
            }
            registry.assign_free_for_all(id, self.variant);
            players.insert(
                id,
                Entry {
                    user: user.clone(),
                    stats: FreeForAllStats::default(),
                },
            );
        }

        let h = user.handle();
        self.services.lobby.remove(h);
        self.services.world.add_combatant(h);
        self.respawn(user);
        h.message("ffa.message.join", &[self.variant.name().into()]);
        self.send_scoreboard(user, FreeForAllStats::default());
        info!(combatant = %id, variant = %self.variant, "Joined free-for-all");
        Ok(())
    }

    /// Take a combatant out. `force` skips the return to the lobby (disconnects).
    pub fn remove_player(&self, id: CombatantId, force: bool) -> bool {
        let Some(entry) = self.players.lock().remove(&id) else {
            return false;
        };
        self.services.registry.unassign(id);
        if !force {
            let h = entry.user.handle();
            h.apply_loadout(Loadout::Lobby);
            self.services.lobby.add(h);
        }
        debug!(combatant = %id, variant = %self.variant, force, "Left free-for-all");
        true
    }

    /// Count a kill and respawn the victim. Ignored while pvp is off or when
    /// either side is not in this arena.
    pub fn record_kill(&self, killer: CombatantId, victim: CombatantId) -> bool {
        if !self.is_pvp() || killer == victim {
            return false;
        }
        let (killer, killer_stats, victim, victim_stats) = {
            let mut players = self.players.lock();
            if !players.contains_key(&killer) || !players.contains_key(&victim) {
                return false;
            }
            let (victim, victim_stats) = match players.get_mut(&victim) {
                Some(e) => {
                    e.stats.deaths += 1;
                    e.stats.streak = 0;
                    (e.user.clone(), e.stats)
                }
                None => return false,
            };
            let (killer, killer_stats) = match players.get_mut(&killer) {
                Some(e) => {
                    e.stats.kills += 1;
                    e.stats.streak += 1;
                    (e.user.clone(), e.stats)
                }
                None => return false,
            };
            (killer, killer_stats, victim, victim_stats)
        };

        killer.handle().message(
            "ffa.message.kill",
            &[victim.display_name().into(), killer_stats.streak.into()],
        );
        victim
            .handle()
            .message("ffa.message.killed", &[killer.display_name().into()]);
        self.respawn(&victim);
        self.send_scoreboard(&killer, killer_stats);
        self.send_scoreboard(&victim, victim_stats);
        debug!(killer = %killer.id(), victim = %victim.id(), variant = %self.variant, "Free-for-all kill");
        true
    }

    /// Send everyone back to the lobby and wipe the region
    pub fn close(&self) {
        let entries: Vec<Entry> = self.players.lock().drain().map(|(_, e)| e).collect();
        for entry in &entries {
            let h = entry.user.handle();
            self.services.registry.unassign(entry.user.id());
            h.message("ffa.message.closed", &[self.variant.name().into()]);
            h.apply_loadout(Loadout::Lobby);
            self.services.lobby.add(h);
        }

        let dims = self.arena.dimensions;
        self.services
            .world
            .build_structure(self.origin, Structure::Empty(dims));
        self.services.world.remove_entities_within(Region {
            min: self.origin,
            max: self.origin.offset(dims),
        });
        info!(variant = %self.variant, players = entries.len(), "Free-for-all arena closed");
    }

    pub fn summary(&self) -> FreeForAllSummary {
        FreeForAllSummary {
            variant: self.variant,
            arena: self.arena.name.clone(),
            players: self.player_count(),
            capacity: self.capacity,
            open: self.is_open(),
            pvp: self.is_pvp(),
        }
    }

    fn respawn(&self, user: &User) {
        let h = user.handle();
        h.teleport(self.spawn());
        h.set_attack_immunity(RESPAWN_IMMUNITY);
        h.apply_loadout(Loadout::FreeForAll(self.variant));
    }

    fn send_scoreboard(&self, user: &Arc<User>, stats: FreeForAllStats) {
        let board = Board::new(
            "scoreboard.ffa",
            vec![stats.kills.into(), stats.streak.into(), stats.deaths.into()],
        );
        self.services.scoreboard.render(user.handle(), &board);
    }
}

impl std::fmt::Debug for FreeForAll {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreeForAll")
            .field("variant", &self.variant)
            .field("players", &self.player_count())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::Arg;
    use crate::matchmaking::Ranking;
    use crate::testing::{Fixture, MockCombatant};

    fn arena(fx: &Fixture, variant: GameVariant) -> FreeForAll {
        FreeForAll::new(variant, fx.arena(), GridPos::new(1, 0), 1000, fx.services.clone()).unwrap()
    }

    #[test]
    fn only_open_world_variants_get_an_arena() {
        let fx = Fixture::new();
        let err = FreeForAll::new(
            GameVariant::Boxing,
            fx.arena(),
            GridPos::ORIGIN,
            1000,
            fx.services.clone(),
        )
        .unwrap_err();
        assert_eq!(err, FreeForAllError::NotOpenWorld(GameVariant::Boxing));

        let ffa = arena(&fx, GameVariant::Sumo);
        assert_eq!(ffa.capacity(), 30);
        assert_eq!(
            fx.world.builds(),
            vec![(BlockPos::new(2000, 0, 1000), "arena:Test".to_string())]
        );
    }

    #[test]
    fn joining_equips_and_claims_the_combatant() {
        let fx = Fixture::new();
        let ffa = arena(&fx, GameVariant::NoDebuff);
        let c = MockCombatant::new("alpha");
        let u = fx.user(&c, 1000);

        ffa.add_player(&u).unwrap();

        assert!(ffa.contains(c.id()));
        assert_eq!(ffa.player_count(), 1);
        assert!(c.has_loadout(Loadout::FreeForAll(GameVariant::NoDebuff)));
        assert_eq!(c.last_teleport(), Some(ffa.spawn()));
        assert_eq!(c.immunity(), RESPAWN_IMMUNITY);
        assert!(!fx.lobby.contains(c.id()));
        assert!(fx.world.added().contains(&c.id()));
        assert!(fx.registry().is_busy(c.id()));
        assert_eq!(fx.registry().assignment(c.id()), None);
        assert_eq!(fx.scoreboard.boards_for(c.id()).last().map(|b| b.key), Some("scoreboard.ffa"));

        assert_eq!(ffa.add_player(&u), Err(FreeForAllError::Busy));
    }

    #[test]
    fn queued_combatants_cannot_join() {
        let fx = Fixture::new();
        let ffa = arena(&fx, GameVariant::NoDebuff);
        let c = MockCombatant::new("alpha");
        let u = fx.user(&c, 1000);
        fx.registry().assign(c.id(), Ranking::Unranked);

        assert_eq!(ffa.add_player(&u), Err(FreeForAllError::Busy));
        assert!(!ffa.contains(c.id()));
        assert_eq!(fx.registry().assignment(c.id()), Some(Ranking::Unranked));
    }

    #[test]
    fn capacity_and_status_gate_entry() {
        let fx = Fixture::new();
        let ffa = arena(&fx, GameVariant::Sumo);
        for i in 0..ffa.capacity() {
            let c = MockCombatant::new(&format!("p{i}"));
            ffa.add_player(&fx.user(&c, 1000)).unwrap();
        }
        let late = fx.user(&MockCombatant::new("late"), 1000);
        assert_eq!(ffa.add_player(&late), Err(FreeForAllError::Full(GameVariant::Sumo)));

        let fx = Fixture::new();
        let ffa = arena(&fx, GameVariant::Sumo);
        assert!(ffa.toggle_open());
        let u = fx.user(&MockCombatant::new("alpha"), 1000);
        assert_eq!(ffa.add_player(&u), Err(FreeForAllError::Closed(GameVariant::Sumo)));
        assert!(!fx.registry().is_busy(u.id()));
        assert!(!ffa.toggle_open());
        assert!(ffa.add_player(&u).is_ok());
    }

    #[test]
    fn leaving_returns_to_the_lobby_unless_forced() {
        let fx = Fixture::new();
        let ffa = arena(&fx, GameVariant::NoDebuff);
        let a = MockCombatant::new("alpha");
        let b = MockCombatant::new("bravo");
        let ua = fx.user(&a, 1000);
        let ub = fx.user(&b, 1000);
        ffa.add_player(&ua).unwrap();
        ffa.add_player(&ub).unwrap();

        assert!(ffa.remove_player(a.id(), false));
        assert!(!ffa.remove_player(a.id(), false));
        assert!(fx.lobby.contains(a.id()));
        assert!(a.has_loadout(Loadout::Lobby));
        assert!(!fx.registry().is_busy(a.id()));

        assert!(ffa.remove_player(b.id(), true));
        assert!(!fx.lobby.contains(b.id()));
        assert!(!fx.registry().is_busy(b.id()));
    }

    #[test]
    fn kills_track_streaks_and_respawn_the_victim() {
        let fx = Fixture::new();
        let ffa = arena(&fx, GameVariant::NoDebuff);
        let a = MockCombatant::new("alpha");
        let b = MockCombatant::new("bravo");
        let ua = fx.user(&a, 1000);
        let ub = fx.user(&b, 1000);
        ffa.add_player(&ua).unwrap();
        ffa.add_player(&ub).unwrap();

        assert!(ffa.record_kill(a.id(), b.id()));
        assert!(ffa.record_kill(a.id(), b.id()));
        assert_eq!(
            ffa.stats_of(a.id()),
            Some(FreeForAllStats { kills: 2, streak: 2, deaths: 0 })
        );
        assert_eq!(b.count_of("ffa.message.killed"), 2);
        assert_eq!(a.args_of("ffa.message.kill"), Some(vec![Arg::from("bravo"), Arg::from(2u32)]));
        assert_eq!(b.last_teleport(), Some(ffa.spawn()));

        assert!(ffa.record_kill(b.id(), a.id()));
        assert_eq!(
            ffa.stats_of(a.id()),
            Some(FreeForAllStats { kills: 2, streak: 0, deaths: 1 })
        );
        let board = fx.scoreboard.boards_for(a.id()).pop().unwrap();
        assert_eq!(board.args, vec![Arg::Int(2), Arg::Int(0), Arg::Int(1)]);

        assert!(!ffa.record_kill(a.id(), a.id()));
        assert!(ffa.toggle_pvp());
        assert!(!ffa.record_kill(a.id(), b.id()));
        assert_eq!(ffa.stats_of(a.id()).map(|s| s.kills), Some(2));
    }

    #[test]
    fn closing_sends_everyone_home_and_wipes_the_region() {
        let fx = Fixture::new();
        let ffa = arena(&fx, GameVariant::Sumo);
        let c = MockCombatant::new("alpha");
        ffa.add_player(&fx.user(&c, 1000)).unwrap();

        ffa.close();

        assert_eq!(ffa.player_count(), 0);
        assert!(fx.lobby.contains(c.id()));
        assert!(c.received("ffa.message.closed"));
        assert!(!fx.registry().is_busy(c.id()));
        assert_eq!(fx.world.builds().last().map(|(_, k)| k.as_str()), Some("empty"));
        assert_eq!(fx.world.sweeps().len(), 1);
    }
}
