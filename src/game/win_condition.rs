//! Win-condition strategies attached to a match.
//!
//! Every hook runs with the match state already locked and receives it via
//! [`HookContext`]. Hooks must not call back into the match's public API.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::combatant::{Board, CombatantId, Title, User};

use super::r#match::{Match, MatchCore, Phase};

/// Max duration imposed by the duel-only strategies
pub const DUEL_STRATEGY_MAX_DURATION: Duration = Duration::from_secs(15 * 60);
/// Countdown used between rounds
pub const ROUND_RESTART_COUNTDOWN: Duration = Duration::from_secs(4);

/// What to do with a hit that is about to be counted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitVerdict {
    Allow,
    /// Drop the hit silently
    Cancel,
    /// Drop the hit and eliminate the victim instead
    Eliminate,
}

/// The locked match a hook operates on
pub struct HookContext<'a> {
    pub(crate) m: &'a Match,
    pub(crate) core: &'a mut MatchCore,
}

impl<'a> HookContext<'a> {
    pub fn players(&self) -> &'a [Arc<User>] {
        self.m.players()
    }

    pub fn opponent(&self, id: CombatantId) -> Option<&'a Arc<User>> {
        self.m.opponent_of(id)
    }

    pub fn hits(&self, id: CombatantId) -> u32 {
        self.core.stats.get(&id).map(|s| s.hits).unwrap_or(0)
    }

    pub fn duration(&self) -> Duration {
        self.core.duration
    }

    pub fn set_max_duration(&mut self, d: Duration) {
        self.core.max_duration = d;
    }

    /// Put the match back into countdown for another round
    pub fn restart_countdown(&mut self, d: Duration) {
        self.core.start_count = d;
        self.core.phase = Phase::Countdown;
    }

    pub fn clear_placements(&mut self) {
        self.m.clear_placements_in(self.core);
    }

    pub fn teleport_to_spawns(&mut self) {
        self.m.teleport_in(self.core);
    }
}

/// Lifecycle hooks of a match. Every hook is a no-op by default.
pub trait WinCondition {
    /// Called once before the countdown. May adjust the max duration.
    fn on_prepare(&mut self, _ctx: &mut HookContext<'_>) {}

    /// Called whenever fighting begins; `initial` is false after a round restart
    fn on_start(&mut self, _ctx: &mut HookContext<'_>, _initial: bool) {}

    /// Replace the default scoreboard of `viewer`
    fn on_scoreboard(&mut self, _ctx: &mut HookContext<'_>, _viewer: &User) -> Option<Board> {
        None
    }

    fn on_user_add(&mut self, _ctx: &mut HookContext<'_>, _user: &User) {}

    /// `hits` is the attacker's count if this hit were accepted
    fn on_start_hit(
        &mut self,
        _ctx: &mut HookContext<'_>,
        _attacker: CombatantId,
        _victim: CombatantId,
        _hits: u32,
    ) -> HitVerdict {
        HitVerdict::Allow
    }

    /// Returns true when the scoreboards of both parties should be refreshed
    fn on_hit(
        &mut self,
        _ctx: &mut HookContext<'_>,
        _attacker: CombatantId,
        _victim: CombatantId,
    ) -> bool {
        false
    }

    /// Returns false to veto a soft elimination
    fn on_user_remove(&mut self, _ctx: &mut HookContext<'_>, _victim: CombatantId) -> bool {
        true
    }
}

/// The closed set of strategies a match can carry
#[derive(Debug)]
pub enum Strategy {
    Default,
    HitsToWin(HitsToWin),
    RoundsToWin(RoundsToWin),
}

impl Strategy {
    fn inner(&mut self) -> Option<&mut dyn WinCondition> {
        match self {
            Strategy::Default => None,
            Strategy::HitsToWin(h) => Some(h),
            Strategy::RoundsToWin(r) => Some(r),
        }
    }
}

impl WinCondition for Strategy {
    fn on_prepare(&mut self, ctx: &mut HookContext<'_>) {
        if let Some(s) = self.inner() {
            s.on_prepare(ctx)
        }
    }

    fn on_start(&mut self, ctx: &mut HookContext<'_>, initial: bool) {
        if let Some(s) = self.inner() {
            s.on_start(ctx, initial)
        }
    }

    fn on_scoreboard(&mut self, ctx: &mut HookContext<'_>, viewer: &User) -> Option<Board> {
        self.inner().and_then(|s| s.on_scoreboard(ctx, viewer))
    }

    fn on_user_add(&mut self, ctx: &mut HookContext<'_>, user: &User) {
        if let Some(s) = self.inner() {
            s.on_user_add(ctx, user)
        }
    }

    fn on_start_hit(
        &mut self,
        ctx: &mut HookContext<'_>,
        attacker: CombatantId,
        victim: CombatantId,
        hits: u32,
    ) -> HitVerdict {
        match self.inner() {
            Some(s) => s.on_start_hit(ctx, attacker, victim, hits),
            None => HitVerdict::Allow,
        }
    }

    fn on_hit(&mut self, ctx: &mut HookContext<'_>, attacker: CombatantId, victim: CombatantId) -> bool {
        match self.inner() {
            Some(s) => s.on_hit(ctx, attacker, victim),
            None => false,
        }
    }

    fn on_user_remove(&mut self, ctx: &mut HookContext<'_>, victim: CombatantId) -> bool {
        match self.inner() {
            Some(s) => s.on_user_remove(ctx, victim),
            None => true,
        }
    }
}

/// First to land `target` hits wins. Duels only.
#[derive(Debug)]
pub struct HitsToWin {
    target: u32,
}

impl HitsToWin {
    /// # Panics
    /// If the match is not a duel.
    pub fn new(duel: bool, target: u32) -> Self {
        assert!(duel, "hits to win: match must be a duel");
        Self { target }
    }
}

impl WinCondition for HitsToWin {
    fn on_prepare(&mut self, ctx: &mut HookContext<'_>) {
        ctx.set_max_duration(DUEL_STRATEGY_MAX_DURATION);
    }

    fn on_start(&mut self, ctx: &mut HookContext<'_>, initial: bool) {
        if !initial {
            return;
        }
        for u in ctx.players() {
            u.handle().message("match.message.hits", &[]);
        }
    }

    fn on_scoreboard(&mut self, ctx: &mut HookContext<'_>, viewer: &User) -> Option<Board> {
        let opponent = ctx.opponent(viewer.id())?;
        let own = ctx.hits(viewer.id());
        let theirs = ctx.hits(opponent.id());
        Some(Board::new(
            "scoreboard.duels.boxing",
            vec![
                ctx.duration().into(),
                (own as i64 - theirs as i64).into(),
                own.into(),
                theirs.into(),
                crate::combatant::ping_of(viewer.handle().as_ref()).into(),
                crate::combatant::ping_of(opponent.handle().as_ref()).into(),
            ],
        ))
    }

    fn on_start_hit(
        &mut self,
        _ctx: &mut HookContext<'_>,
        _attacker: CombatantId,
        _victim: CombatantId,
        hits: u32,
    ) -> HitVerdict {
        if hits == self.target {
            HitVerdict::Eliminate
        } else {
            HitVerdict::Allow
        }
    }

    fn on_hit(&mut self, _ctx: &mut HookContext<'_>, _attacker: CombatantId, _victim: CombatantId) -> bool {
        true
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RoundRecord {
    pub wins: u32,
    pub losses: u32,
}

/// First to win `target` rounds wins. Lost rounds are replayed. Duels only.
#[derive(Debug)]
pub struct RoundsToWin {
    target: u32,
    round: u32,
    records: HashMap<CombatantId, RoundRecord>,
}

impl RoundsToWin {
    /// # Panics
    /// If the match is not a duel.
    pub fn new(duel: bool, target: u32) -> Self {
        assert!(duel, "rounds to win: match must be a duel");
        Self {
            target,
            round: 1,
            records: HashMap::new(),
        }
    }

    pub fn record(&self, id: CombatantId) -> RoundRecord {
        self.records.get(&id).copied().unwrap_or_default()
    }

    pub fn round(&self) -> u32 {
        self.round
    }
}

fn round_title(key: &'static str, record: RoundRecord) -> Title {
    Title::new(key)
        .with_fade_in(Duration::ZERO)
        .with_subtitle("round.subtitle.info", vec![record.wins.into(), record.losses.into()])
        .with_duration(Duration::from_secs(2))
        .with_fade_out(Duration::from_secs(1))
}

impl WinCondition for RoundsToWin {
    fn on_prepare(&mut self, ctx: &mut HookContext<'_>) {
        ctx.set_max_duration(DUEL_STRATEGY_MAX_DURATION);
        for u in ctx.players() {
            u.handle().set_immobile();
        }
    }

    fn on_start(&mut self, ctx: &mut HookContext<'_>, initial: bool) {
        let key = if initial {
            "match.message.rounds"
        } else {
            "round.message.start"
        };
        for u in ctx.players() {
            u.handle().message(key, &[]);
        }
    }

    fn on_user_add(&mut self, _ctx: &mut HookContext<'_>, user: &User) {
        self.records.insert(user.id(), RoundRecord::default());
    }

    fn on_user_remove(&mut self, ctx: &mut HookContext<'_>, victim: CombatantId) -> bool {
        let Some(opponent) = ctx.opponent(victim) else {
            return true;
        };
        let Some(loser) = ctx.players().iter().find(|u| u.id() == victim) else {
            return true;
        };

        let lost = {
            let r = self.records.entry(victim).or_default();
            r.losses += 1;
            *r
        };
        let won = {
            let r = self.records.entry(opponent.id()).or_default();
            r.wins += 1;
            *r
        };
        if won.wins >= self.target {
            return true;
        }

        self.round += 1;
        ctx.restart_countdown(ROUND_RESTART_COUNTDOWN);
        tracing::debug!(
            match_id = %ctx.m.id(),
            round = self.round,
            winner = %opponent.id(),
            "Round finished, replaying"
        );

        loser.handle().send_title(round_title("round.title.lost", lost));
        opponent.handle().send_title(round_title("round.title.won", won));

        let loadout = ctx.m.variant().loadout();
        for u in ctx.players() {
            let h = u.handle();
            h.apply_loadout(loadout);
            h.set_attack_immunity(ROUND_RESTART_COUNTDOWN);
            h.set_immobile();
        }

        ctx.clear_placements();
        ctx.teleport_to_spawns();
        false
    }
}
