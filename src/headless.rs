//! Stand-alone backend: the world, lobby and scoreboard only write to the log

use std::sync::Arc;

use dashmap::DashSet;
use tracing::{debug, trace};

use crate::combatant::{Arg, Board, Combatant, CombatantId, ScoreboardRenderer};
use crate::util::time::format_clock;
use crate::world::{ArenaWorld, BlockPos, Lobby, Region, Structure};

/// Render message arguments the way a log line wants them
pub fn render_args(args: &[Arg]) -> String {
    args.iter()
        .map(|arg| match arg {
            Arg::Text(s) => s.clone(),
            Arg::Int(v) => v.to_string(),
            Arg::Duration(d) => format_clock(*d),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Default)]
pub struct HeadlessWorld;

impl ArenaWorld for HeadlessWorld {
    fn build_structure(&self, origin: BlockPos, structure: Structure<'_>) {
        let dims = structure.dimensions();
        match structure {
            Structure::Arena(t) => debug!(
                arena = %t.name,
                x = origin.x,
                z = origin.z,
                "Arena built"
            ),
            Structure::Empty(_) => debug!(
                x = origin.x,
                z = origin.z,
                size_x = dims.x,
                size_z = dims.z,
                "Region cleared"
            ),
        }
    }

    fn clear_block(&self, pos: BlockPos) {
        trace!(x = pos.x, y = pos.y, z = pos.z, "Block cleared");
    }

    fn remove_entities_within(&self, region: Region) {
        trace!(min = ?region.min, max = ?region.max, "Entities removed");
    }

    fn add_combatant(&self, combatant: &Arc<dyn Combatant>) {
        debug!(combatant = %combatant.id(), "Combatant moved to arena world");
    }
}

/// Lobby membership, kept only so the log can say who is where
#[derive(Debug, Default)]
pub struct HeadlessLobby {
    members: DashSet<CombatantId>,
}

impl HeadlessLobby {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: CombatantId) -> bool {
        self.members.contains(&id)
    }
}

impl Lobby for HeadlessLobby {
    fn add(&self, combatant: &Arc<dyn Combatant>) {
        self.members.insert(combatant.id());
        debug!(combatant = %combatant.id(), "Joined lobby");
    }

    fn remove(&self, combatant: &Arc<dyn Combatant>) {
        self.members.remove(&combatant.id());
        debug!(combatant = %combatant.id(), "Left lobby");
    }
}

#[derive(Debug, Default)]
pub struct LogScoreboard;

impl ScoreboardRenderer for LogScoreboard {
    fn render(&self, combatant: &Arc<dyn Combatant>, board: &Board) {
        trace!(
            combatant = %combatant.id(),
            board = board.key,
            args = %render_args(&board.args),
            "Scoreboard"
        );
    }
}
