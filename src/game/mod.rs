//! Arenas, variants, open-world arenas and the match state machine

pub mod arena;
pub mod ffa;
pub mod grid;
pub mod r#match;
pub mod stats;
pub mod variant;
pub mod win_condition;

pub use arena::{ArenaCatalog, ArenaError, ArenaTemplate};
pub use ffa::{FreeForAll, FreeForAllError, FreeForAllStats, FreeForAllSummary};
pub use grid::{Grid, GridPos};
pub use r#match::{
    Match, MatchError, MatchParams, MatchSummary, MatchTimers, Phase, Removal, RemovalOutcome,
};
pub use stats::Stats;
pub use variant::{GameVariant, UnknownVariant, WinRule};
