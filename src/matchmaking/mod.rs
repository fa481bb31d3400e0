//! Queueing, pairing and duel requests

pub mod compat;
mod duel;
pub mod provider;
pub mod queue;
pub mod service;
pub mod window;

pub use compat::{can_match, can_match_ranked, MatchCandidate};
pub use duel::DuelRequest;
pub use provider::{Provider, ProviderSettings, ProviderStats};
pub use service::MatchmakingService;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::{GameVariant, MatchError};

/// Which provider a queue or match belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ranking {
    Ranked,
    Unranked,
}

impl Ranking {
    pub fn label(self) -> &'static str {
        match self {
            Ranking::Ranked => "Ranked",
            Ranking::Unranked => "Unranked",
        }
    }

    pub fn is_ranked(self) -> bool {
        self == Ranking::Ranked
    }
}

impl fmt::Display for Ranking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Ranking {
    type Err = MatchmakingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ranked" => Ok(Ranking::Ranked),
            "unranked" => Ok(Ranking::Unranked),
            _ => Err(MatchmakingError::UnknownRanking(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum MatchmakingError {
    #[error("no free arena cell left on the grid")]
    GridExhausted,
    #[error("no arena supports {0}")]
    NoArena(GameVariant),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("{0} queues do not take duel requests")]
    DuelsUnsupported(Ranking),
    #[error("cannot duel yourself")]
    SelfDuel,
    #[error("combatant is not registered")]
    NotRegistered,
    #[error("combatant is busy")]
    Busy,
    #[error("no pending duel request")]
    NoPendingDuel,
    #[error("too many duel requests, slow down")]
    RateLimited,
    #[error("unknown ranking: {0}")]
    UnknownRanking(String),
}
