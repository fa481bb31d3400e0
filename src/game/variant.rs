//! The catalog of supported game variants

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::combatant::Loadout;

/// How a variant decides its winner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinRule {
    /// Last combatant standing
    Elimination,
    /// First to land this many hits
    Hits(u32),
    /// First to win this many rounds
    Rounds(u32),
}

/// A game mode with its own ruleset and loadout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameVariant {
    #[serde(rename = "nodebuff")]
    NoDebuff,
    Debuff,
    Gapple,
    Soup,
    Boxing,
    StickFight,
    Sumo,
    Combo,
    #[serde(rename = "builduhc")]
    BuildUhc,
}

impl GameVariant {
    pub const ALL: [GameVariant; 9] = [
        GameVariant::NoDebuff,
        GameVariant::Debuff,
        GameVariant::Gapple,
        GameVariant::Soup,
        GameVariant::Boxing,
        GameVariant::StickFight,
        GameVariant::Sumo,
        GameVariant::Combo,
        GameVariant::BuildUhc,
    ];

    pub fn id(self) -> u8 {
        match self {
            GameVariant::NoDebuff => 0,
            GameVariant::Debuff => 1,
            GameVariant::Gapple => 2,
            GameVariant::Soup => 3,
            GameVariant::Boxing => 4,
            GameVariant::StickFight => 5,
            GameVariant::Sumo => 6,
            GameVariant::Combo => 7,
            GameVariant::BuildUhc => 8,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.id() == id)
    }

    /// Human readable name
    pub fn name(self) -> &'static str {
        match self {
            GameVariant::NoDebuff => "NoDebuff",
            GameVariant::Debuff => "Debuff",
            GameVariant::Gapple => "Gapple",
            GameVariant::Soup => "Soup",
            GameVariant::Boxing => "Boxing",
            GameVariant::StickFight => "Stick Fight",
            GameVariant::Sumo => "Sumo",
            GameVariant::Combo => "Combo",
            GameVariant::BuildUhc => "BuildUHC",
        }
    }

    /// Stable key for per-variant ratings and arena files
    pub fn slug(self) -> &'static str {
        match self {
            GameVariant::NoDebuff => "nodebuff",
            GameVariant::Debuff => "debuff",
            GameVariant::Gapple => "gapple",
            GameVariant::Soup => "soup",
            GameVariant::Boxing => "boxing",
            GameVariant::StickFight => "stick_fight",
            GameVariant::Sumo => "sumo",
            GameVariant::Combo => "combo",
            GameVariant::BuildUhc => "builduhc",
        }
    }

    pub fn loadout(self) -> Loadout {
        Loadout::Combat(self)
    }

    /// Player cap of the open-world arena, for variants that have one
    pub fn capacity(self) -> Option<usize> {
        match self {
            GameVariant::NoDebuff => Some(60),
            GameVariant::Sumo => Some(30),
            _ => None,
        }
    }

    pub fn free_for_all(self) -> bool {
        self.capacity().is_some()
    }

    pub fn win_rule(self) -> WinRule {
        match self {
            GameVariant::Boxing => WinRule::Hits(100),
            GameVariant::StickFight | GameVariant::Sumo => WinRule::Rounds(3),
            _ => WinRule::Elimination,
        }
    }
}

impl fmt::Display for GameVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown game variant: {0}")]
pub struct UnknownVariant(pub String);

impl FromStr for GameVariant {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace(' ', "_");
        Self::ALL
            .into_iter()
            .find(|v| v.slug() == key || v.name().to_ascii_lowercase() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}
