//! Rating engine: bracketed gain/loss tables and ranked settlement

pub mod store;

pub use store::{MemoryRatingStore, RatingStore};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::game::GameVariant;

/// Rating every combatant starts with, globally and per variant
pub const DEFAULT_RATING: i32 = 1000;

/// Smallest and largest delta a single match can move a rating by
pub const MIN_DELTA: i32 = 1;
pub const MAX_DELTA: i32 = 30;

/// Long-lived rating and win/loss record of a combatant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub rating: i32,
    /// Keyed by variant slug
    pub variant_ratings: BTreeMap<String, i32>,
    pub ranked_wins: u32,
    pub ranked_losses: u32,
    pub unranked_wins: u32,
    pub unranked_losses: u32,
}

impl Default for RatingRecord {
    fn default() -> Self {
        Self {
            rating: DEFAULT_RATING,
            variant_ratings: GameVariant::ALL
                .iter()
                .map(|v| (v.slug().to_string(), DEFAULT_RATING))
                .collect(),
            ranked_wins: 0,
            ranked_losses: 0,
            unranked_wins: 0,
            unranked_losses: 0,
        }
    }
}

impl RatingRecord {
    pub fn variant_rating(&self, variant: GameVariant) -> i32 {
        self.variant_ratings
            .get(variant.slug())
            .copied()
            .unwrap_or(DEFAULT_RATING)
    }

    pub fn set_variant_rating(&mut self, variant: GameVariant, rating: i32) {
        self.variant_ratings.insert(variant.slug().to_string(), rating);
    }
}

/// Rating change produced by one ranked result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RatingChange {
    /// Variant ratings before the match
    pub winner_before: i32,
    pub loser_before: i32,
    pub gained: i32,
    pub lost: i32,
}

/// Rating a winner earns for beating `loser`.
pub fn gain(winner: i32, loser: i32) -> i32 {
    let base = match winner {
        r if r < 1000 => 23,
        r if r < 1100 => 17,
        r if r < 1200 => 16,
        r if r < 1300 => 14,
        r if r < 1400 => 13,
        r if r < 1500 => 12,
        r if r < 1600 => 11,
        r if r < 1700 => 10,
        r if r < 1800 => 9,
        r if r < 1900 => 8,
        r if r < 2000 => 7,
        _ => 6,
    };

    let band = diff_band(winner, loser);
    let adjust = if winner < loser {
        // upset: +2 per band, capped at +12
        [0, 2, 4, 6, 8, 10, 12][band.min(6)]
    } else if winner > loser {
        [0, -4, -6, -8, -10, -12, -14][band.min(6)]
    } else {
        0
    };

    (base + adjust).clamp(MIN_DELTA, MAX_DELTA)
}

/// Rating a loser gives up for losing to `winner`.
pub fn loss(loser: i32, winner: i32) -> i32 {
    let base = match loser {
        r if r < 1000 => 7,
        r if r < 1200 => 17,
        r if r < 1400 => 18,
        r if r < 1600 => 19,
        r if r < 1800 => 20,
        r if r < 2000 => 21,
        r if r < 2200 => 22,
        _ => 25,
    };

    let band = diff_band(loser, winner).min(5);
    let adjust = if loser < winner {
        [0, -2, -4, -6, -8, -10][band]
    } else if loser > winner {
        [0, 2, 4, 6, 8, 10][band]
    } else {
        0
    };

    (base + adjust).clamp(MIN_DELTA, MAX_DELTA)
}

/// Index of the 50-point band the absolute difference falls in
fn diff_band(a: i32, b: i32) -> usize {
    ((a as i64 - b as i64).unsigned_abs() / 50) as usize
}

/// Apply a ranked result to both records. Global and variant ratings move by
/// the same delta and never drop below zero.
pub fn settle_ranked(
    variant: GameVariant,
    winner: &mut RatingRecord,
    loser: &mut RatingRecord,
) -> RatingChange {
    let winner_before = winner.variant_rating(variant);
    let loser_before = loser.variant_rating(variant);
    let gained = gain(winner_before, loser_before);
    let lost = loss(loser_before, winner_before);

    winner.ranked_wins += 1;
    winner.rating = (winner.rating + gained).max(0);
    winner.set_variant_rating(variant, (winner_before + gained).max(0));

    loser.ranked_losses += 1;
    loser.rating = (loser.rating - lost).max(0);
    loser.set_variant_rating(variant, (loser_before - lost).max(0));

    RatingChange {
        winner_before,
        loser_before,
        gained,
        lost,
    }
}

/// Apply an unranked result: counters only
pub fn settle_unranked(winner: &mut RatingRecord, loser: &mut RatingRecord) {
    winner.unranked_wins += 1;
    loser.unranked_losses += 1;
}
