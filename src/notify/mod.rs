//! Outbound, fire-and-forget notifications about queue and match activity

pub mod webhook;

pub use webhook::WebhookNotifier;

use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::combatant::CombatantId;
use crate::game::GameVariant;
use crate::matchmaking::Ranking;

/// Something worth telling the outside world about
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MatchEvent {
    QueueEntered {
        combatant: CombatantId,
        name: String,
        variant: GameVariant,
        ranking: Ranking,
    },
    MatchStarted {
        match_id: Uuid,
        variant: GameVariant,
        ranking: Ranking,
        arena: String,
        combatants: Vec<String>,
    },
    MatchEnded {
        match_id: Uuid,
        variant: GameVariant,
        ranking: Ranking,
        /// `None` when the match was stopped without a result
        winner: Option<String>,
        duration_secs: u64,
    },
    RatingChanged {
        match_id: Uuid,
        variant: GameVariant,
        winner: String,
        loser: String,
        winner_rating: i32,
        loser_rating: i32,
        gained: i32,
        lost: i32,
    },
}

impl MatchEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            MatchEvent::QueueEntered { .. } => "queue_entered",
            MatchEvent::MatchStarted { .. } => "match_started",
            MatchEvent::MatchEnded { .. } => "match_ended",
            MatchEvent::RatingChanged { .. } => "rating_changed",
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("endpoint returned {0}")]
    Status(reqwest::StatusCode),
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid signing key")]
    InvalidKey,
}

/// Receives events. Must never block and never fail back into the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: MatchEvent);
}

/// Writes every event to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: MatchEvent) {
        match &event {
            MatchEvent::RatingChanged {
                match_id,
                winner,
                loser,
                gained,
                lost,
                ..
            } => info!(
                match_id = %match_id,
                winner = %winner,
                loser = %loser,
                gained,
                lost,
                "Ratings changed"
            ),
            other => info!(event = other.kind(), payload = ?other, "Match event"),
        }
    }
}
