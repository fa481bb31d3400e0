//! The pairing rule shared by both providers

use crate::combatant::{CombatantId, DeviceClass};

use super::window::{PingWindow, RatingWindow};

/// Everything the matching rule needs to know about one queued combatant,
/// captured at the moment of the scan.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub id: CombatantId,
    pub ping: i64,
    pub device: DeviceClass,
    pub rating: i64,
    pub ping_window: PingWindow,
    pub rating_window: RatingWindow,
    pub accepted_devices: Vec<DeviceClass>,
    pub recent_opponent: Option<CombatantId>,
}

/// Base compatibility: distinct, not recent opponents, ping and device
/// acceptable in both directions.
pub fn can_match(a: &MatchCandidate, b: &MatchCandidate) -> bool {
    if a.id == b.id {
        return false;
    }
    if a.recent_opponent == Some(b.id) || b.recent_opponent == Some(a.id) {
        return false;
    }
    a.ping_window.contains(b.ping)
        && b.ping_window.contains(a.ping)
        && a.accepted_devices.contains(&b.device)
        && b.accepted_devices.contains(&a.device)
}

/// Ranked compatibility additionally gates on the rating windows
pub fn can_match_ranked(a: &MatchCandidate, b: &MatchCandidate) -> bool {
    can_match(a, b) && a.rating_window.contains(b.rating) && b.rating_window.contains(a.rating)
}
