//! Per-combatant match statistics

use serde::Serialize;

use crate::combatant::ItemStack;

/// What one combatant did during a match
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub hits: u32,
    pub damage: f64,
    /// Inventory at the moment the match ended
    pub items: Vec<ItemStack>,
}
