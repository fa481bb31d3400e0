//! Per-variant holding queues

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::combatant::{CombatantId, User};
use crate::game::GameVariant;

/// A combatant waiting in a variant queue
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub user: Arc<User>,
    pub variant: GameVariant,
    /// Stops the combatant's queue task
    pub cancel: CancellationToken,
}

impl QueueEntry {
    pub fn id(&self) -> CombatantId {
        self.user.id()
    }
}

/// Ordered queues, one per variant. A combatant sits in at most one queue.
#[derive(Debug, Default)]
pub struct QueueBook {
    queues: HashMap<GameVariant, Vec<QueueEntry>>,
}

impl QueueBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a combatant. Returns the token for its queue task, or `None`
    /// when it is already queued.
    pub fn enqueue(&mut self, variant: GameVariant, user: Arc<User>) -> Option<CancellationToken> {
        if self.variant_of(user.id()).is_some() {
            return None;
        }
        let cancel = CancellationToken::new();
        self.queues.entry(variant).or_default().push(QueueEntry {
            user,
            variant,
            cancel: cancel.clone(),
        });
        Some(cancel)
    }

    /// Remove a combatant and cancel its queue task
    pub fn dequeue(&mut self, id: CombatantId) -> Option<QueueEntry> {
        for queue in self.queues.values_mut() {
            if let Some(pos) = queue.iter().position(|e| e.id() == id) {
                let entry = queue.remove(pos);
                entry.cancel.cancel();
                return Some(entry);
            }
        }
        None
    }

    pub fn contains(&self, variant: GameVariant, id: CombatantId) -> bool {
        self.queues
            .get(&variant)
            .is_some_and(|q| q.iter().any(|e| e.id() == id))
    }

    pub fn variant_of(&self, id: CombatantId) -> Option<GameVariant> {
        self.queues
            .iter()
            .find(|(_, q)| q.iter().any(|e| e.id() == id))
            .map(|(v, _)| *v)
    }

    /// Queue members in queue order
    pub fn users(&self, variant: GameVariant) -> Vec<Arc<User>> {
        self.queues
            .get(&variant)
            .map(|q| q.iter().map(|e| e.user.clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self, variant: GameVariant) -> usize {
        self.queues.get(&variant).map_or(0, Vec::len)
    }

    pub fn total(&self) -> usize {
        self.queues.values().map(Vec::len).sum()
    }

    /// Empty every queue, cancelling all tasks
    pub fn drain(&mut self) -> Vec<QueueEntry> {
        let entries: Vec<QueueEntry> = self.queues.drain().flat_map(|(_, q)| q).collect();
        for e in &entries {
            e.cancel.cancel();
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{user_with, MockCombatant};

    #[tokio::test]
    async fn enqueue_keeps_order_and_rejects_duplicates() {
        let mut book = QueueBook::new();
        let a = user_with(&MockCombatant::new("a"), 1000, None);
        let b = user_with(&MockCombatant::new("b"), 1000, None);

        assert!(book.enqueue(GameVariant::Sumo, a.clone()).is_some());
        assert!(book.enqueue(GameVariant::Sumo, b.clone()).is_some());
        assert!(book.enqueue(GameVariant::Gapple, a.clone()).is_none());

        let order: Vec<_> = book.users(GameVariant::Sumo).iter().map(|u| u.id()).collect();
        assert_eq!(order, vec![a.id(), b.id()]);
        assert_eq!(book.variant_of(b.id()), Some(GameVariant::Sumo));
        assert_eq!(book.len(GameVariant::Gapple), 0);
        assert_eq!(book.total(), 2);
    }

    #[tokio::test]
    async fn dequeue_cancels_the_task_token() {
        let mut book = QueueBook::new();
        let a = user_with(&MockCombatant::new("a"), 1000, None);
        let token = book.enqueue(GameVariant::Combo, a.clone()).unwrap();

        let entry = book.dequeue(a.id()).unwrap();
        assert_eq!(entry.variant, GameVariant::Combo);
        assert!(token.is_cancelled());
        assert!(!book.contains(GameVariant::Combo, a.id()));
        assert!(book.dequeue(a.id()).is_none());
    }

    #[tokio::test]
    async fn drain_empties_everything() {
        let mut book = QueueBook::new();
        let a = user_with(&MockCombatant::new("a"), 1000, None);
        let b = user_with(&MockCombatant::new("b"), 1000, None);
        let ta = book.enqueue(GameVariant::Combo, a).unwrap();
        let tb = book.enqueue(GameVariant::Soup, b).unwrap();

        assert_eq!(book.drain().len(), 2);
        assert!(ta.is_cancelled() && tb.is_cancelled());
        assert_eq!(book.total(), 0);
    }
}
