//! The explicit registries and collaborators every provider and match share

use std::sync::Arc;

use dashmap::DashMap;

use crate::combatant::{CombatantId, ScoreboardRenderer, User};
use crate::game::{ArenaCatalog, GameVariant};
use crate::matchmaking::Ranking;
use crate::notify::Notifier;
use crate::rating::RatingStore;
use crate::world::{ArenaWorld, Lobby};

/// What currently holds a combatant outside the lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// Queued, playing or spectating under a matchmaking provider
    Provider(Ranking),
    /// Roaming an open-world arena
    FreeForAll(GameVariant),
}

/// Registered combatants and what currently owns each one
#[derive(Debug, Default)]
pub struct Registry {
    users: DashMap<CombatantId, Arc<User>>,
    owners: DashMap<CombatantId, Owner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(&self, id: CombatantId) -> Option<Arc<User>> {
        self.users.get(&id).map(|u| u.clone())
    }

    pub fn is_registered(&self, id: CombatantId) -> bool {
        self.users.contains_key(&id)
    }

    pub fn register(&self, user: Arc<User>) {
        self.users.insert(user.id(), user);
    }

    pub fn unregister(&self, id: CombatantId) -> Option<Arc<User>> {
        self.owners.remove(&id);
        self.users.remove(&id).map(|(_, u)| u)
    }

    pub fn online(&self) -> usize {
        self.users.len()
    }

    pub fn assign(&self, id: CombatantId, ranking: Ranking) {
        self.owners.insert(id, Owner::Provider(ranking));
    }

    pub fn assign_free_for_all(&self, id: CombatantId, variant: GameVariant) {
        self.owners.insert(id, Owner::FreeForAll(variant));
    }

    pub fn unassign(&self, id: CombatantId) {
        self.owners.remove(&id);
    }

    /// The provider owning a combatant, if a provider owns it
    pub fn assignment(&self, id: CombatantId) -> Option<Ranking> {
        match self.owner(id)? {
            Owner::Provider(ranking) => Some(ranking),
            Owner::FreeForAll(_) => None,
        }
    }

    pub fn owner(&self, id: CombatantId) -> Option<Owner> {
        self.owners.get(&id).map(|o| *o)
    }

    /// Owned by anything at all; such combatants cannot queue, duel or spectate
    pub fn is_busy(&self, id: CombatantId) -> bool {
        self.owners.contains_key(&id)
    }
}

/// Collaborators handed to providers and matches
#[derive(Clone)]
pub struct Services {
    pub registry: Arc<Registry>,
    pub world: Arc<dyn ArenaWorld>,
    pub lobby: Arc<dyn Lobby>,
    pub scoreboard: Arc<dyn ScoreboardRenderer>,
    pub ratings: Arc<dyn RatingStore>,
    pub notifier: Arc<dyn Notifier>,
    pub arenas: Arc<ArenaCatalog>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("online", &self.registry.online())
            .field("arenas", &self.arenas.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn free_for_all_owners_are_busy_but_not_assigned() {
        let registry = Registry::new();
        let id = Uuid::new_v4();
        assert!(!registry.is_busy(id));

        registry.assign_free_for_all(id, GameVariant::Sumo);
        assert!(registry.is_busy(id));
        assert_eq!(registry.assignment(id), None);
        assert_eq!(registry.owner(id), Some(Owner::FreeForAll(GameVariant::Sumo)));

        registry.assign(id, Ranking::Ranked);
        assert_eq!(registry.assignment(id), Some(Ranking::Ranked));
        registry.unassign(id);
        assert!(!registry.is_busy(id));
    }
}
