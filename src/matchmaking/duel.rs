//! Direct duel requests between two combatants

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::combatant::{ping_of, CombatantId, User};
use crate::game::{ArenaTemplate, GameVariant, Match};

use super::provider::Provider;
use super::{MatchmakingError, Ranking};

/// How long a request stays open
pub const DUEL_REQUEST_TTL: Duration = Duration::from_secs(30);

/// A pending challenge from one combatant to another
#[derive(Debug, Clone)]
pub struct DuelRequest {
    pub id: Uuid,
    pub from: Arc<User>,
    pub to: Arc<User>,
    pub variant: GameVariant,
    pub arena: Option<Arc<ArenaTemplate>>,
    /// Stops the expiry timer
    pub(super) cancel: CancellationToken,
}

impl DuelRequest {
    fn involves(&self, id: CombatantId) -> bool {
        self.from.id() == id || self.to.id() == id
    }
}

impl Provider {
    /// Challenge `to` to a duel. A newer request to the same target replaces
    /// the pending one.
    pub fn request_duel(
        &self,
        variant: GameVariant,
        arena: Option<Arc<ArenaTemplate>>,
        from: &Arc<User>,
        to: &Arc<User>,
    ) -> Result<Uuid, MatchmakingError> {
        if self.ranking() != Ranking::Unranked || !self.settings.duels_enabled {
            return Err(MatchmakingError::DuelsUnsupported(self.ranking()));
        }
        if from.id() == to.id() {
            return Err(MatchmakingError::SelfDuel);
        }
        let registry = &self.services.registry;
        if !registry.is_registered(from.id()) || !registry.is_registered(to.id()) {
            return Err(MatchmakingError::NotRegistered);
        }
        if registry.is_busy(from.id()) || registry.is_busy(to.id()) {
            return Err(MatchmakingError::Busy);
        }
        if !self.duel_limiter.check(from.id()) {
            return Err(MatchmakingError::RateLimited);
        }

        let request = DuelRequest {
            id: Uuid::new_v4(),
            from: from.clone(),
            to: to.clone(),
            variant,
            arena,
            cancel: CancellationToken::new(),
        };
        self.spawn_expiry(to.id(), request.id, request.cancel.clone());

        let replaced = self.state.lock().duels.insert(to.id(), request.clone());
        if let Some(old) = replaced {
            old.cancel.cancel();
            debug!(request = %old.id, "Duel request replaced");
        }

        from.handle().message(
            "duel.request",
            &[variant.name().into(), to.display_name().into()],
        );
        to.handle().message(
            "duel.requested",
            &[
                from.display_name().into(),
                ping_of(from.handle().as_ref()).into(),
                variant.name().into(),
            ],
        );
        info!(request = %request.id, from = %from.id(), to = %to.id(), variant = %variant, "Duel requested");
        Ok(request.id)
    }

    /// Accept the request pending for `target`. Every other request from or
    /// to either party is dropped and an unrated duel starts.
    pub fn accept_duel(&self, target: CombatantId) -> Result<Arc<Match>, MatchmakingError> {
        let (request, dropped) = {
            let mut state = self.state.lock();
            let request = state
                .duels
                .remove(&target)
                .ok_or(MatchmakingError::NoPendingDuel)?;
            let (a, b) = (request.from.id(), request.to.id());
            let mut dropped = Vec::new();
            state.duels.retain(|_, other| {
                let keep = !other.involves(a) && !other.involves(b);
                if !keep {
                    dropped.push(other.cancel.clone());
                }
                keep
            });
            (request, dropped)
        };
        request.cancel.cancel();
        for cancel in dropped {
            cancel.cancel();
        }

        let (from, to) = (&request.from, &request.to);
        let registry = &self.services.registry;
        if !registry.is_registered(from.id()) || !registry.is_registered(to.id()) {
            return Err(MatchmakingError::NotRegistered);
        }
        if registry.is_busy(from.id()) || registry.is_busy(to.id()) {
            return Err(MatchmakingError::Busy);
        }

        from.handle().message("duel.accepted", &[to.display_name().into()]);
        to.handle().message("duel.accept", &[from.display_name().into()]);
        info!(request = %request.id, "Duel accepted");
        self.start_match(
            request.variant,
            request.arena.clone(),
            vec![from.clone(), to.clone()],
            false,
        )
    }

    /// Decline the request pending for `target`
    pub fn decline_duel(&self, target: CombatantId) -> bool {
        let Some(request) = self.state.lock().duels.remove(&target) else {
            return false;
        };
        request.cancel.cancel();
        request
            .from
            .handle()
            .message("duel.declined", &[request.to.display_name().into()]);
        request
            .to
            .handle()
            .message("duel.decline", &[request.from.display_name().into()]);
        true
    }

    pub fn remove_request_to(&self, target: CombatantId) {
        if let Some(request) = self.state.lock().duels.remove(&target) {
            request.cancel.cancel();
        }
    }

    pub fn remove_requests_from(&self, from: CombatantId) {
        self.state.lock().duels.retain(|_, r| {
            if r.from.id() == from {
                r.cancel.cancel();
                return false;
            }
            true
        });
    }

    pub fn pending_duel(&self, target: CombatantId) -> Option<DuelRequest> {
        self.state.lock().duels.get(&target).cloned()
    }

    fn spawn_expiry(&self, target: CombatantId, id: Uuid, cancel: CancellationToken) {
        let me = self.me.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(DUEL_REQUEST_TTL) => {
                    if let Some(provider) = me.upgrade() {
                        provider.expire_duel(target, id);
                    }
                }
            }
        });
    }

    /// Drop the request for `target` if it is still the one identified by `id`
    fn expire_duel(&self, target: CombatantId, id: Uuid) {
        let request = {
            let mut state = self.state.lock();
            let current = state.duels.get(&target).is_some_and(|r| r.id == id);
            if current {
                state.duels.remove(&target)
            } else {
                None
            }
        };
        let Some(request) = request else {
            return;
        };
        let registry = &self.services.registry;
        if !registry.is_registered(request.from.id()) || !registry.is_registered(request.to.id()) {
            return;
        }
        request
            .to
            .handle()
            .message("duel.expired", &[request.from.display_name().into()]);
        request
            .from
            .handle()
            .message("duel.expire", &[request.to.display_name().into()]);
        debug!(request = %id, "Duel request expired");
    }
}
