//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{keyed::DefaultKeyedStateStore, InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::hash::Hash;
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::combatant::CombatantId;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Per-key rate limiter
pub type KeyedLimiter<K> = RateLimiter<K, DefaultKeyedStateStore<K>, DefaultClock>;

/// Duel requests a combatant may send per minute
pub const DUEL_REQUESTS_PER_MINUTE: u32 = 6;

/// Admin stop requests per second
pub const ADMIN_RATE_LIMIT: u32 = 5;

fn non_zero(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
}

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    Arc::new(RateLimiter::direct(Quota::per_second(non_zero(requests_per_second))))
}

/// Create a keyed rate limiter with the specified requests per minute
pub fn create_keyed_limiter<K: Hash + Eq + Clone>(requests_per_minute: u32) -> Arc<KeyedLimiter<K>> {
    Arc::new(RateLimiter::keyed(Quota::per_minute(non_zero(requests_per_minute))))
}

/// Throttles duel requests per requester
#[derive(Clone)]
pub struct DuelRateLimiter {
    limiter: Arc<KeyedLimiter<CombatantId>>,
}

impl DuelRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            limiter: create_keyed_limiter(requests_per_minute),
        }
    }

    /// Check if another request is allowed (returns true if allowed)
    pub fn check(&self, requester: CombatantId) -> bool {
        self.limiter.check_key(&requester).is_ok()
    }
}

impl Default for DuelRateLimiter {
    fn default() -> Self {
        Self::new(DUEL_REQUESTS_PER_MINUTE)
    }
}

impl std::fmt::Debug for DuelRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuelRateLimiter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn keyed_limits_are_per_requester() {
        let limiter = DuelRateLimiter::new(2);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(limiter.check(a));
        assert!(limiter.check(a));
        assert!(!limiter.check(a));
        assert!(limiter.check(b));
    }

    #[test]
    fn zero_quota_still_allows_one() {
        let limiter = create_limiter(0);
        assert!(limiter.check().is_ok());
    }
}
