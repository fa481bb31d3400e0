//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::matchmaking::MatchmakingService;
use crate::util::rate_limit::{create_limiter, Limiter, ADMIN_RATE_LIMIT};

use super::Services;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub matchmaking: Arc<MatchmakingService>,
    /// Throttles admin mutations
    pub admin_limiter: Arc<Limiter>,
}

impl AppState {
    pub fn new(config: Config, services: Services) -> Self {
        let matchmaking = Arc::new(MatchmakingService::new(
            services,
            config.grid_max_radius,
            config.provider_settings(),
        ));

        Self {
            config: Arc::new(config),
            matchmaking,
            admin_limiter: create_limiter(ADMIN_RATE_LIMIT),
        }
    }
}
