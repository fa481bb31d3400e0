//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::game::ArenaCatalog;
use crate::matchmaking::ProviderSettings;
use crate::util::rate_limit::DUEL_REQUESTS_PER_MINUTE;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Bearer token guarding the admin routes
    pub admin_token: String,

    /// Directory holding arena template JSON files
    pub arena_dir: PathBuf,
    /// Rings of grid cells around the origin
    pub grid_max_radius: u32,
    /// Blocks between grid cells
    pub arena_spacing: i32,
    /// Whether unranked accepts direct duel requests
    pub unranked_duels: bool,
    pub duel_requests_per_minute: u32,

    /// Optional webhook receiving match events
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            admin_token: env::var("ADMIN_TOKEN")
                .ok()
                .filter(|t| !t.is_empty())
                .ok_or(ConfigError::Missing("ADMIN_TOKEN"))?,

            arena_dir: env::var("ARENA_DIR")
                .unwrap_or_else(|_| "assets/arenas".to_string())
                .into(),
            grid_max_radius: parse_or("GRID_MAX_RADIUS", 64)?,
            arena_spacing: parse_or("ARENA_SPACING", 1000)?,
            unranked_duels: parse_or("UNRANKED_DUELS", true)?,
            duel_requests_per_minute: parse_or(
                "DUEL_REQUESTS_PER_MINUTE",
                DUEL_REQUESTS_PER_MINUTE,
            )?,

            webhook_url: env::var("WEBHOOK_URL").ok().filter(|u| !u.is_empty()),
            webhook_secret: env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject grid settings that would place regions outside `i32` block space
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.arena_spacing <= 0 {
            return Err(ConfigError::Invalid(
                "ARENA_SPACING",
                self.arena_spacing.to_string(),
            ));
        }
        if self.grid_max_radius == 0 {
            return Err(ConfigError::Invalid(
                "GRID_MAX_RADIUS",
                self.grid_max_radius.to_string(),
            ));
        }
        // the outermost region starts at (radius + 1) * spacing and spans up to one more spacing
        let far_edge = i32::try_from(self.grid_max_radius)
            .ok()
            .and_then(|r| r.checked_add(2))
            .and_then(|r| r.checked_mul(self.arena_spacing));
        if far_edge.is_none() {
            return Err(ConfigError::Invalid(
                "GRID_MAX_RADIUS",
                format!(
                    "{} rings of {} blocks overflow the world",
                    self.grid_max_radius, self.arena_spacing
                ),
            ));
        }
        Ok(())
    }

    /// Every arena must fit inside one grid cell so neighbouring regions never overlap
    pub fn check_arena_fit(&self, arenas: &ArenaCatalog) -> Result<(), ConfigError> {
        match arenas.max_extent() {
            Some(extent) if extent > self.arena_spacing => Err(ConfigError::Invalid(
                "ARENA_SPACING",
                format!(
                    "{} is smaller than the largest arena ({extent} blocks)",
                    self.arena_spacing
                ),
            )),
            _ => Ok(()),
        }
    }

    /// Settings shared by both providers
    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            spacing: self.arena_spacing,
            duels_enabled: self.unranked_duels,
            duel_requests_per_minute: self.duel_requests_per_minute,
            ..ProviderSettings::default()
        }
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::ArenaTemplate;
    use crate::world::{Dimensions, Vec3};

    fn config() -> Config {
        Config {
            server_addr: "127.0.0.1:8080".parse().unwrap(),
            log_level: "info".to_string(),
            admin_token: "secret".to_string(),
            arena_dir: "assets/arenas".into(),
            grid_max_radius: 64,
            arena_spacing: 1000,
            unranked_duels: true,
            duel_requests_per_minute: DUEL_REQUESTS_PER_MINUTE,
            webhook_url: None,
            webhook_secret: None,
        }
    }

    // Each test uses its own variable names; the process environment is shared.

    #[test]
    fn missing_values_fall_back() {
        assert_eq!(parse_or("ARENA_TEST_UNSET_RADIUS", 64u32).unwrap(), 64);
    }

    #[test]
    fn malformed_values_are_rejected() {
        env::set_var("ARENA_TEST_BAD_SPACING", "wide");
        let err = parse_or("ARENA_TEST_BAD_SPACING", 1000i32).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("ARENA_TEST_BAD_SPACING", _)));
    }

    #[test]
    fn values_are_trimmed() {
        env::set_var("ARENA_TEST_DUELS", " false ");
        assert!(!parse_or("ARENA_TEST_DUELS", true).unwrap());
    }

    #[test]
    fn defaults_pass_validation() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn spacing_must_be_positive() {
        for spacing in [0, -1000] {
            let cfg = Config { arena_spacing: spacing, ..config() };
            assert!(matches!(cfg.validate(), Err(ConfigError::Invalid("ARENA_SPACING", _))));
        }
    }

    #[test]
    fn grid_needs_at_least_one_ring() {
        let cfg = Config { grid_max_radius: 0, ..config() };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid("GRID_MAX_RADIUS", _))));
    }

    #[test]
    fn grid_extent_must_fit_block_space() {
        let cfg = Config { grid_max_radius: 3_000_000, arena_spacing: 1000, ..config() };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid("GRID_MAX_RADIUS", _))));

        let cfg = Config { grid_max_radius: u32::MAX, ..config() };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid("GRID_MAX_RADIUS", _))));

        // largest radius whose far edge still fits
        let cfg = Config { grid_max_radius: 2_147_481, arena_spacing: 1000, ..config() };
        assert!(cfg.validate().is_ok());
        let cfg = Config { grid_max_radius: 2_147_482, arena_spacing: 1000, ..config() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn arenas_must_fit_one_cell() {
        let arenas = ArenaCatalog::from_templates([ArenaTemplate {
            name: "Wide".to_string(),
            variants: vec![crate::game::GameVariant::Sumo],
            dimensions: Dimensions { x: 120, y: 20, z: 80 },
            spawns: vec![Vec3::default(); 3],
        }])
        .unwrap();

        assert!(config().check_arena_fit(&arenas).is_ok());
        let cfg = Config { arena_spacing: 100, ..config() };
        assert!(matches!(
            cfg.check_arena_fit(&arenas),
            Err(ConfigError::Invalid("ARENA_SPACING", _))
        ));
        assert!(cfg.check_arena_fit(&ArenaCatalog::default()).is_ok());
    }
}
