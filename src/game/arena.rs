//! Arena templates and the catalog they are loaded into

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::world::{Dimensions, Vec3};

use super::GameVariant;

/// Index of the first duel spawn anchor
pub const DUEL_SPAWN_A: usize = 0;
/// Index of the shared anchor used by group matches
pub const GROUP_SPAWN: usize = 1;
/// Index of the second duel spawn anchor
pub const DUEL_SPAWN_B: usize = 2;

#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("arena {0} needs at least three spawn anchors")]
    MissingSpawns(String),
    #[error("arena {0} supports no variants")]
    NoVariants(String),
    #[error("duplicate arena name: {0}")]
    Duplicate(String),
}

/// Authored arena content. Spawn anchors are relative to the region origin.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArenaTemplate {
    pub name: String,
    pub variants: Vec<GameVariant>,
    pub dimensions: Dimensions,
    pub spawns: Vec<Vec3>,
}

impl ArenaTemplate {
    pub fn supports(&self, variant: GameVariant) -> bool {
        self.variants.contains(&variant)
    }

    pub fn spawn(&self, index: usize) -> Vec3 {
        self.spawns.get(index).copied().unwrap_or_default()
    }

    fn validate(&self) -> Result<(), ArenaError> {
        if self.spawns.len() <= DUEL_SPAWN_B {
            return Err(ArenaError::MissingSpawns(self.name.clone()));
        }
        if self.variants.is_empty() {
            return Err(ArenaError::NoVariants(self.name.clone()));
        }
        Ok(())
    }
}

/// Every arena the server knows about, indexed by variant
#[derive(Debug, Default)]
pub struct ArenaCatalog {
    arenas: Vec<Arc<ArenaTemplate>>,
    by_variant: HashMap<GameVariant, Vec<Arc<ArenaTemplate>>>,
}

impl ArenaCatalog {
    pub fn from_templates(
        templates: impl IntoIterator<Item = ArenaTemplate>,
    ) -> Result<Self, ArenaError> {
        let mut catalog = Self::default();
        for template in templates {
            catalog.insert(template)?;
        }
        Ok(catalog)
    }

    /// Load every `*.json` file in `dir`. A missing directory yields an empty catalog.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, ArenaError> {
        let dir = dir.as_ref();
        let mut catalog = Self::default();

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(dir = %dir.display(), "Arena directory missing, catalog is empty");
                return Ok(catalog);
            }
            Err(source) => {
                return Err(ArenaError::Io {
                    path: dir.to_path_buf(),
                    source,
                })
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        for path in paths {
            let raw = std::fs::read_to_string(&path).map_err(|source| ArenaError::Io {
                path: path.clone(),
                source,
            })?;
            let template: ArenaTemplate =
                serde_json::from_str(&raw).map_err(|source| ArenaError::Parse {
                    path: path.clone(),
                    source,
                })?;
            debug!(arena = %template.name, path = %path.display(), "Loaded arena");
            catalog.insert(template)?;
        }

        info!(arenas = catalog.len(), "Arena catalog loaded");
        Ok(catalog)
    }

    fn insert(&mut self, template: ArenaTemplate) -> Result<(), ArenaError> {
        template.validate()?;
        if self.by_name(&template.name).is_some() {
            return Err(ArenaError::Duplicate(template.name));
        }
        let template = Arc::new(template);
        for variant in &template.variants {
            self.by_variant
                .entry(*variant)
                .or_default()
                .push(template.clone());
        }
        self.arenas.push(template);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.arenas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arenas.is_empty()
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<ArenaTemplate>> {
        self.arenas
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn for_variant(&self, variant: GameVariant) -> &[Arc<ArenaTemplate>] {
        self.by_variant
            .get(&variant)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Largest horizontal footprint of any arena, if any are loaded
    pub fn max_extent(&self) -> Option<i32> {
        self.arenas
            .iter()
            .map(|a| a.dimensions.x.max(a.dimensions.z))
            .max()
    }

    /// Pick a random arena supporting `variant`
    pub fn random<R: Rng + ?Sized>(
        &self,
        variant: GameVariant,
        rng: &mut R,
    ) -> Option<Arc<ArenaTemplate>> {
        self.for_variant(variant).choose(rng).cloned()
    }
}
