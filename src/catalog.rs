use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::generator::{GeneratorError, GeneratorParams, LevelGenerator};
use crate::model::{Difficulty, Level};
use crate::rules::RulesError;
use crate::solver::{SearchLimits, SearchOutcome, Solver};

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum CatalogError {
    #[display("malformed catalog JSON: {_0}")]
    Json(#[from] serde_json::Error),
    #[display("level id {id} appears more than once")]
    DuplicateId { id: u32 },
    #[display("level {id} is malformed: {reason}")]
    InvalidLevel { id: u32, reason: RulesError },
}

/// Reason a level may not ship.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::IsVariant)]
pub enum CatalogIssue {
    #[display("level {id}: {error}")]
    Invalid { id: u32, error: RulesError },
    #[display("level {id}: unsolvable")]
    Unsolvable { id: u32 },
    #[display("level {id}: solvability not confirmed within the search limit")]
    Unconfirmed { id: u32 },
}

impl CatalogIssue {
    pub fn level_id(&self) -> u32 {
        match self {
            CatalogIssue::Invalid { id, .. }
            | CatalogIssue::Unsolvable { id }
            | CatalogIssue::Unconfirmed { id } => *id,
        }
    }
}

/// Levels ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelCatalog {
    levels: BTreeMap<u32, Level>,
}

impl LevelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `level`, returning the level it replaced under the same id.
    pub fn insert(&mut self, level: Level) -> Option<Level> {
        self.levels.insert(level.id, level)
    }

    pub fn get(&self, id: u32) -> Option<&Level> {
        self.levels.get(&id)
    }

    pub fn first(&self) -> Option<&Level> {
        self.levels.values().next()
    }

    /// The level played after `id`.
    pub fn next_after(&self, id: u32) -> Option<&Level> {
        self.levels
            .range((Bound::Excluded(id), Bound::Unbounded))
            .next()
            .map(|(_, level)| level)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Level> {
        self.levels.values()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Parses a JSON array of levels.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON, a repeated id, or a board that breaks the
    /// engine's invariants.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let levels: Vec<Level> = serde_json::from_str(json)?;
        let mut catalog = Self::new();
        for level in levels {
            level
                .board
                .validate_invariants()
                .map_err(|reason| CatalogError::InvalidLevel {
                    id: level.id,
                    reason,
                })?;
            let id = level.id;
            if catalog.insert(level).is_some() {
                return Err(CatalogError::DuplicateId { id });
            }
        }
        info!("Loaded {} levels.", catalog.len());
        Ok(catalog)
    }

    /// # Errors
    ///
    /// Only if serialization itself fails.
    pub fn to_json_string(&self) -> Result<String, CatalogError> {
        let levels: Vec<&Level> = self.iter().collect();
        Ok(serde_json::to_string_pretty(&levels)?)
    }

    /// One freshly generated level per difficulty, ids starting at 1.
    ///
    /// # Errors
    ///
    /// Propagates the first generator failure.
    pub fn generated(seed: u64) -> Result<Self, GeneratorError> {
        let generator = LevelGenerator::new();
        let mut catalog = Self::new();
        for (id, difficulty) in (1..).zip(Difficulty::ALL) {
            let level_seed = seed.wrapping_add(u64::from(id));
            let params = GeneratorParams::for_difficulty(difficulty, level_seed);
            let generated = generator.generate(&params)?;
            let name = format!("{difficulty} #{level_seed}");
            catalog.insert(generated.into_level(id, name, difficulty));
        }
        Ok(catalog)
    }

    /// Checks every level, searching in parallel. Levels without an issue are
    /// safe to ship.
    pub fn validate(&self, limits: &SearchLimits) -> Vec<CatalogIssue> {
        let solver = Solver::new().with_limits(*limits);
        let levels: Vec<&Level> = self.iter().collect();
        let issues: Vec<CatalogIssue> = levels
            .par_iter()
            .filter_map(|level| Self::check_level(&solver, level))
            .collect();
        for issue in &issues {
            warn!("{issue}");
        }
        issues
    }

    fn check_level(solver: &Solver, level: &Level) -> Option<CatalogIssue> {
        let id = level.id;
        if let Err(error) = level.board.validate_invariants() {
            return Some(CatalogIssue::Invalid { id, error });
        }
        match solver.search(&level.board) {
            SearchOutcome::Solved(_) => None,
            SearchOutcome::Unsolvable => Some(CatalogIssue::Unsolvable { id }),
            SearchOutcome::Aborted => Some(CatalogIssue::Unconfirmed { id }),
        }
    }
}

/// Which levels a player may open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub unlocked: BTreeSet<u32>,
}

impl Progress {
    /// Fresh progress with only the catalog's first level open.
    pub fn new(catalog: &LevelCatalog) -> Self {
        Self {
            unlocked: catalog.first().map(|level| level.id).into_iter().collect(),
        }
    }

    pub fn is_unlocked(&self, id: u32) -> bool {
        self.unlocked.contains(&id)
    }

    /// Records a finished level and unlocks its successor, returning the
    /// successor's id when it was newly unlocked.
    pub fn complete(&mut self, id: u32, catalog: &LevelCatalog) -> Option<u32> {
        if !self.is_unlocked(id) {
            warn!("Ignoring completion of locked level {id}.");
            return None;
        }
        let next = catalog.next_after(id)?.id;
        self.unlocked.insert(next).then_some(next)
    }
}
