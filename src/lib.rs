//! Water sort puzzle engine.
//!
//! Bottles hold stacks of colored units; a pour moves the top run of one
//! bottle onto an empty bottle or a matching top. The crate provides the pour
//! rules, a breadth-first solver returning shortest solutions, a seeded level
//! generator, a playable session with undo and redo, and a level catalog.

pub mod catalog;
pub mod gameplay;
pub mod generator;
pub mod model;
pub mod rng;
pub mod rules;
pub mod solver;

pub use catalog::{CatalogError, CatalogIssue, LevelCatalog, Progress};
pub use gameplay::{GameSession, SelectOutcome, SessionSnapshot};
pub use generator::{
    GeneratedLevel, GeneratorError, GeneratorParams, LevelGenerator, Strategy, generate_level,
};
pub use model::{Board, Bottle, ColorId, Difficulty, Level, MoveRecord, ParseError, Step};
pub use rules::RulesError;
pub use solver::{SearchLimits, SearchOutcome, Solver};
