//! Seeded level generation.
//!
//! All randomness comes from [`Lcg`] seeded with [`GeneratorParams::seed`], so
//! the same parameters always produce the same level.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::model::{Board, ColorId, Difficulty, Level, MoveRecord, Step};
use crate::rng::Lcg;
use crate::solver::{SearchLimits, SearchOutcome, Solver};

/// Random walks tried from one layout before the scramble settles for it.
const EXCURSION_TRIES: usize = 32;
/// Reverse pours allowed in a single walk.
const EXCURSION_LENGTH: usize = 8;
/// Shuffles tried by the partition strategy.
const PARTITION_ATTEMPTS: usize = 32;
const PARTITION_MAX_STATES: usize = 250_000;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Reverse pours from the sorted board. Solvable by construction.
    #[default]
    Scramble,
    /// Shuffle and deal, keeping only layouts the solver confirms.
    Partition,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeneratorParams {
    pub num_colors: u16,
    pub num_bottles: usize,
    pub capacity: usize,
    pub empty_bottles: usize,
    pub seed: u64,
}

impl GeneratorParams {
    pub fn for_difficulty(difficulty: Difficulty, seed: u64) -> Self {
        let (num_colors, num_bottles) = match difficulty {
            Difficulty::Easy => (3, 5),
            Difficulty::Medium => (4, 6),
            Difficulty::Hard => (5, 7),
        };
        Self {
            num_colors,
            num_bottles,
            capacity: 4,
            empty_bottles: 2,
            seed,
        }
    }

    fn filled_bottles(&self) -> usize {
        self.num_bottles - self.empty_bottles
    }

    /// Reverse pours the scramble commits before stopping.
    pub fn scramble_budget(&self) -> usize {
        20 + 5 * usize::from(self.num_colors)
    }

    /// # Errors
    ///
    /// [`GeneratorError::InvalidParams`] when the colors cannot fill the
    /// non-empty bottles.
    pub fn validate(&self) -> Result<(), GeneratorError> {
        let invalid = |reason| Err(GeneratorError::InvalidParams { reason });
        if self.capacity == 0 {
            return invalid("capacity must be at least 1");
        }
        if self.num_colors == 0 {
            return invalid("at least one color is required");
        }
        if self.empty_bottles > self.num_bottles {
            return invalid("more empty bottles than bottles");
        }
        let colors = usize::from(self.num_colors);
        if self.filled_bottles() < colors {
            return invalid("too few non-empty bottles to hold every color");
        }
        if self.filled_bottles() > colors * self.capacity {
            return invalid("more non-empty bottles than color units");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum GeneratorError {
    #[display("invalid generator parameters: {reason}")]
    InvalidParams { reason: &'static str },
    #[display("scramble found no layout with the requested empty bottles after {tries} walks")]
    ScrambleExhausted { tries: usize },
    #[display("no solvable layout found in {attempts} shuffles")]
    NoSolvableLayout { attempts: usize },
}

/// A generated board together with a sequence of pours that solves it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedLevel {
    pub board: Board,
    /// Shortest for [`Strategy::Partition`]; for [`Strategy::Scramble`] the
    /// recorded scramble run backwards, which need not be shortest.
    pub solution: Vec<Step>,
    pub seed: u64,
    pub strategy: Strategy,
}

impl GeneratedLevel {
    pub fn into_level(self, id: u32, name: impl Into<String>, difficulty: Difficulty) -> Level {
        Level::new(id, name, difficulty, self.board)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Unpour {
    source: usize,
    target: usize,
    count: usize,
}

#[derive(Clone, Debug)]
pub struct LevelGenerator {
    strategy: Strategy,
    limits: SearchLimits,
}

impl Default for LevelGenerator {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            limits: SearchLimits::max_states(PARTITION_MAX_STATES),
        }
    }
}

impl LevelGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Search bounds for the partition strategy's solvability check.
    pub fn with_search_limits(mut self, limits: SearchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// # Errors
    ///
    /// Returns [`GeneratorError`] for invalid parameters, or when the chosen
    /// strategy cannot produce a layout within its attempt bounds.
    pub fn generate(&self, params: &GeneratorParams) -> Result<GeneratedLevel, GeneratorError> {
        params.validate()?;
        let mut rng = Lcg::new(params.seed);
        let (board, solution) = match self.strategy {
            Strategy::Scramble => Self::scramble(params, &mut rng)?,
            Strategy::Partition => self.partition(params, &mut rng)?,
        };
        debug_assert_eq!(board.len(), params.num_bottles);
        debug_assert_eq!(board.empty_bottle_count(), params.empty_bottles);
        Ok(GeneratedLevel {
            board,
            solution,
            seed: params.seed,
            strategy: self.strategy,
        })
    }

    fn scramble(
        params: &GeneratorParams,
        rng: &mut Lcg,
    ) -> Result<(Board, Vec<Step>), GeneratorError> {
        let colors = usize::from(params.num_colors);
        let mut board = Board::solved(
            params.num_colors,
            params.num_bottles - colors,
            params.capacity,
        );
        let mut restores: Vec<MoveRecord> = Vec::new();
        let mut settled = board.empty_bottle_count() == params.empty_bottles;

        while restores.len() < params.scramble_budget() {
            let Some((next, path)) = Self::excursion(&board, params.empty_bottles, rng) else {
                break;
            };
            board = next;
            restores.extend(path);
            settled = true;
        }
        if !settled {
            return Err(GeneratorError::ScrambleExhausted {
                tries: EXCURSION_TRIES,
            });
        }
        debug!(
            "Scrambled {} colors with {} reverse pours.",
            params.num_colors,
            restores.len()
        );

        let solution = restores.iter().rev().map(MoveRecord::step).collect();
        Ok((board, solution))
    }

    /// Random walk of reverse pours from `start` to another board with
    /// exactly `empty` empty bottles. Returns the board and the pours that undo
    /// the walk, in walk order.
    fn excursion(
        start: &Board,
        empty: usize,
        rng: &mut Lcg,
    ) -> Option<(Board, Vec<MoveRecord>)> {
        for _ in 0..EXCURSION_TRIES {
            let mut current = start.clone();
            let mut path = Vec::new();
            let mut last = None;
            for depth in 0..EXCURSION_LENGTH {
                let mut moves = unpour_candidates(&current, last);
                if moves.is_empty() {
                    break;
                }
                if depth > 0 {
                    let score = disorder(&current, empty);
                    let better: Vec<Unpour> = moves
                        .iter()
                        .copied()
                        .filter(|m| {
                            current
                                .unpour(m.source, m.target, m.count)
                                .is_ok_and(|(next, _)| disorder(&next, empty) < score)
                        })
                        .collect();
                    if !better.is_empty() {
                        moves = better;
                    }
                }
                let &mv = rng.pick(&moves)?;
                let Ok((next, restore)) = current.unpour(mv.source, mv.target, mv.count) else {
                    break;
                };
                current = next;
                path.push(restore);
                last = Some(mv);
                if current.empty_bottle_count() == empty && current != *start {
                    return Some((current, path));
                }
            }
        }
        None
    }

    fn partition(
        &self,
        params: &GeneratorParams,
        rng: &mut Lcg,
    ) -> Result<(Board, Vec<Step>), GeneratorError> {
        let units: Vec<ColorId> = (0..params.num_colors)
            .flat_map(|color| std::iter::repeat_n(ColorId::new(color), params.capacity))
            .collect();
        let filled = params.filled_bottles();
        let solver = Solver::new().with_limits(self.limits);

        for attempt in 0..PARTITION_ATTEMPTS {
            let mut shuffled = units.clone();
            rng.shuffle(&mut shuffled);

            let mut layers = Vec::with_capacity(params.num_bottles);
            let mut rest = shuffled.as_slice();
            for i in 0..filled {
                let size = units.len() / filled + usize::from(i < units.len() % filled);
                let (bottle, tail) = rest.split_at(size);
                layers.push(bottle.to_vec());
                rest = tail;
            }
            layers.extend(std::iter::repeat_with(Vec::new).take(params.empty_bottles));
            let board = Board::from_layers(params.capacity, layers);

            match solver.search(&board) {
                SearchOutcome::Solved(steps) => {
                    debug!("Partition accepted after {} rejected shuffles.", attempt);
                    return Ok((board, steps));
                }
                SearchOutcome::Unsolvable => debug!("Rejected unsolvable shuffle {attempt}."),
                SearchOutcome::Aborted => debug!("Rejected unconfirmed shuffle {attempt}."),
            }
        }
        Err(GeneratorError::NoSolvableLayout {
            attempts: PARTITION_ATTEMPTS,
        })
    }
}

/// Reverse pours worth taking: invertible, not a plain relocation of a sorted
/// bottle into an empty one, and not an immediate undo of `last`.
fn unpour_candidates(board: &Board, last: Option<Unpour>) -> Vec<Unpour> {
    let capacity = board.capacity();
    let mut moves = Vec::new();
    for (source, from) in board.bottles().iter().enumerate() {
        if from.is_empty() {
            continue;
        }
        let sorted = from.is_complete(capacity);
        for (target, to) in board.bottles().iter().enumerate() {
            for count in 1..=capacity {
                if !board.can_unpour(source, target, count) {
                    continue;
                }
                if sorted && count == from.len() && to.is_empty() {
                    continue;
                }
                if last.is_some_and(|l| l.source == target && l.target == source && l.count == count)
                {
                    continue;
                }
                moves.push(Unpour {
                    source,
                    target,
                    count,
                });
            }
        }
    }
    moves
}

/// Distance from a finished layout, compared gap first: how far the empty
/// bottle count is from `empty`, then how many bottles are partly filled.
fn disorder(board: &Board, empty: usize) -> (usize, usize) {
    let capacity = board.capacity();
    let partial = board
        .bottles()
        .iter()
        .filter(|b| !b.is_empty() && b.len() < capacity)
        .count();
    (board.empty_bottle_count().abs_diff(empty), partial)
}

/// Generates a board with the default strategy.
///
/// # Errors
///
/// See [`LevelGenerator::generate`].
pub fn generate_level(params: &GeneratorParams) -> Result<Board, GeneratorError> {
    LevelGenerator::new()
        .generate(params)
        .map(|generated| generated.board)
}
