use std::{fs, process};

use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use rayon::prelude::*;

use water_sort::{
    Board, Difficulty, GeneratorParams, LevelCatalog, LevelGenerator, SearchLimits, SearchOutcome,
    Solver, Strategy,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Scramble,
    Partition,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Scramble => Strategy::Scramble,
            StrategyArg::Partition => Strategy::Partition,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DifficultyArg {
    Easy,
    Medium,
    Hard,
}

impl From<DifficultyArg> for Difficulty {
    fn from(arg: DifficultyArg) -> Self {
        match arg {
            DifficultyArg::Easy => Difficulty::Easy,
            DifficultyArg::Medium => Difficulty::Medium,
            DifficultyArg::Hard => Difficulty::Hard,
        }
    }
}

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a level and print it with a solving sequence.
    Generate {
        /// Preset sizes; overrides the size flags.
        #[arg(long, value_name = "LEVEL")]
        difficulty: Option<DifficultyArg>,
        #[arg(long, default_value_t = 4)]
        colors: u16,
        #[arg(long, default_value_t = 6)]
        bottles: usize,
        #[arg(long, default_value_t = 2)]
        empty: usize,
        #[arg(long, default_value_t = 4)]
        capacity: usize,
        /// Seed for the level; random when omitted.
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, value_name = "STRATEGY", default_value = "scramble")]
        strategy: StrategyArg,
        /// Print the generated level as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Find a shortest solution, e.g. `solve "AB BA .."`.
    Solve {
        board: String,
        #[arg(long, value_name = "COUNT")]
        max_states: Option<usize>,
    },
    /// Check that every level in a JSON catalog is well formed and solvable.
    Validate {
        path: String,
        #[arg(long, value_name = "COUNT", default_value_t = 1_000_000)]
        max_states: usize,
    },
    /// Generate levels over a grid of sizes and replay every certificate.
    Sweep {
        #[arg(long, default_value_t = 8)]
        max_colors: u16,
        #[arg(long, value_name = "COUNT", default_value_t = 16)]
        seeds: u64,
        #[arg(long, value_name = "STRATEGY", default_value = "scramble")]
        strategy: StrategyArg,
    },
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    let code = match args.command {
        Command::Generate {
            difficulty,
            colors,
            bottles,
            empty,
            capacity,
            seed,
            strategy,
            json,
        } => {
            let seed = seed.unwrap_or_else(rand::random::<u64>);
            let params = match difficulty {
                Some(difficulty) => GeneratorParams::for_difficulty(difficulty.into(), seed),
                None => GeneratorParams {
                    num_colors: colors,
                    num_bottles: bottles,
                    capacity,
                    empty_bottles: empty,
                    seed,
                },
            };
            generate(&params, strategy.into(), json)
        }
        Command::Solve { board, max_states } => solve(&board, max_states),
        Command::Validate { path, max_states } => validate(&path, max_states),
        Command::Sweep {
            max_colors,
            seeds,
            strategy,
        } => sweep(max_colors, seeds, strategy.into()),
    };
    process::exit(code);
}

fn generate(params: &GeneratorParams, strategy: Strategy, json: bool) -> i32 {
    let generated = match LevelGenerator::new().with_strategy(strategy).generate(params) {
        Ok(generated) => generated,
        Err(err) => {
            eprintln!("{err}");
            return 1;
        }
    };
    if json {
        return match serde_json::to_string_pretty(&generated) {
            Ok(text) => {
                println!("{text}");
                0
            }
            Err(err) => {
                eprintln!("{err}");
                1
            }
        };
    }
    println!("Seed:");
    println!("  {}", generated.seed);
    println!();
    println!("Board:");
    println!("  {}", generated.board);
    println!();
    println!("Solution ({} pours):", generated.solution.len());
    for step in &generated.solution {
        println!("  {step}");
    }
    0
}

fn solve(text: &str, max_states: Option<usize>) -> i32 {
    let board: Board = match text.parse() {
        Ok(board) => board,
        Err(err) => {
            eprintln!("{err}");
            return 2;
        }
    };
    if let Err(err) = board.validate_invariants() {
        eprintln!("{err}");
        return 2;
    }
    let limits = SearchLimits { max_states };
    match Solver::new().with_limits(limits).search(&board) {
        SearchOutcome::Solved(steps) => {
            println!("Solved in {} pours:", steps.len());
            for step in &steps {
                println!("  {step}");
            }
            0
        }
        SearchOutcome::Unsolvable => {
            println!("unsolvable");
            1
        }
        SearchOutcome::Aborted => {
            println!("unknown: search limit reached");
            1
        }
    }
}

fn validate(path: &str, max_states: usize) -> i32 {
    let catalog = match fs::read_to_string(path)
        .map_err(|err| err.to_string())
        .and_then(|text| LevelCatalog::from_json_str(&text).map_err(|err| err.to_string()))
    {
        Ok(catalog) => catalog,
        Err(err) => {
            eprintln!("{path}: {err}");
            return 1;
        }
    };
    let issues = catalog.validate(&SearchLimits::max_states(max_states));
    for issue in &issues {
        println!("{issue}");
    }
    println!(
        "{} of {} levels ready to ship.",
        catalog.len() - issues.len(),
        catalog.len()
    );
    i32::from(!issues.is_empty())
}

fn sweep(max_colors: u16, seeds: u64, strategy: Strategy) -> i32 {
    let mut grid = Vec::new();
    for num_colors in 1..=max_colors {
        let colors = usize::from(num_colors);
        for num_bottles in colors..=colors + 3 {
            for capacity in 2..=4 {
                for empty_bottles in 0..=num_bottles - colors {
                    for seed in 0..seeds {
                        let params = GeneratorParams {
                            num_colors,
                            num_bottles,
                            capacity,
                            empty_bottles,
                            seed,
                        };
                        if params.validate().is_ok() {
                            grid.push(params);
                        }
                    }
                }
            }
        }
    }
    let generator = LevelGenerator::new().with_strategy(strategy);
    let failures: Vec<String> = grid
        .par_iter()
        .filter_map(|params| {
            let generated = match generator.generate(params) {
                Ok(generated) => generated,
                Err(err) => return Some(format!("{params:?}: {err}")),
            };
            let solves = generated
                .board
                .replay(&generated.solution)
                .is_some_and(|end| end.is_solved());
            (!solves).then(|| format!("{params:?}: certificate does not solve"))
        })
        .collect();
    for failure in &failures {
        eprintln!("{failure}");
    }
    info!("Swept {} configurations.", grid.len());
    println!("{} of {} levels verified.", grid.len() - failures.len(), grid.len());
    i32::from(!failures.is_empty())
}
