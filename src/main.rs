//! `chils` binary: runs the independent set or hitting set search on a graph file.
//!
//! # Usage
//!
//! ```bash
//! chils mwis graph.metis --time-limit 60 --population 8
//! chils hs instance.hgr --time-limit 60 --anneal-time 10
//! ```
//!
//! SIGTERM and SIGINT stop the search early; the best solution found so far is
//! still verified and printed.

use chils::hitting::HubRestartConfig;
use chils::prelude::*;
use clap::{Args, Parser, Subcommand};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "chils", version, about = "Local search for weighted independent set and hitting set", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Maximum weight independent set on a METIS graph.
    Mwis {
        /// METIS graph file.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Number of cooperating replicas; 1 runs a single replica without CHILS.
        #[arg(short, long, default_value_t = 8)]
        population: usize,

        /// Seconds each replica explores the full graph per round.
        #[arg(long, default_value_t = 2.0)]
        step_time: f64,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Minimum hitting set on a PACE `hs` or `ds` instance.
    Hs {
        /// PACE instance file.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Seconds of simulated annealing before local search (0 disables it).
        #[arg(long, default_value_t = 0.0)]
        anneal_time: f64,

        /// Hub restarts before the final local search (skipped on large instances).
        #[arg(long, default_value_t = 5)]
        restarts: usize,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Wall-clock limit in seconds.
    #[arg(short, long, default_value_t = 60.0)]
    time_limit: f64,

    /// Iteration limit (rounds for CHILS, local search iterations otherwise).
    #[arg(short, long)]
    iterations: Option<u64>,

    /// Base seed for every random number generator.
    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl CommonArgs {
    fn budget(&self) -> Result<Budget, String> {
        Ok(Budget::new(
            seconds(self.time_limit, "--time-limit")?,
            self.iterations.unwrap_or(u64::MAX),
        ))
    }
}

fn seconds(value: f64, flag: &str) -> Result<Duration, String> {
    Duration::try_from_secs_f64(value).map_err(|e| format!("{flag}: {e}"))
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Returns a flag raised by SIGTERM or SIGINT.
fn install_cancel_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    for signal in [SIGTERM, SIGINT] {
        if let Err(e) = signal_hook::flag::register(signal, Arc::clone(&flag)) {
            warn!("cannot install handler for signal {signal}: {e}");
        }
    }
    flag
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Mwis { common, .. } | Command::Hs { common, .. } => common.verbose,
    };
    init_tracing(verbose);
    let cancel = install_cancel_flag();

    let result = match cli.command {
        Command::Mwis {
            path,
            population,
            step_time,
            common,
        } => run_mwis(&path, population, step_time, &common, &cancel),
        Command::Hs {
            path,
            anneal_time,
            restarts,
            common,
        } => run_hs(&path, anneal_time, restarts, &common, &cancel),
    };

    match result {
        Ok((cost, solution)) => match print_solution(cost, &solution) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("failed to write solution: {e}");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run_mwis(
    path: &Path,
    population: usize,
    step_time: f64,
    common: &CommonArgs,
    cancel: &AtomicBool,
) -> Result<(i64, Vec<bool>), String> {
    let start = Instant::now();
    let g = WeightedGraph::load_metis(path).map_err(|e| format!("{}: {e}", path.display()))?;
    info!(
        vertices = g.len(),
        edges = g.edge_count(),
        elapsed = start.elapsed().as_secs_f64(),
        "loaded graph"
    );

    let budget = common.budget()?;

    let (cost, solution) = if population <= 1 {
        let mut r = IndependentSetReplica::new(&g, common.seed, LocalSearchConfig::for_independent_set());
        let report = r.explore(&g, &budget, cancel);
        info!(
            iterations = report.iterations,
            improvements = report.improvements,
            stop = ?report.stop,
            "local search finished"
        );
        (r.cost(), r.solution().to_vec())
    } else {
        let config = ChilsConfig {
            population,
            step_time: seconds(step_time, "--step-time")?,
            ..ChilsConfig::default()
        };
        let mut chils = Chils::new(&g, common.seed, config);
        let report = chils.run(&g, &budget, cancel);
        info!(rounds = report.rounds, stop = ?report.stop, "chils finished");
        (report.best_cost, chils.best_solution().to_vec())
    };

    check_independent_set(&g, &solution, cost)?;
    info!(weight = cost, elapsed = start.elapsed().as_secs_f64(), "solution verified");
    Ok((cost, solution))
}

fn run_hs(
    path: &Path,
    anneal_time: f64,
    restarts: usize,
    common: &CommonArgs,
    cancel: &AtomicBool,
) -> Result<(i64, Vec<bool>), String> {
    let start = Instant::now();
    let g = CoverageGraph::load_pace(path).map_err(|e| format!("{}: {e}", path.display()))?;
    info!(
        vertices = g.vertex_count(),
        hyperedges = g.edge_count(),
        elapsed = start.elapsed().as_secs_f64(),
        "loaded instance"
    );

    let budget = common.budget()?;

    let mut r = if anneal_time > 0.0 {
        let mut sa = Annealer::new(&g, common.seed, AnnealConfig::default());
        let report = sa.run(&g, &Budget::time(seconds(anneal_time, "--anneal-time")?), cancel);
        info!(passes = report.passes, best = sa.best_cost(), "annealing finished");
        sa.into_replica(&g)
    } else {
        HittingSetReplica::new(&g, common.seed, LocalSearchConfig::for_hitting_set())
    };

    if restarts > 0 {
        let config = HubRestartConfig {
            restarts,
            ..HubRestartConfig::default()
        };
        let done = r.hub_restarts(&g, &config, cancel);
        info!(restarts = done, best = r.cost(), "hub restarts finished");
    }

    let report = r.explore(&g, &budget, cancel);
    info!(
        iterations = report.iterations,
        improvements = report.improvements,
        stop = ?report.stop,
        "local search finished"
    );

    let (cost, solution) = (r.cost(), r.solution().to_vec());
    check_hitting_set(&g, &solution, cost)?;
    info!(size = cost, elapsed = start.elapsed().as_secs_f64(), "solution verified");
    Ok((cost, solution))
}

fn print_solution(cost: i64, solution: &[bool]) -> std::io::Result<()> {
    let mut out = BufWriter::new(std::io::stdout().lock());
    writeln!(out, "{cost}")?;
    for (u, _) in solution.iter().enumerate().filter(|(_, s)| **s) {
        writeln!(out, "{}", u + 1)?;
    }
    out.flush()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    fn write_instance(name: &str, text: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("chils-{}-{name}", std::process::id()));
        std::fs::write(&path, text).unwrap();
        path
    }

    fn long_run() -> CommonArgs {
        CommonArgs {
            time_limit: 3600.0,
            iterations: None,
            seed: 1,
            verbose: 0,
        }
    }

    #[test]
    fn raised_cancel_flag_still_yields_a_verified_hitting_set() {
        let path = write_instance("cancel.hgr", "c two edges\np hs 4 2\n1 2 3\n3 4\n");
        let cancel = AtomicBool::new(true);
        let result = run_hs(&path, 0.0, 5, &long_run(), &cancel);
        std::fs::remove_file(&path).unwrap();

        let (cost, solution) = result.unwrap();
        assert_eq!(solution.len(), 4);
        assert_eq!(cost, solution.iter().filter(|&&s| s).count() as i64);
    }

    #[test]
    fn raised_cancel_flag_still_yields_a_verified_independent_set() {
        let path = write_instance("cancel.metis", "% triangle\n3 3\n2 3\n1 3\n1 2\n");
        let cancel = AtomicBool::new(true);
        let result = run_mwis(&path, 4, 1.0, &long_run(), &cancel);
        std::fs::remove_file(&path).unwrap();

        let (cost, solution) = result.unwrap();
        assert_eq!(cost, 1);
        assert_eq!(solution.iter().filter(|&&s| s).count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn termination_signal_raises_the_cancel_flag() {
        let flag = install_cancel_flag();
        assert!(!flag.load(Ordering::Relaxed));
        signal_hook::low_level::raise(SIGTERM).unwrap();
        assert!(flag.load(Ordering::Relaxed));
    }
}
