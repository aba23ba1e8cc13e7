//! Simulated annealing warm start for hitting set.
//!
//! Each pass sweeps a linearly cooling temperature. A random selected vertex is dropped
//! outright when redundant, and otherwise dropped (with repair) under a Metropolis test
//! on its score. Passes restart from the best selection found so far.

use crate::coverage::CoverageGraph;
use crate::hitting::HittingSetReplica;
use crate::replica::{Budget, LocalSearch, LocalSearchConfig, StopReason};
use rand::prelude::*;
use rand::rngs::SmallRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::debug;

// ============================================================================
// Configuration
// ============================================================================

/// Annealing schedule parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnealConfig {
    /// Temperature at the first step of a pass.
    pub initial_temperature: f64,
    /// A pass ends once the temperature drops below this value.
    pub min_temperature: f64,
    /// Steps over which the temperature falls linearly to zero.
    pub steps_per_pass: u64,
    /// The clock and cancel flag are polled once every this many steps.
    pub check_interval: u64,
}

impl Default for AnnealConfig {
    fn default() -> Self {
        Self {
            initial_temperature: 0.25,
            min_temperature: 0.08,
            steps_per_pass: 200_000_000,
            check_interval: 1024,
        }
    }
}

/// Summary of an annealing run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnnealReport {
    /// Completed or interrupted passes.
    pub passes: u64,
    /// Total steps across all passes.
    pub steps: u64,
    /// Why the run returned.
    pub stop: StopReason,
}

// ============================================================================
// Annealer
// ============================================================================

/// Single-replica annealer over a [`HittingSetReplica`].
#[derive(Clone, Debug)]
pub struct Annealer {
    replica: HittingSetReplica,
    rng: SmallRng,
    best: Vec<bool>,
    best_cost: i64,
    config: AnnealConfig,
}

impl Annealer {
    /// Creates an annealer starting from the all-selected solution.
    pub fn new(g: &CoverageGraph, seed: u64, config: AnnealConfig) -> Self {
        let replica = HittingSetReplica::new(g, seed, LocalSearchConfig::for_hitting_set());
        Self {
            best: replica.solution().to_vec(),
            best_cost: replica.cost(),
            replica,
            rng: SmallRng::seed_from_u64(seed ^ 0x5A5A_5A5A),
            config,
        }
    }

    /// Cost of the best selection found.
    #[inline]
    pub fn best_cost(&self) -> i64 {
        self.best_cost
    }

    /// Best selection found.
    #[inline]
    pub fn best_solution(&self) -> &[bool] {
        &self.best
    }

    /// Consumes the annealer, returning its replica positioned at the best selection.
    pub fn into_replica(self, g: &CoverageGraph) -> HittingSetReplica {
        let mut replica = self.replica;
        replica.restore(g, &self.best);
        replica
    }

    /// Runs passes from the best selection until the budget is spent or `cancel` is raised.
    pub fn run(&mut self, g: &CoverageGraph, budget: &Budget, cancel: &AtomicBool) -> AnnealReport {
        let start = Instant::now();
        let mut report = AnnealReport {
            passes: 0,
            steps: 0,
            stop: StopReason::IterationLimit,
        };
        if g.vertex_count() == 0 {
            return report;
        }

        loop {
            if report.steps >= budget.iteration_limit {
                report.stop = StopReason::IterationLimit;
                break;
            }
            if cancel.load(Ordering::Relaxed) {
                report.stop = StopReason::Cancelled;
                break;
            }
            if start.elapsed() >= budget.time_limit {
                report.stop = StopReason::TimeLimit;
                break;
            }

            if self.replica.cost() != self.best_cost || self.replica.solution() != &self.best[..] {
                let target = self.best.clone();
                self.replica.restore(g, &target);
            }
            let remaining = budget.iteration_limit - report.steps;
            let (steps, stop) = self.pass(g, start, budget, remaining, cancel);
            report.steps += steps;
            report.passes += 1;
            debug!(pass = report.passes, steps, best = self.best_cost, "annealing pass");
            if let Some(stop) = stop {
                report.stop = stop;
                break;
            }
        }

        let target = self.best.clone();
        self.replica.restore(g, &target);
        report
    }

    /// One cooling sweep. Returns the steps taken and the budget reason if it cut the pass short.
    fn pass(
        &mut self,
        g: &CoverageGraph,
        start: Instant,
        budget: &Budget,
        max_steps: u64,
        cancel: &AtomicBool,
    ) -> (u64, Option<StopReason>) {
        let n = g.vertex_count();
        let k_max = self.config.steps_per_pass.max(1);
        let check_interval = self.config.check_interval.max(1);
        let mut k = 0u64;

        while k < k_max {
            if k >= max_steps {
                return (k, Some(StopReason::IterationLimit));
            }
            let t = self.config.initial_temperature * (1.0 - (k + 1) as f64 / k_max as f64);
            let u = self.rng.random_range(0..n);

            if self.replica.is_selected(u) {
                let score = self.replica.score(u);
                if score == 0 || accept_removal(score, t, &mut self.rng) {
                    self.replica.remove(g, u);
                }
            }

            if self.replica.cost() < self.best_cost {
                self.best_cost = self.replica.cost();
                self.best.copy_from_slice(self.replica.solution());
                self.replica.set_best_time(self.replica.time_ref().elapsed());
            }

            k += 1;
            if k.is_multiple_of(check_interval) {
                if cancel.load(Ordering::Relaxed) {
                    return (k, Some(StopReason::Cancelled));
                }
                if start.elapsed() >= budget.time_limit {
                    return (k, Some(StopReason::TimeLimit));
                }
            }
            if t < self.config.min_temperature {
                break;
            }
        }
        (k, None)
    }
}

/// Metropolis test for dropping a vertex that is the sole cover of `score` hyperedges.
#[inline]
fn accept_removal(score: u32, temp: f64, rng: &mut SmallRng) -> bool {
    if temp <= 0.0 {
        return false;
    }
    let prob = (-(f64::from(score) - 1.0) / temp).exp();
    rng.random_bool(prob.clamp(0.0, 1.0))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand_xorshift::XorShiftRng;

    fn random_instance(seed: u64, n: usize, m: usize) -> CoverageGraph {
        let mut rng = XorShiftRng::seed_from_u64(seed);
        let edges: Vec<Vec<usize>> = (0..m)
            .map(|_| (0..rng.random_range(1..=4)).map(|_| rng.random_range(0..n)).collect())
            .collect();
        CoverageGraph::from_hyperedges(n, &edges).unwrap()
    }

    fn small_config() -> AnnealConfig {
        AnnealConfig {
            steps_per_pass: 5_000,
            ..AnnealConfig::default()
        }
    }

    #[test]
    fn accept_removal_prefers_low_scores() {
        let mut rng = SmallRng::seed_from_u64(1);
        assert!((0..100).all(|_| accept_removal(1, 0.2, &mut rng)));
        let accepted = (0..1000).filter(|_| accept_removal(4, 0.1, &mut rng)).count();
        assert!(accepted < 10);
        assert!(!accept_removal(1, 0.0, &mut rng));
    }

    #[test]
    fn run_finds_a_small_feasible_set_and_tracks_best() {
        let g = random_instance(42, 40, 60);
        let mut sa = Annealer::new(&g, 5, small_config());
        let report = sa.run(&g, &Budget::iterations(20_000), &AtomicBool::new(false));
        assert_eq!(report.stop, StopReason::IterationLimit);
        assert!(report.steps <= 20_000);
        assert!(report.passes >= 1);
        assert!(sa.best_cost() < 40);

        let best = sa.best_solution().to_vec();
        assert_eq!(best.iter().filter(|&&s| s).count() as i64, sa.best_cost());
        let replica = sa.into_replica(&g);
        assert_eq!(replica.solution(), &best[..]);
        replica.assert_consistent(&g);
    }

    #[test]
    fn best_cost_never_increases_across_runs() {
        let g = random_instance(7, 30, 50);
        let mut sa = Annealer::new(&g, 9, small_config());
        let cancel = AtomicBool::new(false);
        let mut last = sa.best_cost();
        for _ in 0..5 {
            sa.run(&g, &Budget::iterations(3_000), &cancel);
            assert!(sa.best_cost() <= last);
            last = sa.best_cost();
        }
    }

    #[test]
    fn run_stops_on_cancel() {
        let g = random_instance(3, 10, 10);
        let mut sa = Annealer::new(&g, 1, small_config());
        let report = sa.run(&g, &Budget::iterations(u64::MAX), &AtomicBool::new(true));
        assert_eq!(report.stop, StopReason::Cancelled);
        assert_eq!(report.steps, 0);
    }
}
