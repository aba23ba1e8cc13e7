//! CHILS: a cooperative population of independent set replicas.
//!
//! Every round each replica explores the full graph for a short slice. The vertices on
//! which the replicas disagree (selected by some but not all of them) form the contested
//! core. Each replica then re-optimizes its own choices restricted to the core on a small
//! induced subgraph and merges the result back. Non-best replicas are periodically
//! diversified so that the population does not collapse onto a single solution.

use crate::graph::{CoreSubgraph, WeightedGraph};
use crate::mwis::IndependentSetReplica;
use crate::replica::{Budget, LocalSearch, LocalSearchConfig, StopReason, splitmix64};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

// ============================================================================
// Configuration
// ============================================================================

/// Coordinator parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct ChilsConfig {
    /// Number of full-graph replicas.
    pub population: usize,
    /// Wall-clock slice each replica explores the full graph per round.
    pub step_time: Duration,
    /// Iteration cap for every explore slice.
    pub step_iterations: u64,
    /// Core slices last `step_time * core_step_ratio`.
    pub core_step_ratio: f64,
    /// Cores with fewer vertices trigger extra perturbation of non-best replicas.
    pub min_core: usize,
    /// If set, even-indexed non-best replicas always take their core result and are
    /// perturbed when the core is small.
    pub diversify_even_replicas: bool,
    /// Configuration of every replica.
    pub local_search: LocalSearchConfig,
}

impl Default for ChilsConfig {
    fn default() -> Self {
        Self {
            population: 8,
            step_time: Duration::from_secs(2),
            step_iterations: u64::MAX,
            core_step_ratio: 0.5,
            min_core: 512,
            diversify_even_replicas: true,
            local_search: LocalSearchConfig::for_independent_set(),
        }
    }
}

/// Summary of a [`Chils::run`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChilsReport {
    /// Completed rounds.
    pub rounds: u64,
    /// Best cost in the population at return.
    pub best_cost: i64,
    /// Why the run returned.
    pub stop: StopReason,
}

// ============================================================================
// Chils
// ============================================================================

/// Population of independent set replicas sharing a contested core.
#[derive(Debug)]
pub struct Chils {
    config: ChilsConfig,
    replicas: Vec<IndependentSetReplica>,
    core_replicas: Vec<IndependentSetReplica>,
    contested: Vec<bool>,
    core: Option<CoreSubgraph>,
}

impl Chils {
    /// Creates `config.population` replicas over `g` with seeds derived from `seed`.
    ///
    /// # Panics
    /// Panics if the population is zero.
    pub fn new(g: &WeightedGraph, seed: u64, config: ChilsConfig) -> Self {
        let p = config.population;
        assert!(p > 0, "population must be positive");
        assert!(
            config.core_step_ratio >= 0.0,
            "core_step_ratio must be a non-negative number"
        );

        let time_ref = Instant::now();
        let make = |s: u64| {
            let mut r = IndependentSetReplica::new(g, splitmix64(s), config.local_search.clone());
            r.set_time_ref(time_ref);
            r
        };
        let replicas = (0..p as u64).map(|i| make(seed.wrapping_add(i))).collect();
        let core_replicas = (0..p as u64).map(|i| make(seed.wrapping_add(p as u64 + i))).collect();

        Self {
            replicas,
            core_replicas,
            contested: vec![false; g.len()],
            core: None,
            config,
        }
    }

    /// Number of full-graph replicas.
    #[inline]
    pub fn population(&self) -> usize {
        self.replicas.len()
    }

    /// Full-graph replica `i`.
    #[inline]
    pub fn replica(&self, i: usize) -> &IndependentSetReplica {
        &self.replicas[i]
    }

    /// Mutable access to full-graph replica `i`.
    #[inline]
    pub fn replica_mut(&mut self, i: usize) -> &mut IndependentSetReplica {
        &mut self.replicas[i]
    }

    /// Contested mask from the most recent round.
    #[inline]
    pub fn contested(&self) -> &[bool] {
        &self.contested
    }

    /// Core subgraph from the most recent round.
    #[inline]
    pub fn core(&self) -> Option<&CoreSubgraph> {
        self.core.as_ref()
    }

    /// Adds every vertex of `solution` to every replica.
    ///
    /// # Panics
    /// Panics if `solution.len() != g.len()`.
    pub fn set_solution(&mut self, g: &WeightedGraph, solution: &[bool]) {
        assert_eq!(solution.len(), g.len(), "solution length must equal vertex count");
        for r in &mut self.replicas {
            for (u, _) in solution.iter().enumerate().filter(|(_, s)| **s) {
                if !r.is_selected(u) {
                    r.add(g, u);
                }
            }
        }
    }

    /// Index of the best replica: highest cost, ties broken by earliest discovery.
    pub fn best_index(&self) -> usize {
        let mut best = 0;
        for (i, r) in self.replicas.iter().enumerate().skip(1) {
            let b = &self.replicas[best];
            if r.cost() > b.cost() || (r.cost() == b.cost() && r.best_time() < b.best_time()) {
                best = i;
            }
        }
        best
    }


    /// Index of the first replica with the lowest cost.
    pub fn worst_index(&self) -> usize {
        let mut worst = 0;
        for (i, r) in self.replicas.iter().enumerate().skip(1) {
            if r.cost() < self.replicas[worst].cost() {
                worst = i;
            }
        }
        worst
    }

    /// Best cost in the population.
    #[inline]
    pub fn best_cost(&self) -> i64 {
        self.replicas[self.best_index()].cost()
    }

    /// Selection of the best replica.
    #[inline]
    pub fn best_solution(&self) -> &[bool] {
        self.replicas[self.best_index()].solution()
    }

    /// Gives empty replicas a starting point and runs greedy on all of them.
    ///
    /// Replica 0 starts from the in-order maximal set; the others from one random vertex.
    pub fn seed_replicas(&mut self, g: &WeightedGraph) {
        for (i, r) in self.replicas.iter_mut().enumerate() {
            if r.solution().iter().all(|&s| !s) {
                if i == 0 {
                    r.add_in_order(g);
                } else {
                    r.add_random(g);
                }
            }
            r.greedy(g);
        }
    }

    /// Marks every vertex selected by some, but not all, replicas. Returns the count.
    pub fn mark_contested(&mut self) -> usize {
        let p = self.replicas.len();
        let mut count = 0;
        for (u, flag) in self.contested.iter_mut().enumerate() {
            let t = self.replicas.iter().filter(|r| r.is_selected(u)).count();
            *flag = t > 0 && t < p;
            count += usize::from(*flag);
        }
        count
    }

    /// Builds the subgraph induced by the contested mask.
    pub fn extract_core(&mut self, g: &WeightedGraph) -> &CoreSubgraph {
        self.core.insert(g.subgraph(&self.contested))
    }

    /// Runs rounds until the budget is spent or `cancel` is raised.
    ///
    /// The time limit bounds the whole call; the iteration limit bounds the number of rounds.
    pub fn run(&mut self, g: &WeightedGraph, budget: &Budget, cancel: &AtomicBool) -> ChilsReport {
        let start = Instant::now();
        self.seed_replicas(g);
        self.report_progress(0, start);

        let mut rounds = 0u64;
        let stop = loop {
            if rounds >= budget.iteration_limit {
                break StopReason::IterationLimit;
            }
            if cancel.load(Ordering::Relaxed) {
                break StopReason::Cancelled;
            }
            if start.elapsed() >= budget.time_limit {
                break StopReason::TimeLimit;
            }
            rounds += 1;
            self.round(g, start, budget.time_limit, cancel);
            self.report_progress(rounds, start);
        };

        ChilsReport {
            rounds,
            best_cost: self.best_cost(),
            stop,
        }
    }

    fn round(&mut self, g: &WeightedGraph, start: Instant, time_limit: Duration, cancel: &AtomicBool) {
        let step_iterations = self.config.step_iterations;

        for r in &mut self.replicas {
            let Some(step) = slice(start, time_limit, self.config.step_time) else {
                break;
            };
            r.explore(g, &Budget::new(step, step_iterations), cancel);
        }

        let contested = self.mark_contested();
        let best = first_best(&self.replicas);
        self.extract_core(g);

        let Self {
            config,
            replicas,
            core_replicas,
            core,
            ..
        } = self;
        let Some(core) = core.as_ref() else {
            return;
        };
        debug!(contested, core_arcs = core.graph.arc_count(), "contested core");

        // Unbounded when the ratio overflows a Duration.
        let core_secs = config.step_time.as_secs_f64() * config.core_step_ratio;
        let core_time = Duration::try_from_secs_f64(core_secs).unwrap_or(Duration::MAX);
        if !core.is_empty() {
            for (i, (full, local)) in replicas.iter_mut().zip(core_replicas.iter_mut()).enumerate() {
                let Some(step) = slice(start, time_limit, core_time) else {
                    break;
                };
                let forced = config.diversify_even_replicas && i != best && i % 2 == 0;
                merge_core(g, core, full, local, &Budget::new(step, step_iterations), forced, cancel);
            }
        }

        if config.diversify_even_replicas && core.len() < config.min_core {
            let best = first_best(replicas);
            for (i, r) in replicas.iter_mut().enumerate() {
                if i != best && i % 2 == 0 {
                    r.perturb(g);
                }
            }
        }
    }

    fn report_progress(&self, round: u64, start: Instant) {
        let (best, worst) = (self.best_index(), self.worst_index());
        let (core_vertices, core_arcs) = self
            .core
            .as_ref()
            .map_or((0, 0), |c| (c.len(), c.graph.arc_count()));
        info!(
            round,
            best_cost = self.replicas[best].cost(),
            best_id = best,
            best_time = self.replicas[best].best_time().as_secs_f64(),
            worst_cost = self.replicas[worst].cost(),
            worst_id = worst,
            worst_time = self.replicas[worst].best_time().as_secs_f64(),
            elapsed = start.elapsed().as_secs_f64(),
            core_vertices,
            core_arcs,
            "chils"
        );
    }
}

/// Index of the first replica with the highest cost.
fn first_best(replicas: &[IndependentSetReplica]) -> usize {
    let mut best = 0;
    for (i, r) in replicas.iter().enumerate().skip(1) {
        if r.cost() > replicas[best].cost() {
            best = i;
        }
    }
    best
}

/// Re-optimizes `full`'s choices on the core with `local`, then copies the core result back
/// if it is at least as heavy (or `forced`).
fn merge_core(
    g: &WeightedGraph,
    core: &CoreSubgraph,
    full: &mut IndependentSetReplica,
    local: &mut IndependentSetReplica,
    budget: &Budget,
    forced: bool,
    cancel: &AtomicBool,
) {
    local.reset(&core.graph);
    local.set_time_ref(full.time_ref());

    let mut reference = 0;
    for (c, &u) in core.reverse.iter().enumerate() {
        if full.is_selected(u) {
            reference += core.graph.weight(c);
            local.add(&core.graph, c);
        }
    }
    local.explore(&core.graph, budget, cancel);

    if reference <= local.cost() || forced {
        for (c, &u) in core.reverse.iter().enumerate() {
            if local.is_selected(c) && !full.is_selected(u) {
                full.add(g, u);
            }
        }
    }
    if reference < local.cost() {
        full.set_best_time(local.best_time());
    }
}

/// Remaining time in `[start, start + limit)`, capped at `want`; `None` once nothing remains.
fn slice(start: Instant, limit: Duration, want: Duration) -> Option<Duration> {
    let remaining = limit.saturating_sub(start.elapsed());
    let d = want.min(remaining);
    (!d.is_zero()).then_some(d)
}

// ============================================================================
// Tests
// ============================================================================
