//! Shared machinery of a search replica: configuration, undo log, budgets, and the
//! [`LocalSearch`] trait whose provided methods implement the explore loop once for
//! both problem modes.
//!
//! A replica owns one candidate solution plus the incremental bookkeeping needed to
//! evaluate single-vertex flips in O(degree). The mode-specific primitives (`add`,
//! `remove`, `greedy`, `perturb`, locking) live in [`crate::mwis`] and [`crate::hitting`].

use crate::queue::DirtyQueue;
use rand::prelude::*;
use rand::rngs::SmallRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

// ============================================================================
// Configuration
// ============================================================================

/// Tuning parameters of a local-search replica.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalSearchConfig {
    /// The clock and cancel flag are polled once every this many explore iterations.
    pub check_interval: u64,
    /// Random draws made when sampling a perturbation vertex before giving up.
    pub max_guesses: usize,
    /// The perturbation walk stops once this many vertices are queued.
    pub max_queue: usize,
    /// Additional flips in the perturbation walk after the locked seed flip.
    pub walk_steps: usize,
    /// Selected vertices up to this degree are tried for a (2,1)-exchange (IS mode).
    pub two_one_degree_limit: usize,
    /// At most this many 1-tight neighbors are paired in a (2,1)-exchange (IS mode).
    pub two_one_candidates: usize,
    /// If set, explore applies a kick every this many iterations.
    pub kick_interval: Option<u64>,
    /// Upper bound on the number of random flips in one kick.
    pub kick_strength: usize,
}

impl LocalSearchConfig {
    /// Defaults for weighted independent set replicas.
    pub fn for_independent_set() -> Self {
        Self::default()
    }

    /// Defaults for hitting set replicas: a one-flip walk and periodic kicks.
    pub fn for_hitting_set() -> Self {
        Self {
            walk_steps: 1,
            kick_interval: Some(1 << 17),
            ..Self::default()
        }
    }
}

impl Default for LocalSearchConfig {
    fn default() -> Self {
        Self {
            check_interval: 256,
            max_guesses: 512,
            max_queue: 1 << 15,
            walk_steps: 4,
            two_one_degree_limit: 64,
            two_one_candidates: 32,
            kick_interval: None,
            kick_strength: 32,
        }
    }
}

/// Limits for one call to [`LocalSearch::explore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Budget {
    /// Wall-clock limit measured from the start of the call.
    pub time_limit: Duration,
    /// Maximum number of iterations (the initial greedy pass counts as one).
    pub iteration_limit: u64,
}

impl Budget {
    /// A budget with both limits.
    pub fn new(time_limit: Duration, iteration_limit: u64) -> Self {
        Self {
            time_limit,
            iteration_limit,
        }
    }

    /// A time-only budget.
    pub fn time(time_limit: Duration) -> Self {
        Self::new(time_limit, u64::MAX)
    }

    /// An iteration-only budget.
    pub fn iterations(iteration_limit: u64) -> Self {
        Self::new(Duration::MAX, iteration_limit)
    }
}

/// Why an explore call returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The wall-clock limit elapsed.
    TimeLimit,
    /// The iteration limit was reached.
    IterationLimit,
    /// The cancel flag was raised.
    Cancelled,
}

/// Summary of one explore call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExploreReport {
    /// Iterations performed, including the initial greedy pass.
    pub iterations: u64,
    /// Number of times the running best was strictly improved.
    pub improvements: u64,
    /// Why the call returned.
    pub stop: StopReason,
}

// ============================================================================
// Undo log
// ============================================================================

/// A logged membership change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Move {
    /// The vertex entered the solution.
    Added(usize),
    /// The vertex left the solution.
    Removed(usize),
}

/// Journal of membership changes since the last checkpoint.
#[derive(Clone, Debug, Default)]
pub struct UndoLog {
    entries: Vec<Move>,
    enabled: bool,
}

impl UndoLog {
    /// Appends `mv` if logging is enabled.
    #[inline(always)]
    pub fn record(&mut self, mv: Move) {
        if self.enabled {
            self.entries.push(mv);
        }
    }

    /// Clears the journal and starts recording.
    #[inline]
    pub fn checkpoint(&mut self) {
        self.entries.clear();
        self.enabled = true;
    }

    /// Accepts every recorded move; recording stays on.
    #[inline]
    pub fn commit(&mut self) {
        self.entries.clear();
    }

    /// Stops recording without discarding entries.
    #[inline]
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Returns `true` while moves are being recorded.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of recorded moves.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn pop(&mut self) -> Option<Move> {
        self.entries.pop()
    }
}

// ============================================================================
// SearchCore
// ============================================================================

/// State shared by both replica flavors.
#[derive(Clone, Debug)]
pub struct SearchCore {
    pub(crate) selected: Vec<bool>,
    pub(crate) cost: i64,
    pub(crate) queue: DirtyQueue,
    pub(crate) tabu: Vec<u32>,
    pub(crate) log: UndoLog,
    pub(crate) rng: SmallRng,
    pub(crate) config: LocalSearchConfig,
    pub(crate) time_ref: Instant,
    pub(crate) best_time: Duration,
}

impl SearchCore {
    pub(crate) fn new(n: usize, seed: u64, config: LocalSearchConfig) -> Self {
        Self {
            selected: vec![false; n],
            cost: 0,
            queue: DirtyQueue::new(n),
            tabu: vec![0; n],
            log: UndoLog::default(),
            rng: SmallRng::seed_from_u64(seed),
            config,
            time_ref: Instant::now(),
            best_time: Duration::ZERO,
        }
    }

    /// Resizes every per-vertex array for `n` vertices, all unselected and unlocked.
    pub(crate) fn reset(&mut self, n: usize) {
        self.selected.clear();
        self.selected.resize(n, false);
        self.tabu.clear();
        self.tabu.resize(n, 0);
        self.queue.reset(n);
        self.log.commit();
        self.log.disable();
        self.cost = 0;
        self.best_time = Duration::ZERO;
    }

    /// Probes up to `max_guesses` uniformly random vertices for one satisfying `accept`.
    pub(crate) fn sample_vertex(&mut self, accept: impl Fn(&Self, usize) -> bool) -> Option<usize> {
        let n = self.selected.len();
        if n == 0 {
            return None;
        }
        for _ in 0..self.config.max_guesses {
            let v = self.rng.random_range(0..n);
            if accept(self, v) {
                return Some(v);
            }
        }
        None
    }

    /// Probes queued vertices for one satisfying `accept`.
    pub(crate) fn sample_queued(&mut self, accept: impl Fn(&Self, usize) -> bool) -> Option<usize> {
        for _ in 0..self.config.max_guesses {
            let v = self.queue.sample(&mut self.rng)?;
            if accept(self, v) {
                return Some(v);
            }
        }
        None
    }

    /// Returns `true` while the perturbation walk may continue.
    #[inline]
    pub(crate) fn walk_open(&self) -> bool {
        !self.queue.is_empty() && self.queue.len() < self.config.max_queue
    }

    #[inline]
    fn mark_best(&mut self) {
        self.best_time = self.time_ref.elapsed();
    }
}

// ============================================================================
// LocalSearch
// ============================================================================

mod sealed {
    pub trait Sealed {}
    impl Sealed for crate::mwis::IndependentSetReplica {}
    impl Sealed for crate::hitting::HittingSetReplica {}
}

/// Incremental local search over one candidate solution.
///
/// Implemented by [`crate::mwis::IndependentSetReplica`] (maximize selected weight subject to
/// independence) and [`crate::hitting::HittingSetReplica`] (minimize selected count subject to
/// every hyperedge being hit).
///
/// Between public calls the selection is always feasible, `cost` equals the objective of
/// the selection, and every derived counter matches a from-scratch recomputation.
pub trait LocalSearch: sealed::Sealed {
    /// Graph type the replica searches on.
    type Graph;

    /// `true` if larger costs are better.
    const MAXIMIZE: bool;

    #[doc(hidden)]
    fn core(&self) -> &SearchCore;

    #[doc(hidden)]
    fn core_mut(&mut self) -> &mut SearchCore;

    /// Rebuilds all state for `g` from scratch (IS: empty selection, HS: everything selected).
    fn reset(&mut self, g: &Self::Graph);

    /// Adds `u` to the selection.
    ///
    /// # Panics
    /// Panics if `u` is already selected.
    fn add(&mut self, g: &Self::Graph, u: usize);

    /// Removes `u` from the selection, repairing feasibility first if needed.
    ///
    /// Returns `false` if the removal had to be abandoned; the state is still feasible.
    ///
    /// # Panics
    /// Panics if `u` is not selected.
    fn remove(&mut self, g: &Self::Graph, u: usize) -> bool;

    /// Places a tabu hold around `u`.
    fn lock(&mut self, g: &Self::Graph, u: usize);

    /// Releases a hold placed by [`LocalSearch::lock`]; `u` must not have flipped since.
    fn unlock(&mut self, g: &Self::Graph, u: usize);

    /// Drains the dirty queue, applying improving moves until none remain.
    fn greedy(&mut self, g: &Self::Graph);

    /// Applies a small random disturbance.
    fn perturb(&mut self, g: &Self::Graph);

    /// Drives the selection to `target` (which must be feasible) using only add/remove.
    fn restore(&mut self, g: &Self::Graph, target: &[bool]);

    /// Current objective value.
    #[inline]
    fn cost(&self) -> i64 {
        self.core().cost
    }

    /// Returns whether `u` is selected.
    #[inline]
    fn is_selected(&self, u: usize) -> bool {
        self.core().selected[u]
    }

    /// Current selection as a membership vector.
    #[inline]
    fn solution(&self) -> &[bool] {
        &self.core().selected
    }

    /// Current tabu count of `u`.
    #[inline]
    fn tabu(&self, u: usize) -> u32 {
        self.core().tabu[u]
    }

    /// Vertices currently waiting in the dirty queue.
    #[inline]
    fn queued(&self) -> &[usize] {
        self.core().queue.pending()
    }

    /// Number of moves recorded since the last checkpoint.
    #[inline]
    fn log_len(&self) -> usize {
        self.core().log.len()
    }

    /// Clears the log and starts recording moves.
    #[inline]
    fn checkpoint(&mut self) {
        self.core_mut().log.checkpoint();
    }

    /// Instant that best-times are measured from.
    #[inline]
    fn time_ref(&self) -> Instant {
        self.core().time_ref
    }

    /// Replaces the instant that best-times are measured from.
    #[inline]
    fn set_time_ref(&mut self, time_ref: Instant) {
        self.core_mut().time_ref = time_ref;
    }

    /// Elapsed time (since the time reference) at which the cost last improved.
    #[inline]
    fn best_time(&self) -> Duration {
        self.core().best_time
    }

    /// Overrides the recorded best time.
    #[inline]
    fn set_best_time(&mut self, t: Duration) {
        self.core_mut().best_time = t;
    }

    /// Returns `true` if `a` is a strictly better cost than `b`.
    #[inline(always)]
    fn improves(a: i64, b: i64) -> bool {
        if Self::MAXIMIZE { a > b } else { a < b }
    }

    /// Stops logging and reverts recorded moves, newest first, until `t` remain.
    fn unwind(&mut self, g: &Self::Graph, t: usize) {
        self.core_mut().log.disable();
        while self.core().log.len() > t {
            match self.core_mut().log.pop() {
                Some(Move::Added(u)) => {
                    let removed = self.remove(g, u);
                    debug_assert!(removed, "undoing an add must never need a repair");
                }
                Some(Move::Removed(u)) => self.add(g, u),
                None => break,
            }
        }
    }

    /// Applies `1..=kick_strength` random flips of unlocked vertices without logging.
    fn kick(&mut self, g: &Self::Graph) {
        let core = self.core_mut();
        core.log.disable();
        let strength = core.rng.random_range(1..=core.config.kick_strength.max(1));
        for _ in 0..strength {
            let Some(u) = self.core_mut().sample_vertex(|c, v| c.tabu[v] == 0) else {
                break;
            };
            if self.is_selected(u) {
                self.remove(g, u);
            } else {
                self.add(g, u);
            }
        }
    }

    /// Runs perturb/repair episodes until the budget runs out or `cancel` is raised.
    ///
    /// Each episode is journaled: an improvement is committed, a plateau move is kept, and
    /// a worse result is rolled back. With kicks enabled the best state seen is snapshotted
    /// and reinstated on return, so the result is never worse than the starting state.
    /// An iteration limit of zero returns immediately without touching the state.
    fn explore(&mut self, g: &Self::Graph, budget: &Budget, cancel: &AtomicBool) -> ExploreReport {
        let mut report = ExploreReport {
            iterations: 0,
            improvements: 0,
            stop: StopReason::IterationLimit,
        };
        if budget.iteration_limit == 0 {
            return report;
        }

        let start = Instant::now();
        let check_interval = self.core().config.check_interval.max(1);
        let kick_interval = self.core().config.kick_interval;

        self.core_mut().log.disable();
        let mut record = self.cost();
        self.greedy(g);
        report.iterations = 1;
        let mut best = self.cost();
        if Self::improves(best, record) {
            record = best;
            report.improvements += 1;
            self.core_mut().mark_best();
        }

        let mut snapshot: Option<(i64, Vec<bool>)> = None;
        let mut countdown = 0u64;
        loop {
            if report.iterations >= budget.iteration_limit {
                report.stop = StopReason::IterationLimit;
                break;
            }
            if countdown == 0 {
                countdown = check_interval;
                if cancel.load(Ordering::Relaxed) {
                    report.stop = StopReason::Cancelled;
                    break;
                }
                if start.elapsed() >= budget.time_limit {
                    report.stop = StopReason::TimeLimit;
                    break;
                }
            }
            countdown -= 1;

            if let Some(every) = kick_interval
                && every > 0
                && report.iterations.is_multiple_of(every)
            {
                self.core_mut().log.disable();
                let cost = self.cost();
                match &snapshot {
                    Some((saved, target)) if Self::improves(*saved, cost) => {
                        let target = target.clone();
                        self.restore(g, &target);
                    }
                    _ => snapshot = Some((cost, self.solution().to_vec())),
                }
                self.kick(g);
                self.greedy(g);
                best = self.cost();
                trace!(iteration = report.iterations, cost = best, "kick");
            }

            self.core_mut().log.checkpoint();
            self.perturb(g);
            self.greedy(g);
            report.iterations += 1;

            let cost = self.cost();
            if Self::improves(cost, best) {
                best = cost;
                report.improvements += 1;
                self.core_mut().log.commit();
                if Self::improves(cost, record) {
                    record = cost;
                    self.core_mut().mark_best();
                }
            } else if Self::improves(best, cost) {
                self.unwind(g, 0);
            } else {
                self.core_mut().log.commit();
            }
        }

        self.core_mut().log.commit();
        self.core_mut().log.disable();
        if let Some((saved, target)) = snapshot
            && Self::improves(saved, self.cost())
        {
            self.restore(g, &target);
        }
        report
    }
}

/// SplitMix64 mixer for deriving per-replica seeds from a base seed.
#[inline]
pub fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

// ============================================================================
// Tests
// ============================================================================
