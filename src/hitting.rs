//! Minimum hitting set replica.
//!
//! Bookkeeping:
//! - `cover_count[e]`: number of selected members of hyperedge `e` (always at least 1).
//! - `one_tight[e]`: the sole selected member of `e`; meaningful only while `cover_count[e] == 1`.
//! - `score[v]`: number of hyperedges for which `v` is the sole selected member.
//!
//! A selected vertex with `score == 0` is redundant and can be dropped for free. Removing a
//! vertex with positive score first re-covers its dependent hyperedges with other members.

use crate::coverage::CoverageGraph;
use crate::replica::{Budget, LocalSearch, LocalSearchConfig, Move, SearchCore};
use rand::Rng;
use rand::seq::SliceRandom;
use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// Local-search replica minimizing the size of a hitting set.
#[derive(Clone, Debug)]
pub struct HittingSetReplica {
    core: SearchCore,
    cover_count: Vec<u32>,
    score: Vec<u32>,
    one_tight: Vec<usize>,
}

impl HittingSetReplica {
    /// Creates a replica over `g` with every vertex selected and queued.
    pub fn new(g: &CoverageGraph, seed: u64, config: LocalSearchConfig) -> Self {
        let mut replica = Self {
            core: SearchCore::new(g.vertex_count(), seed, config),
            cover_count: Vec::new(),
            score: Vec::new(),
            one_tight: Vec::new(),
        };
        replica.reset(g);
        replica
    }

    /// Number of selected members of hyperedge `e`.
    #[inline]
    pub fn cover_count(&self, e: usize) -> u32 {
        self.cover_count[e]
    }

    /// Number of hyperedges solely covered by `u`.
    #[inline]
    pub fn score(&self, u: usize) -> u32 {
        self.score[u]
    }

    /// The sole selected member of `e`, if exactly one member is selected.
    #[inline]
    pub fn sole_cover(&self, e: usize) -> Option<usize> {
        (self.cover_count[e] == 1).then(|| self.one_tight[e])
    }

    /// Adds `v` as a repair cover for an edge solely covered by `u`.
    ///
    /// Returns `false` if `v` is locked.
    #[inline]
    fn repair_with(&mut self, g: &CoverageGraph, v: usize) -> bool {
        if self.core.tabu[v] > 0 {
            return false;
        }
        self.add(g, v);
        true
    }

    /// Recomputes every counter from the selection and compares (test support).
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self, g: &CoverageGraph) {
        let mut score = vec![0u32; g.vertex_count()];
        for e in 0..g.edge_count() {
            let covers: Vec<usize> =
                g.members(e).iter().copied().filter(|&v| self.core.selected[v]).collect();
            assert!(!covers.is_empty(), "hyperedge {e} is not hit");
            assert_eq!(self.cover_count[e] as usize, covers.len(), "cover_count[{e}]");
            if let &[only] = covers.as_slice() {
                assert_eq!(self.one_tight[e], only, "one_tight[{e}]");
                score[only] += 1;
            }
        }
        assert_eq!(self.score, score, "score");
        let cost = self.core.selected.iter().filter(|&&s| s).count() as i64;
        assert_eq!(self.core.cost, cost, "cost");
    }
}

impl LocalSearch for HittingSetReplica {
    type Graph = CoverageGraph;
    const MAXIMIZE: bool = false;

    #[inline(always)]
    fn core(&self) -> &SearchCore {
        &self.core
    }

    #[inline(always)]
    fn core_mut(&mut self) -> &mut SearchCore {
        &mut self.core
    }

    fn reset(&mut self, g: &CoverageGraph) {
        let (n, m) = (g.vertex_count(), g.edge_count());
        self.core.reset(n);
        self.core.selected.fill(true);
        self.core.cost = n as i64;
        self.core.queue.fill();

        self.score.clear();
        self.score.resize(n, 0);
        self.cover_count.clear();
        self.one_tight.clear();
        for e in 0..m {
            let members = g.members(e);
            self.cover_count.push(members.len() as u32);
            self.one_tight.push(members[0]);
            if members.len() == 1 {
                self.score[members[0]] += 1;
            }
        }
    }

    fn add(&mut self, g: &CoverageGraph, u: usize) {
        assert!(!self.core.selected[u], "add: vertex {u} is already selected");
        debug_assert_eq!(self.core.tabu[u], 0, "add: vertex {u} is locked");

        self.core.selected[u] = true;
        self.core.cost += 1;
        self.core.log.record(Move::Added(u));

        for &e in g.edges_of(u) {
            self.cover_count[e] += 1;
            match self.cover_count[e] {
                1 => {
                    self.one_tight[e] = u;
                    self.score[u] += 1;
                }
                2 => {
                    let w = self.one_tight[e];
                    debug_assert!(w != u && self.core.selected[w]);
                    self.score[w] -= 1;
                    if self.score[w] == 0 {
                        self.core.queue.push(w);
                    }
                }
                _ => {}
            }
        }
        if self.score[u] == 0 {
            self.core.queue.push(u);
        }
    }

    fn remove(&mut self, g: &CoverageGraph, u: usize) -> bool {
        assert!(self.core.selected[u], "remove: vertex {u} is not selected");

        if self.score[u] > 0 {
            // Degree-2 edges have exactly one alternative cover.
            for &e in g.edges_of(u) {
                if self.cover_count[e] == 1 && g.edge_degree(e) == 2 {
                    let members = g.members(e);
                    let v = if members[0] == u { members[1] } else { members[0] };
                    if !self.repair_with(g, v) {
                        return false;
                    }
                }
            }
            for &e in g.edges_of(u) {
                if self.cover_count[e] != 1 {
                    continue;
                }
                let members = g.members(e);
                if members.len() < 2 {
                    return false;
                }
                let pos = members.binary_search(&u).unwrap_or(0);
                let k = self.core.rng.random_range(0..members.len() - 1);
                let v = if k < pos { members[k] } else { members[k + 1] };
                if !self.repair_with(g, v) {
                    return false;
                }
            }
        }
        debug_assert_eq!(self.score[u], 0);

        self.core.selected[u] = false;
        self.core.cost -= 1;
        self.core.log.record(Move::Removed(u));

        for &e in g.edges_of(u) {
            self.cover_count[e] -= 1;
            if self.cover_count[e] == 1 {
                let members = g.members(e);
                if let Some(&w) = members.iter().find(|&&w| self.core.selected[w]) {
                    self.one_tight[e] = w;
                    self.score[w] += 1;
                }
            }
        }
        true
    }

    fn lock(&mut self, _g: &CoverageGraph, u: usize) {
        self.core.tabu[u] += 1;
    }

    fn unlock(&mut self, _g: &CoverageGraph, u: usize) {
        debug_assert!(self.core.tabu[u] > 0, "unlock: vertex {u} is not locked");
        self.core.tabu[u] -= 1;
        if self.core.selected[u] && self.score[u] == 0 {
            self.core.queue.push(u);
        }
    }

    fn greedy(&mut self, g: &CoverageGraph) {
        loop {
            let k = self.core.queue.begin_round(&mut self.core.rng);
            if k == 0 {
                self.core.queue.end_round();
                break;
            }
            for i in 0..k {
                let u = self.core.queue.take(i);
                if self.core.selected[u] && self.score[u] == 0 && self.core.tabu[u] == 0 {
                    self.remove(g, u);
                }
            }
            self.core.queue.end_round();
        }
    }

    fn perturb(&mut self, g: &CoverageGraph) {
        let Some(u) = self.core.sample_vertex(|c, v| c.tabu[v] == 0) else {
            return;
        };
        if self.core.selected[u] {
            if !self.remove(g, u) {
                return;
            }
        } else {
            self.add(g, u);
        }
        self.lock(g, u);

        for _ in 0..self.core.config.walk_steps {
            if !self.core.walk_open() {
                break;
            }
            let Some(v) = self.core.sample_queued(|c, v| c.tabu[v] == 0) else {
                break;
            };
            if self.core.selected[v] {
                self.remove(g, v);
            } else {
                self.add(g, v);
            }
        }

        self.unlock(g, u);
    }

    fn restore(&mut self, g: &CoverageGraph, target: &[bool]) {
        assert_eq!(target.len(), g.vertex_count(), "restore: target length mismatch");
        for u in 0..g.vertex_count() {
            if !self.core.selected[u] {
                self.add(g, u);
            }
        }
        for (u, &keep) in target.iter().enumerate() {
            if !keep {
                let removed = self.remove(g, u);
                debug_assert!(removed);
            }
        }
    }
}

// ============================================================================
// Hub restarts
// ============================================================================

/// Parameters of [`HittingSetReplica::hub_restarts`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubRestartConfig {
    /// Number of restarts.
    pub restarts: usize,
    /// Length of the highest-degree prefix that is shuffled and thinned on each restart.
    pub top: usize,
    /// Budget of the explore call after each restart.
    pub budget: Budget,
    /// Instances with at least this many vertices skip the phase.
    pub max_vertices: usize,
}

impl Default for HubRestartConfig {
    fn default() -> Self {
        Self {
            restarts: 5,
            top: 64,
            budget: Budget::time(Duration::from_secs(1)),
            max_vertices: 5000,
        }
    }
}

impl HittingSetReplica {
    /// Restarts from the full selection several times. Each restart drops the redundant
    /// vertices among the `top` highest-degree ones, in shuffled order, then explores.
    ///
    /// Ends at the best selection seen, the starting one included. Returns the number of
    /// restarts performed.
    pub fn hub_restarts(&mut self, g: &CoverageGraph, config: &HubRestartConfig, cancel: &AtomicBool) -> usize {
        let n = g.vertex_count();
        if n == 0 || n >= config.max_vertices {
            return 0;
        }

        let mut best_cost = self.cost();
        let mut best = self.solution().to_vec();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&u| Reverse(g.vertex_degree(u)));
        let top = config.top.min(n);

        let mut done = 0;
        for _ in 0..config.restarts {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            order[..top].shuffle(&mut self.core.rng);
            self.reset(g);
            for &u in &order[..top] {
                if self.score[u] == 0 {
                    let removed = self.remove(g, u);
                    debug_assert!(removed);
                }
            }
            self.explore(g, &config.budget, cancel);
            done += 1;

            if self.cost() < best_cost {
                best_cost = self.cost();
                best.copy_from_slice(self.solution());
            }
            debug!(restart = done, cost = self.cost(), best = best_cost, "hub restart");
        }

        self.restore(g, &best);
        done
    }
}

// ============================================================================
// Tests
// ============================================================================
