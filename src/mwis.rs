//! Maximum weight independent set replica.
//!
//! Bookkeeping per vertex `v`:
//! - `adjacent_weight[v]`: total weight of selected neighbors.
//! - `tightness[v]`: number of selected neighbors.
//!
//! An unselected vertex with `adjacent_weight[v] < W[v]` is *free*: adding it (and evicting
//! its selected neighbors) strictly increases the cost. Selected vertices of small degree are
//! examined for a (2,1)-exchange that swaps them for two heavier 1-tight neighbors.

use crate::graph::WeightedGraph;
use crate::replica::{LocalSearch, LocalSearchConfig, Move, SearchCore};
use rand::seq::SliceRandom;

/// Local-search replica maximizing the weight of an independent set.
#[derive(Clone, Debug)]
pub struct IndependentSetReplica {
    core: SearchCore,
    adjacent_weight: Vec<i64>,
    tightness: Vec<u32>,
    candidates: Vec<usize>,
}

impl IndependentSetReplica {
    /// Creates a replica over `g` with an empty selection and every vertex queued.
    pub fn new(g: &WeightedGraph, seed: u64, config: LocalSearchConfig) -> Self {
        let mut replica = Self {
            core: SearchCore::new(g.len(), seed, config),
            adjacent_weight: Vec::new(),
            tightness: Vec::new(),
            candidates: Vec::new(),
        };
        replica.reset(g);
        replica
    }

    /// Total weight of the selected neighbors of `u`.
    #[inline]
    pub fn adjacent_weight(&self, u: usize) -> i64 {
        self.adjacent_weight[u]
    }

    /// Number of selected neighbors of `u`.
    #[inline]
    pub fn tightness(&self, u: usize) -> u32 {
        self.tightness[u]
    }

    /// Adds, in increasing id order, every vertex that has no selected neighbor.
    pub fn add_in_order(&mut self, g: &WeightedGraph) {
        for u in 0..g.len() {
            if !self.core.selected[u] && self.tightness[u] == 0 && self.core.tabu[u] == 0 {
                self.add(g, u);
            }
        }
    }

    /// Adds one uniformly random unselected, unlocked vertex (evicting its neighbors).
    pub fn add_random(&mut self, g: &WeightedGraph) {
        if let Some(u) = self.core.sample_vertex(|c, v| !c.selected[v] && c.tabu[v] == 0) {
            self.add(g, u);
        }
    }

    #[inline(always)]
    fn touch(&mut self, u: usize) {
        if self.core.tabu[u] == 0 {
            self.core.queue.push(u);
        }
    }

    #[inline(always)]
    fn is_free(&self, g: &WeightedGraph, u: usize) -> bool {
        !self.core.selected[u] && self.adjacent_weight[u] < g.weight(u)
    }

    /// Swaps selected `u` for the heaviest non-adjacent pair of its 1-tight neighbors if
    /// that pair outweighs `u`. Returns `true` on success.
    fn try_two_one(&mut self, g: &WeightedGraph, u: usize) -> bool {
        let mut candidates = std::mem::take(&mut self.candidates);
        candidates.clear();
        candidates.extend(g.neighbors(u).iter().copied().filter(|&v| {
            !self.core.selected[v] && self.core.tabu[v] == 0 && self.tightness[v] == 1
        }));

        let mut best: Option<(i64, usize, usize)> = None;
        if candidates.len() >= 2 {
            candidates.shuffle(&mut self.core.rng);
            candidates.truncate(self.core.config.two_one_candidates);
            for (i, &a) in candidates.iter().enumerate() {
                for &b in &candidates[i + 1..] {
                    if g.has_edge(a, b) {
                        continue;
                    }
                    let gain = g.weight(a) + g.weight(b);
                    if gain > g.weight(u) && best.is_none_or(|(w, _, _)| gain > w) {
                        best = Some((gain, a, b));
                    }
                }
            }
        }
        self.candidates = candidates;

        match best {
            Some((_, a, b)) => {
                self.add(g, a);
                self.add(g, b);
                true
            }
            None => false,
        }
    }

    /// Recomputes every counter from the selection and compares (test support).
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self, g: &WeightedGraph) {
        let mut cost = 0;
        for u in 0..g.len() {
            let (mut aw, mut t) = (0i64, 0u32);
            for &v in g.neighbors(u) {
                if self.core.selected[v] {
                    aw += g.weight(v);
                    t += 1;
                    assert!(!self.core.selected[u], "adjacent selected vertices {u} and {v}");
                }
            }
            assert_eq!(self.adjacent_weight[u], aw, "adjacent_weight[{u}]");
            assert_eq!(self.tightness[u], t, "tightness[{u}]");
            if self.core.selected[u] {
                cost += g.weight(u);
            }
        }
        assert_eq!(self.core.cost, cost, "cost");
    }
}

impl LocalSearch for IndependentSetReplica {
    type Graph = WeightedGraph;
    const MAXIMIZE: bool = true;

    #[inline(always)]
    fn core(&self) -> &SearchCore {
        &self.core
    }

    #[inline(always)]
    fn core_mut(&mut self) -> &mut SearchCore {
        &mut self.core
    }

    fn reset(&mut self, g: &WeightedGraph) {
        let n = g.len();
        self.core.reset(n);
        self.core.queue.fill();
        self.adjacent_weight.clear();
        self.adjacent_weight.resize(n, 0);
        self.tightness.clear();
        self.tightness.resize(n, 0);
    }

    fn add(&mut self, g: &WeightedGraph, u: usize) {
        assert!(!self.core.selected[u], "add: vertex {u} is already selected");
        debug_assert_eq!(self.core.tabu[u], 0, "add: vertex {u} is locked");

        // Evictions are logged before `u` so that a reverse replay re-adds them after `u` leaves.
        for &v in g.neighbors(u) {
            if self.core.selected[v] {
                self.remove(g, v);
            }
        }

        let w = g.weight(u);
        self.core.selected[u] = true;
        self.core.cost += w;
        self.core.log.record(Move::Added(u));

        for &v in g.neighbors(u) {
            self.adjacent_weight[v] += w;
            self.tightness[v] += 1;
            if self.is_free(g, v) {
                self.touch(v);
            }
        }
        if g.degree(u) <= self.core.config.two_one_degree_limit {
            self.touch(u);
        }
    }

    fn remove(&mut self, g: &WeightedGraph, u: usize) -> bool {
        assert!(self.core.selected[u], "remove: vertex {u} is not selected");

        let w = g.weight(u);
        self.core.selected[u] = false;
        self.core.cost -= w;
        self.core.log.record(Move::Removed(u));

        for &v in g.neighbors(u) {
            self.adjacent_weight[v] -= w;
            self.tightness[v] -= 1;
            if self.is_free(g, v) {
                self.touch(v);
            }
        }
        true
    }

    fn lock(&mut self, g: &WeightedGraph, u: usize) {
        self.core.tabu[u] += 1;
        if self.core.selected[u] {
            for &v in g.neighbors(u) {
                self.core.tabu[v] += 1;
            }
        }
    }

    fn unlock(&mut self, g: &WeightedGraph, u: usize) {
        debug_assert!(self.core.tabu[u] > 0, "unlock: vertex {u} is not locked");
        self.core.tabu[u] -= 1;
        self.touch(u);
        if self.core.selected[u] {
            for &v in g.neighbors(u) {
                debug_assert!(self.core.tabu[v] > 0);
                self.core.tabu[v] -= 1;
                self.touch(v);
            }
        }
    }

    fn greedy(&mut self, g: &WeightedGraph) {
        loop {
            let k = self.core.queue.begin_round(&mut self.core.rng);
            if k == 0 {
                self.core.queue.end_round();
                break;
            }
            for i in 0..k {
                let u = self.core.queue.take(i);
                if self.core.tabu[u] > 0 {
                    continue;
                }
                if self.is_free(g, u) {
                    self.add(g, u);
                } else if self.core.selected[u] && g.degree(u) <= self.core.config.two_one_degree_limit {
                    self.try_two_one(g, u);
                }
            }
            self.core.queue.end_round();
        }
    }

    fn perturb(&mut self, g: &WeightedGraph) {
        let Some(u) = self.core.sample_vertex(|c, v| !c.selected[v] && c.tabu[v] == 0) else {
            return;
        };
        self.add(g, u);
        self.lock(g, u);

        for _ in 0..self.core.config.walk_steps {
            if !self.core.walk_open() {
                break;
            }
            if let Some(v) = self.core.sample_queued(|c, v| !c.selected[v] && c.tabu[v] == 0) {
                self.add(g, v);
            }
        }

        self.unlock(g, u);
    }

    fn restore(&mut self, g: &WeightedGraph, target: &[bool]) {
        assert_eq!(target.len(), g.len(), "restore: target length mismatch");
        for u in 0..g.len() {
            if self.core.selected[u] && !target[u] {
                self.remove(g, u);
            }
        }
        for u in 0..g.len() {
            if !self.core.selected[u] && target[u] {
                self.add(g, u);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::{Budget, StopReason};
    use proptest::prelude::*;
    use rand::prelude::*;
    use rand_xorshift::XorShiftRng;
    use std::sync::atomic::AtomicBool;

    fn cycle(n: usize, w: i64) -> WeightedGraph {
        let edges: Vec<_> = (0..n).map(|i| (i, (i + 1) % n)).collect();
        WeightedGraph::from_edges(vec![w; n], &edges).unwrap()
    }

    fn random_graph(rng: &mut XorShiftRng, n: usize, p: f64) -> WeightedGraph {
        let mut edges = Vec::new();
        for u in 0..n {
            for v in (u + 1)..n {
                if rng.random_bool(p) {
                    edges.push((u, v));
                }
            }
        }
        let weights = (0..n).map(|_| rng.random_range(1..=20)).collect();
        WeightedGraph::from_edges(weights, &edges).unwrap()
    }

    fn no_free_vertex(r: &IndependentSetReplica, g: &WeightedGraph) -> bool {
        (0..g.len()).all(|u| r.is_selected(u) || r.adjacent_weight(u) >= g.weight(u))
    }

    // -------------------------------------------------------------------------
    // Primitive moves
    // -------------------------------------------------------------------------

    #[test]
    fn add_evicts_selected_neighbors() {
        let g = WeightedGraph::from_edges(vec![1, 5, 1], &[(0, 1), (1, 2)]).unwrap();
        let mut r = IndependentSetReplica::new(&g, 1, LocalSearchConfig::default());
        r.add(&g, 0);
        r.add(&g, 2);
        assert_eq!(r.cost(), 2);
        r.add(&g, 1);
        assert_eq!(r.solution(), &[false, true, false]);
        assert_eq!(r.cost(), 5);
        assert_eq!(r.adjacent_weight(0), 5);
        assert_eq!(r.tightness(2), 1);
        r.assert_consistent(&g);
    }

    #[test]
    #[should_panic(expected = "already selected")]
    fn add_twice_panics() {
        let g = cycle(3, 1);
        let mut r = IndependentSetReplica::new(&g, 1, LocalSearchConfig::default());
        r.add(&g, 0);
        r.add(&g, 0);
    }

    #[test]
    #[should_panic(expected = "not selected")]
    fn remove_absent_panics() {
        let g = cycle(3, 1);
        let mut r = IndependentSetReplica::new(&g, 1, LocalSearchConfig::default());
        r.remove(&g, 1);
    }

    #[test]
    fn lock_covers_neighborhood_of_selected_vertex() {
        let g = cycle(5, 1);
        let mut r = IndependentSetReplica::new(&g, 1, LocalSearchConfig::default());
        r.add(&g, 0);
        r.lock(&g, 0);
        assert_eq!(r.tabu(0), 1);
        assert_eq!(r.tabu(1), 1);
        assert_eq!(r.tabu(4), 1);
        assert_eq!(r.tabu(2), 0);
        r.unlock(&g, 0);
        assert!((0..5).all(|u| r.tabu(u) == 0));
    }

    // -------------------------------------------------------------------------
    // Greedy repair
    // -------------------------------------------------------------------------

    #[test]
    fn greedy_on_unit_cycle_reaches_two() {
        let g = cycle(5, 1);
        for seed in 0..20 {
            let mut r = IndependentSetReplica::new(&g, seed, LocalSearchConfig::default());
            r.greedy(&g);
            assert_eq!(r.cost(), 2);
            r.assert_consistent(&g);
        }
    }

    #[test]
    fn greedy_on_star_keeps_only_the_heavy_center() {
        let mut weights = vec![10];
        weights.extend([1; 5]);
        let edges: Vec<_> = (1..=5).map(|leaf| (0, leaf)).collect();
        let g = WeightedGraph::from_edges(weights, &edges).unwrap();
        for seed in 0..20 {
            let mut r = IndependentSetReplica::new(&g, seed, LocalSearchConfig::default());
            r.greedy(&g);
            assert_eq!(r.cost(), 10);
            assert_eq!(r.solution(), &[true, false, false, false, false, false]);
        }
    }

    #[test]
    fn greedy_applies_two_one_exchange() {
        // Path 1 - 0 - 2 with a light center: the two ends outweigh it.
        let g = WeightedGraph::from_edges(vec![3, 2, 2], &[(0, 1), (0, 2)]).unwrap();
        let mut r = IndependentSetReplica::new(&g, 5, LocalSearchConfig::default());
        r.restore(&g, &[true, false, false]);
        r.core.queue.reset(3);
        r.core.queue.push(0);
        r.greedy(&g);
        assert_eq!(r.solution(), &[false, true, true]);
        assert_eq!(r.cost(), 4);
        r.assert_consistent(&g);
    }

    #[test]
    fn greedy_reaches_a_fixed_point_with_no_free_vertex() {
        let mut rng = XorShiftRng::seed_from_u64(0xFEED);
        for _ in 0..20 {
            let g = random_graph(&mut rng, 40, 0.15);
            let mut r = IndependentSetReplica::new(&g, rng.random(), LocalSearchConfig::default());
            r.greedy(&g);
            r.assert_consistent(&g);
            assert!(no_free_vertex(&r, &g));
            assert!(r.queued().is_empty());
        }
    }

    #[test]
    fn add_in_order_builds_a_maximal_set() {
        let g = cycle(6, 1);
        let mut r = IndependentSetReplica::new(&g, 1, LocalSearchConfig::default());
        r.add_in_order(&g);
        assert_eq!(r.solution(), &[true, false, true, false, true, false]);
        assert_eq!(r.cost(), 3);
    }

    // -------------------------------------------------------------------------
    // Explore
    // -------------------------------------------------------------------------

    #[test]
    fn explore_with_zero_iterations_is_a_no_op() {
        let g = cycle(7, 2);
        let mut r = IndependentSetReplica::new(&g, 9, LocalSearchConfig::default());
        r.add(&g, 3);
        let before = r.solution().to_vec();
        let queued = r.queued().to_vec();
        let report = r.explore(&g, &Budget::iterations(0), &AtomicBool::new(false));
        assert_eq!(report.iterations, 0);
        assert_eq!(r.solution(), &before[..]);
        assert_eq!(r.cost(), 2);
        assert_eq!(r.queued(), &queued[..]);
    }

    #[test]
    fn explore_respects_iteration_limit_and_never_gets_worse() {
        let mut rng = XorShiftRng::seed_from_u64(0xABCD);
        let g = random_graph(&mut rng, 80, 0.08);
        let mut r = IndependentSetReplica::new(&g, 17, LocalSearchConfig::default());
        let cancel = AtomicBool::new(false);

        let first = r.explore(&g, &Budget::iterations(1), &cancel);
        assert_eq!(first.iterations, 1);
        let after_greedy = r.cost();

        let report = r.explore(&g, &Budget::iterations(2_000), &cancel);
        assert_eq!(report.iterations, 2_000);
        assert_eq!(report.stop, StopReason::IterationLimit);
        assert!(r.cost() >= after_greedy);
        r.assert_consistent(&g);
        assert!(r.log_len() == 0);
        assert!((0..g.len()).all(|u| r.tabu(u) == 0));
    }

    #[test]
    fn explore_honors_cancel_flag() {
        let g = cycle(9, 1);
        let mut r = IndependentSetReplica::new(&g, 2, LocalSearchConfig::default());
        let report = r.explore(&g, &Budget::iterations(u64::MAX), &AtomicBool::new(true));
        assert_eq!(report.stop, StopReason::Cancelled);
        assert_eq!(report.iterations, 1);
        assert!(r.cost() >= 3);
        r.assert_consistent(&g);
    }

    #[test]
    fn explore_with_kicks_returns_best_seen() {
        let mut rng = XorShiftRng::seed_from_u64(0x5EED);
        let g = random_graph(&mut rng, 60, 0.1);
        let config = LocalSearchConfig {
            kick_interval: Some(50),
            ..LocalSearchConfig::default()
        };
        let mut r = IndependentSetReplica::new(&g, 4, config);
        let cancel = AtomicBool::new(false);
        r.explore(&g, &Budget::iterations(1), &cancel);
        let start = r.cost();
        r.explore(&g, &Budget::iterations(1_000), &cancel);
        assert!(r.cost() >= start);
        r.assert_consistent(&g);
    }

    // -------------------------------------------------------------------------
    // Rollback
    // -------------------------------------------------------------------------

    #[derive(Clone, Debug)]
    enum Op {
        Add(usize),
        Remove(usize),
        Perturb,
        Greedy,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..1000).prop_map(Op::Add),
            (0usize..1000).prop_map(Op::Remove),
            Just(Op::Perturb),
            Just(Op::Greedy),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(1000))]

        #[test]
        fn unwind_restores_state_exactly(
            graph_seed in any::<u64>(),
            replica_seed in any::<u64>(),
            ops in prop::collection::vec(op_strategy(), 1..200),
        ) {
            let mut rng = XorShiftRng::seed_from_u64(graph_seed);
            let g = random_graph(&mut rng, 24, 0.2);
            let mut r = IndependentSetReplica::new(&g, replica_seed, LocalSearchConfig::default());
            r.greedy(&g);

            let selected = r.solution().to_vec();
            let cost = r.cost();
            let aw = r.adjacent_weight.clone();
            let tight = r.tightness.clone();

            r.checkpoint();
            for op in ops {
                match op {
                    Op::Add(u) => {
                        let u = u % g.len();
                        if !r.is_selected(u) {
                            r.add(&g, u);
                        }
                    }
                    Op::Remove(u) => {
                        let u = u % g.len();
                        if r.is_selected(u) {
                            r.remove(&g, u);
                        }
                    }
                    Op::Perturb => r.perturb(&g),
                    Op::Greedy => r.greedy(&g),
                }
                r.assert_consistent(&g);
            }
            r.unwind(&g, 0);

            prop_assert_eq!(r.solution(), &selected[..]);
            prop_assert_eq!(r.cost(), cost);
            prop_assert_eq!(&r.adjacent_weight, &aw);
            prop_assert_eq!(&r.tightness, &tight);
            prop_assert!((0..g.len()).all(|u| r.tabu(u) == 0));
            prop_assert_eq!(r.log_len(), 0);
        }

        #[test]
        fn queue_never_holds_duplicates(
            seed in any::<u64>(),
            ops in prop::collection::vec(op_strategy(), 1..100),
        ) {
            let mut rng = XorShiftRng::seed_from_u64(seed);
            let g = random_graph(&mut rng, 30, 0.15);
            let mut r = IndependentSetReplica::new(&g, seed, LocalSearchConfig::default());
            for op in ops {
                match op {
                    Op::Add(u) if !r.is_selected(u % g.len()) => r.add(&g, u % g.len()),
                    Op::Remove(u) if r.is_selected(u % g.len()) => {
                        r.remove(&g, u % g.len());
                    }
                    Op::Perturb => r.perturb(&g),
                    Op::Greedy => r.greedy(&g),
                    _ => {}
                }
                let mut q = r.queued().to_vec();
                let len = q.len();
                q.sort_unstable();
                q.dedup();
                prop_assert_eq!(q.len(), len);
                prop_assert!(q.iter().all(|&u| r.core.queue.contains(u)));
            }
        }
    }
}
