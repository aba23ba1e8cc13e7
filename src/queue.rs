//! Double-buffered dirty-vertex work list.
//!
//! Vertices are pushed into a pending buffer while a round drains the previous batch.
//! A single membership flag per vertex guarantees that a vertex is never present twice
//! across both buffers: it stays flagged until it is taken from the batch.

use rand::Rng;
use rand::seq::SliceRandom;

/// Work list of vertices whose local situation changed since they were last examined.
#[derive(Clone, Debug, Default)]
pub struct DirtyQueue {
    pending: Vec<usize>,
    batch: Vec<usize>,
    queued: Vec<bool>,
}

impl DirtyQueue {
    /// Creates an empty queue over vertices `0..n`.
    pub fn new(n: usize) -> Self {
        Self {
            pending: Vec::with_capacity(n),
            batch: Vec::with_capacity(n),
            queued: vec![false; n],
        }
    }

    /// Drops every queued vertex and resizes the flag array for `n` vertices.
    pub fn reset(&mut self, n: usize) {
        self.pending.clear();
        self.batch.clear();
        self.queued.clear();
        self.queued.resize(n, false);
    }

    /// Queues every vertex `0..n` in order.
    pub fn fill(&mut self) {
        for u in 0..self.queued.len() {
            self.push(u);
        }
    }

    /// Queues `u` unless it is already waiting. Returns `true` if it was added.
    #[inline(always)]
    pub fn push(&mut self, u: usize) -> bool {
        if self.queued[u] {
            return false;
        }
        self.queued[u] = true;
        self.pending.push(u);
        true
    }

    /// Returns `true` if `u` is waiting in either buffer.
    #[inline(always)]
    pub fn contains(&self, u: usize) -> bool {
        self.queued[u]
    }

    /// Number of vertices pushed since the current round began.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if nothing is pending.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Vertices pushed since the current round began.
    #[inline]
    pub fn pending(&self) -> &[usize] {
        &self.pending
    }

    /// Returns a uniformly random pending vertex.
    #[inline]
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending[rng.random_range(0..self.pending.len())])
        }
    }

    /// Shuffles the pending vertices and moves them into the batch. Returns the batch size.
    ///
    /// Pushes made while the batch is drained land in the (now empty) pending buffer.
    pub fn begin_round<R: Rng + ?Sized>(&mut self, rng: &mut R) -> usize {
        debug_assert!(self.batch.is_empty(), "previous round was not ended");
        self.pending.shuffle(rng);
        std::mem::swap(&mut self.pending, &mut self.batch);
        self.batch.len()
    }

    /// Takes the `i`-th vertex of the current batch, clearing its queued flag.
    #[inline(always)]
    pub fn take(&mut self, i: usize) -> usize {
        let u = self.batch[i];
        self.queued[u] = false;
        u
    }

    /// Finishes the current round.
    #[inline]
    pub fn end_round(&mut self) {
        self.batch.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================
