//! Weighted CSR graphs, induced subgraph extraction, and METIS parsing.
//!
//! A [`WeightedGraph`] is immutable once built: every constructor validates the adjacency
//! structure (sorted, symmetric, loop-free, duplicate-free) before handing the graph out,
//! so the local search never has to re-check it.

use rayon::prelude::*;
use std::fs;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Errors encountered while building, validating, or parsing a graph or hypergraph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The input file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No header line was found before the end of input.
    #[error("missing header line")]
    MissingHeader,

    /// A line could not be parsed.
    #[error("line {line}: {message}")]
    Parse {
        /// 1-based line number in the input text.
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// A vertex id is outside `[0, n)`.
    #[error("vertex {vertex} out of range (n = {n})")]
    VertexOutOfRange {
        /// Offending (0-based) vertex id.
        vertex: usize,
        /// Number of vertices.
        n: usize,
    },

    /// An adjacency list contains its own vertex.
    #[error("self-loop at vertex {vertex}")]
    SelfLoop {
        /// Vertex with the loop.
        vertex: usize,
    },

    /// An adjacency list is not strictly increasing (unsorted or duplicated entries).
    #[error("adjacency list of vertex {vertex} is not strictly increasing")]
    Unsorted {
        /// Vertex whose list is malformed.
        vertex: usize,
    },

    /// `v` appears in the list of `u` but not the other way around.
    #[error("edge ({u},{v}) is not symmetric")]
    NotSymmetric {
        /// Vertex listing the neighbor.
        u: usize,
        /// Neighbor that does not list `u` back.
        v: usize,
    },

    /// The CSR offsets array is malformed.
    #[error("malformed offsets: {0}")]
    Offsets(String),

    /// The weight array length does not match the vertex count.
    #[error("expected {expected} weights, got {got}")]
    WeightCount {
        /// Number of vertices.
        expected: usize,
        /// Number of weights supplied.
        got: usize,
    },

    /// A vertex weight is negative.
    #[error("vertex {vertex} has negative weight {weight}")]
    NegativeWeight {
        /// Offending vertex.
        vertex: usize,
        /// Its weight.
        weight: i64,
    },

    /// The header announced a different number of edges than the body contains.
    #[error("header announces {expected} edges, found {got}")]
    EdgeCount {
        /// Edge count from the header.
        expected: usize,
        /// Edge count actually read.
        got: usize,
    },

    /// A hyperedge has no members and can never be hit.
    #[error("hyperedge {edge} is empty")]
    EmptyHyperedge {
        /// Offending hyperedge.
        edge: usize,
    },
}

// ============================================================================
// WeightedGraph
// ============================================================================

/// An undirected vertex-weighted graph in compressed sparse row form.
///
/// Representation:
/// - `offsets[u]..offsets[u + 1]` is the slice of `adjacency` holding the neighbors of `u`.
/// - Every neighbor list is sorted and duplicate-free; `v ∈ N(u)` iff `u ∈ N(v)`.
/// - `weights[u] >= 0`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeightedGraph {
    offsets: Vec<usize>,
    adjacency: Vec<usize>,
    weights: Vec<i64>,
}

impl WeightedGraph {
    /// Builds a graph from raw CSR arrays.
    ///
    /// # Errors
    /// Returns an error if the arrays violate any structural invariant.
    pub fn from_csr(
        offsets: Vec<usize>,
        adjacency: Vec<usize>,
        weights: Vec<i64>,
    ) -> Result<Self, GraphError> {
        let g = Self {
            offsets,
            adjacency,
            weights,
        };
        g.validate()?;
        Ok(g)
    }

    /// Builds a graph from an undirected edge list; duplicates and orientation are normalized.
    ///
    /// # Errors
    /// Returns an error on out-of-range endpoints, self-loops, or negative weights.
    pub fn from_edges(weights: Vec<i64>, edges: &[(usize, usize)]) -> Result<Self, GraphError> {
        let mut builder = GraphBuilder::with_weights(weights);
        for &(u, v) in edges {
            builder.add_edge(u, v)?;
        }
        builder.build()
    }

    /// Returns the number of vertices.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Returns `true` if the graph has no vertices.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Returns the number of undirected edges.
    #[inline]
    pub fn edge_count(&self) -> usize {
        self.adjacency.len() / 2
    }

    /// Returns the number of directed arcs (twice the edge count).
    #[inline]
    pub fn arc_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Returns the degree of vertex `u`.
    #[inline(always)]
    pub fn degree(&self, u: usize) -> usize {
        self.offsets[u + 1] - self.offsets[u]
    }

    /// Returns the sorted neighbor list of `u`.
    #[inline(always)]
    pub fn neighbors(&self, u: usize) -> &[usize] {
        &self.adjacency[self.offsets[u]..self.offsets[u + 1]]
    }

    /// Returns the weight of `u`.
    #[inline(always)]
    pub fn weight(&self, u: usize) -> i64 {
        self.weights[u]
    }

    /// Returns all vertex weights.
    #[inline]
    pub fn weights(&self) -> &[i64] {
        &self.weights
    }

    /// Returns whether the edge `(u, v)` exists (binary search on the shorter list).
    #[inline]
    pub fn has_edge(&self, u: usize, v: usize) -> bool {
        let (a, b) = if self.degree(u) <= self.degree(v) {
            (u, v)
        } else {
            (v, u)
        };
        self.neighbors(a).binary_search(&b).is_ok()
    }

    /// Returns the sum of all vertex weights.
    pub fn total_weight(&self) -> i64 {
        self.weights.iter().sum()
    }

    /// Checks every structural invariant of the CSR arrays.
    ///
    /// Per-vertex checks run in parallel; the first violation found is reported.
    ///
    /// # Errors
    /// Returns the first violation encountered.
    pub fn validate(&self) -> Result<(), GraphError> {
        let n = self.weights.len();
        if self.offsets.len() != n + 1 {
            return Err(GraphError::Offsets(format!(
                "expected {} offsets, got {}",
                n + 1,
                self.offsets.len()
            )));
        }
        if self.offsets[0] != 0 || self.offsets[n] != self.adjacency.len() {
            return Err(GraphError::Offsets(format!(
                "offsets must span [0, {}]",
                self.adjacency.len()
            )));
        }
        if let Some(u) = (0..n).find(|&u| self.offsets[u] > self.offsets[u + 1]) {
            return Err(GraphError::Offsets(format!("offsets decrease at vertex {u}")));
        }
        if let Some((vertex, &weight)) = self.weights.iter().enumerate().find(|(_, w)| **w < 0) {
            return Err(GraphError::NegativeWeight { vertex, weight });
        }

        (0..n).into_par_iter().try_for_each(|u| {
            let list = self.neighbors(u);
            for (i, &v) in list.iter().enumerate() {
                if v >= n {
                    return Err(GraphError::VertexOutOfRange { vertex: v, n });
                }
                if v == u {
                    return Err(GraphError::SelfLoop { vertex: u });
                }
                if i > 0 && list[i - 1] >= v {
                    return Err(GraphError::Unsorted { vertex: u });
                }
            }
            Ok(())
        })?;

        // Symmetry needs sorted lists, so it runs as a second pass.
        (0..n).into_par_iter().try_for_each(|u| {
            match self.neighbors(u).iter().find(|&&v| self.neighbors(v).binary_search(&u).is_err()) {
                Some(&v) => Err(GraphError::NotSymmetric { u, v }),
                None => Ok(()),
            }
        })
    }

    /// Extracts the subgraph induced by the vertices with `mask[u] == true`.
    ///
    /// Selected vertices are renumbered densely in increasing original id.
    ///
    /// # Panics
    /// Panics if `mask.len() != self.len()`.
    pub fn subgraph(&self, mask: &[bool]) -> CoreSubgraph {
        assert_eq!(mask.len(), self.len(), "mask length must equal vertex count");

        let mut forward = vec![None; self.len()];
        let mut reverse = Vec::new();
        for (u, _) in mask.iter().enumerate().filter(|(_, keep)| **keep) {
            forward[u] = Some(reverse.len());
            reverse.push(u);
        }

        let mut offsets = Vec::with_capacity(reverse.len() + 1);
        let mut adjacency = Vec::new();
        let mut weights = Vec::with_capacity(reverse.len());
        offsets.push(0);
        for &u in &reverse {
            // Original lists are sorted and `forward` is monotone, so the mapped list stays sorted.
            adjacency.extend(self.neighbors(u).iter().filter_map(|&v| forward[v]));
            offsets.push(adjacency.len());
            weights.push(self.weights[u]);
        }

        CoreSubgraph {
            graph: Self {
                offsets,
                adjacency,
                weights,
            },
            forward,
            reverse,
        }
    }

    // ------------------------------------------------------------------------
    // METIS input
    // ------------------------------------------------------------------------

    /// Parses a graph in METIS format.
    ///
    /// Lines starting with `%` are comments. The header is `n m [fmt [ncon]]`; when the
    /// format code has its tens digit set (`10`, `11`) every vertex line starts with the
    /// vertex weight, otherwise all weights are `1`. When the units digit is set, each
    /// neighbor is followed by an edge weight, which is ignored.
    ///
    /// # Errors
    /// Returns an error if the text is malformed or the described graph is invalid.
    pub fn parse_metis(text: &str) -> Result<Self, GraphError> {
        let mut lines = text
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim_start().starts_with('%'));

        let (header_line, header) = lines.next().ok_or(GraphError::MissingHeader)?;
        let fields: Vec<&str> = header.split_whitespace().collect();
        if fields.len() < 2 {
            return Err(GraphError::MissingHeader);
        }
        let n = parse_number::<usize>(fields[0], header_line)?;
        let m = parse_number::<usize>(fields[1], header_line)?;
        let fmt = fields.get(2).copied().unwrap_or("0");
        let vertex_weights = fmt.len() >= 2 && fmt.as_bytes()[fmt.len() - 2] == b'1';
        let edge_weights = fmt.ends_with('1');

        let mut builder = GraphBuilder::new(n);
        let mut arcs = 0usize;
        for u in 0..n {
            let (line_no, line) = lines.next().ok_or_else(|| GraphError::Parse {
                line: text.lines().count(),
                message: format!("expected {n} vertex lines, found {u}"),
            })?;
            let mut tokens = line.split_whitespace();
            if vertex_weights {
                let w = tokens.next().ok_or_else(|| GraphError::Parse {
                    line: line_no + 1,
                    message: "missing vertex weight".to_string(),
                })?;
                builder.set_weight(u, parse_number::<i64>(w, line_no)?);
            }
            while let Some(token) = tokens.next() {
                let v = parse_number::<usize>(token, line_no)?;
                if v == 0 || v > n {
                    return Err(GraphError::Parse {
                        line: line_no + 1,
                        message: format!("neighbor {v} outside 1..={n}"),
                    });
                }
                if edge_weights {
                    tokens.next();
                }
                builder.push_arc(u, v - 1)?;
                arcs += 1;
            }
        }

        if arcs != 2 * m {
            return Err(GraphError::EdgeCount {
                expected: m,
                got: arcs / 2,
            });
        }
        builder.build_directed()
    }

    /// Reads and parses a METIS graph file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is malformed.
    pub fn load_metis(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let text = fs::read_to_string(path)?;
        Self::parse_metis(&text)
    }
}

/// Parses a whitespace-delimited token, tagging failures with a 1-based line number.
pub(crate) fn parse_number<T: std::str::FromStr>(token: &str, line: usize) -> Result<T, GraphError> {
    token.parse().map_err(|_| GraphError::Parse {
        line: line + 1,
        message: format!("invalid number {token:?}"),
    })
}

// ============================================================================
// Induced subgraphs
// ============================================================================

/// An induced subgraph together with the id maps between it and its parent.
#[derive(Clone, Debug)]
pub struct CoreSubgraph {
    /// The induced subgraph with dense ids.
    pub graph: WeightedGraph,
    /// `forward[u]` is the subgraph id of parent vertex `u`, if selected.
    pub forward: Vec<Option<usize>>,
    /// `reverse[c]` is the parent id of subgraph vertex `c`.
    pub reverse: Vec<usize>,
}

impl CoreSubgraph {
    /// Returns the number of vertices in the subgraph.
    #[inline]
    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    /// Returns `true` if no vertex was selected.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Accumulates adjacency lists and produces a validated [`WeightedGraph`].
#[derive(Clone, Debug)]
pub struct GraphBuilder {
    lists: Vec<Vec<usize>>,
    weights: Vec<i64>,
}

impl GraphBuilder {
    /// Creates a builder for `n` vertices of unit weight.
    pub fn new(n: usize) -> Self {
        Self {
            lists: vec![Vec::new(); n],
            weights: vec![1; n],
        }
    }

    /// Creates a builder with the given vertex weights.
    pub fn with_weights(weights: Vec<i64>) -> Self {
        Self {
            lists: vec![Vec::new(); weights.len()],
            weights,
        }
    }

    /// Sets the weight of vertex `u`.
    ///
    /// # Panics
    /// Panics if `u` is out of range.
    pub fn set_weight(&mut self, u: usize, weight: i64) {
        self.weights[u] = weight;
    }

    /// Adds the undirected edge `{u, v}`.
    ///
    /// # Errors
    /// Returns an error on out-of-range endpoints or a self-loop.
    pub fn add_edge(&mut self, u: usize, v: usize) -> Result<(), GraphError> {
        self.push_arc(u, v)?;
        self.lists[v].push(u);
        Ok(())
    }

    fn push_arc(&mut self, u: usize, v: usize) -> Result<(), GraphError> {
        let n = self.lists.len();
        for x in [u, v] {
            if x >= n {
                return Err(GraphError::VertexOutOfRange { vertex: x, n });
            }
        }
        if u == v {
            return Err(GraphError::SelfLoop { vertex: u });
        }
        self.lists[u].push(v);
        Ok(())
    }

    /// Sorts and deduplicates the adjacency lists and builds a validated graph.
    ///
    /// # Errors
    /// Returns an error if the accumulated graph violates an invariant.
    pub fn build(self) -> Result<WeightedGraph, GraphError> {
        self.build_directed()
    }

    /// Builds from lists that were filled one arc at a time; symmetry is checked, not added.
    fn build_directed(mut self) -> Result<WeightedGraph, GraphError> {
        self.lists.par_iter_mut().for_each(|list| {
            list.sort_unstable();
            list.dedup();
        });

        let mut offsets = Vec::with_capacity(self.lists.len() + 1);
        let mut adjacency = Vec::with_capacity(self.lists.iter().map(Vec::len).sum());
        offsets.push(0);
        for list in &self.lists {
            adjacency.extend_from_slice(list);
            offsets.push(adjacency.len());
        }
        WeightedGraph::from_csr(offsets, adjacency, self.weights)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn path(n: usize) -> WeightedGraph {
        let edges: Vec<_> = (1..n).map(|i| (i - 1, i)).collect();
        WeightedGraph::from_edges(vec![1; n], &edges).unwrap()
    }

    // -------------------------------------------------------------------------
    // Construction and validation
    // -------------------------------------------------------------------------

    #[test]
    fn from_edges_normalizes_duplicates_and_orientation() {
        let g = WeightedGraph::from_edges(vec![1, 2, 3], &[(0, 1), (1, 0), (2, 1)]).unwrap();
        assert_eq!(g.len(), 3);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.neighbors(1), &[0, 2]);
        assert!(g.has_edge(2, 1));
        assert!(!g.has_edge(0, 2));
        assert_eq!(g.total_weight(), 6);
    }

    #[test]
    fn from_edges_rejects_self_loop() {
        let err = WeightedGraph::from_edges(vec![1, 1], &[(1, 1)]).unwrap_err();
        assert!(matches!(err, GraphError::SelfLoop { vertex: 1 }));
    }

    #[test]
    fn from_edges_rejects_out_of_range() {
        let err = WeightedGraph::from_edges(vec![1, 1], &[(0, 2)]).unwrap_err();
        assert!(matches!(err, GraphError::VertexOutOfRange { vertex: 2, n: 2 }));
    }

    #[test]
    fn from_csr_rejects_asymmetric_lists() {
        let err = WeightedGraph::from_csr(vec![0, 1, 1], vec![1], vec![1, 1]).unwrap_err();
        assert!(matches!(err, GraphError::NotSymmetric { u: 0, v: 1 }));
    }

    #[test]
    fn from_csr_rejects_unsorted_lists() {
        let err = WeightedGraph::from_csr(
            vec![0, 2, 3, 4],
            vec![2, 1, 0, 0],
            vec![1, 1, 1],
        )
        .unwrap_err();
        assert!(matches!(err, GraphError::Unsorted { vertex: 0 }));
    }

    #[test]
    fn from_csr_rejects_bad_offsets_and_weights() {
        let err = WeightedGraph::from_csr(vec![0, 0], vec![], vec![1, 1]).unwrap_err();
        assert!(matches!(err, GraphError::Offsets(_)));
        let err = WeightedGraph::from_csr(vec![0, 0], vec![], vec![-3]).unwrap_err();
        assert!(matches!(err, GraphError::NegativeWeight { vertex: 0, weight: -3 }));
    }

    // -------------------------------------------------------------------------
    // Subgraphs
    // -------------------------------------------------------------------------

    #[test]
    fn subgraph_renumbers_in_increasing_order() {
        let g = path(5);
        let core = g.subgraph(&[false, true, true, false, true]);
        assert_eq!(core.reverse, vec![1, 2, 4]);
        assert_eq!(core.forward, vec![None, Some(0), Some(1), None, Some(2)]);
        assert_eq!(core.graph.edge_count(), 1);
        assert!(core.graph.has_edge(0, 1));
        assert_eq!(core.graph.degree(2), 0);
        assert!(core.graph.validate().is_ok());
    }

    #[test]
    fn subgraph_of_empty_mask_is_empty() {
        let g = path(4);
        let core = g.subgraph(&[false; 4]);
        assert!(core.is_empty());
        assert_eq!(core.graph.len(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn subgraph_maps_are_mutual_inverses(
            n in 1usize..40,
            raw_edges in prop::collection::vec((0usize..40, 0usize..40), 0..120),
            mask_bits in prop::collection::vec(any::<bool>(), 40),
        ) {
            let edges: Vec<_> = raw_edges
                .into_iter()
                .map(|(u, v)| (u % n, v % n))
                .filter(|(u, v)| u != v)
                .collect();
            let weights: Vec<i64> = (0..n as i64).map(|i| i % 7 + 1).collect();
            let g = WeightedGraph::from_edges(weights, &edges).unwrap();
            let mask = &mask_bits[..n];
            let core = g.subgraph(mask);

            for (c, &u) in core.reverse.iter().enumerate() {
                prop_assert_eq!(core.forward[u], Some(c));
                prop_assert!(mask[u]);
                prop_assert_eq!(core.graph.weight(c), g.weight(u));
            }
            for u in 0..n {
                prop_assert_eq!(core.forward[u].is_some(), mask[u]);
            }
            for c in 0..core.len() {
                for &d in core.graph.neighbors(c) {
                    prop_assert!(g.has_edge(core.reverse[c], core.reverse[d]));
                }
            }
            for &(u, v) in &edges {
                if mask[u] && mask[v] {
                    let (cu, cv) = (core.forward[u].unwrap(), core.forward[v].unwrap());
                    prop_assert!(core.graph.has_edge(cu, cv));
                }
            }
            prop_assert!(core.graph.validate().is_ok());
        }
    }

    // -------------------------------------------------------------------------
    // METIS parsing
    // -------------------------------------------------------------------------

    #[test]
    fn parse_metis_unweighted_triangle() {
        let text = "% a triangle\n3 3\n2 3\n1 3\n1 2\n";
        let g = WeightedGraph::parse_metis(text).unwrap();
        assert_eq!(g.len(), 3);
        assert_eq!(g.edge_count(), 3);
        assert_eq!(g.weights(), &[1, 1, 1]);
    }

    #[test]
    fn parse_metis_vertex_weights_and_isolated_vertex() {
        let text = "3 1 10\n5 2\n7 1\n9\n";
        let g = WeightedGraph::parse_metis(text).unwrap();
        assert_eq!(g.weights(), &[5, 7, 9]);
        assert!(g.has_edge(0, 1));
        assert_eq!(g.degree(2), 0);
    }

    #[test]
    fn parse_metis_skips_edge_weights() {
        let text = "2 1 11\n4 2 100\n6 1 100\n";
        let g = WeightedGraph::parse_metis(text).unwrap();
        assert_eq!(g.weights(), &[4, 6]);
        assert_eq!(g.neighbors(0), &[1]);
    }

    #[test]
    fn parse_metis_rejects_wrong_edge_count() {
        let err = WeightedGraph::parse_metis("2 2\n2\n1\n").unwrap_err();
        assert!(matches!(err, GraphError::EdgeCount { expected: 2, got: 1 }));
    }

    #[test]
    fn parse_metis_rejects_asymmetric_input() {
        let err = WeightedGraph::parse_metis("2 1\n2\n\n").unwrap_err();
        assert!(matches!(err, GraphError::EdgeCount { .. } | GraphError::NotSymmetric { .. }));
    }

    #[test]
    fn parse_metis_rejects_garbage() {
        let err = WeightedGraph::parse_metis("2 1\n2 x\n1\n").unwrap_err();
        assert!(matches!(err, GraphError::Parse { line: 2, .. }));
        assert!(matches!(WeightedGraph::parse_metis("% only\n"), Err(GraphError::MissingHeader)));
    }
}
