//! Hypergraphs stored as a single incidence CSR, plus PACE hitting/dominating set parsing.

use crate::graph::{GraphError, parse_number};
use rayon::prelude::*;
use std::fs;
use std::path::Path;

// ============================================================================
// CoverageGraph
// ============================================================================

/// A hypergraph with `n` vertices and `m` hyperedges in one CSR array.
///
/// Node `u < n` is a vertex; its row lists the ids of the hyperedges containing it.
/// Node `n + e` is hyperedge `e`; its row lists the member vertices. Both kinds of
/// rows are sorted and duplicate-free, and incidence is symmetric.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoverageGraph {
    n: usize,
    m: usize,
    offsets: Vec<usize>,
    incidence: Vec<usize>,
}

impl CoverageGraph {
    /// Builds a coverage graph from member lists (0-based); lists are sorted and deduplicated.
    ///
    /// # Errors
    /// Returns an error if a member is out of range or a hyperedge is empty.
    pub fn from_hyperedges(n: usize, edges: &[Vec<usize>]) -> Result<Self, GraphError> {
        let m = edges.len();
        let mut members: Vec<Vec<usize>> = edges.to_vec();
        members.par_iter_mut().for_each(|list| {
            list.sort_unstable();
            list.dedup();
        });

        let mut vertex_rows = vec![Vec::new(); n];
        for (e, list) in members.iter().enumerate() {
            if list.is_empty() {
                return Err(GraphError::EmptyHyperedge { edge: e });
            }
            for &u in list {
                if u >= n {
                    return Err(GraphError::VertexOutOfRange { vertex: u, n });
                }
                vertex_rows[u].push(e);
            }
        }

        let mut offsets = Vec::with_capacity(n + m + 1);
        let mut incidence = Vec::new();
        offsets.push(0);
        for row in vertex_rows.iter().chain(members.iter()) {
            incidence.extend_from_slice(row);
            offsets.push(incidence.len());
        }

        let g = Self {
            n,
            m,
            offsets,
            incidence,
        };
        g.validate()?;
        Ok(g)
    }

    /// Returns the number of vertices.
    #[inline(always)]
    pub fn vertex_count(&self) -> usize {
        self.n
    }

    /// Returns the number of hyperedges.
    #[inline(always)]
    pub fn edge_count(&self) -> usize {
        self.m
    }

    /// Returns the ids of the hyperedges containing `u`.
    #[inline(always)]
    pub fn edges_of(&self, u: usize) -> &[usize] {
        debug_assert!(u < self.n);
        &self.incidence[self.offsets[u]..self.offsets[u + 1]]
    }

    /// Returns the member vertices of hyperedge `e`.
    #[inline(always)]
    pub fn members(&self, e: usize) -> &[usize] {
        debug_assert!(e < self.m);
        let node = self.n + e;
        &self.incidence[self.offsets[node]..self.offsets[node + 1]]
    }

    /// Returns the number of hyperedges containing `u`.
    #[inline(always)]
    pub fn vertex_degree(&self, u: usize) -> usize {
        self.offsets[u + 1] - self.offsets[u]
    }

    /// Returns the number of members of hyperedge `e`.
    #[inline(always)]
    pub fn edge_degree(&self, e: usize) -> usize {
        let node = self.n + e;
        self.offsets[node + 1] - self.offsets[node]
    }

    /// Checks every structural invariant of the incidence structure.
    ///
    /// # Errors
    /// Returns the first violation encountered.
    pub fn validate(&self) -> Result<(), GraphError> {
        let (n, m) = (self.n, self.m);
        if self.offsets.len() != n + m + 1
            || self.offsets[0] != 0
            || self.offsets[n + m] != self.incidence.len()
            || self.offsets.windows(2).any(|w| w[0] > w[1])
        {
            return Err(GraphError::Offsets("incidence offsets are inconsistent".to_string()));
        }

        (0..n).into_par_iter().try_for_each(|u| {
            let row = self.edges_of(u);
            for (i, &e) in row.iter().enumerate() {
                if e >= m {
                    return Err(GraphError::Offsets(format!("vertex {u} lists hyperedge {e} >= {m}")));
                }
                if i > 0 && row[i - 1] >= e {
                    return Err(GraphError::Unsorted { vertex: u });
                }
                if self.members(e).binary_search(&u).is_err() {
                    return Err(GraphError::NotSymmetric { u, v: n + e });
                }
            }
            Ok(())
        })?;

        (0..m).into_par_iter().try_for_each(|e| {
            let row = self.members(e);
            if row.is_empty() {
                return Err(GraphError::EmptyHyperedge { edge: e });
            }
            for (i, &u) in row.iter().enumerate() {
                if u >= n {
                    return Err(GraphError::VertexOutOfRange { vertex: u, n });
                }
                if i > 0 && row[i - 1] >= u {
                    return Err(GraphError::Unsorted { vertex: n + e });
                }
                if self.edges_of(u).binary_search(&e).is_err() {
                    return Err(GraphError::NotSymmetric { u: n + e, v: u });
                }
            }
            Ok(())
        })
    }

    // ------------------------------------------------------------------------
    // PACE input
    // ------------------------------------------------------------------------

    /// Parses a PACE hitting set (`p hs n m`) or dominating set (`p ds n m`) instance.
    ///
    /// Lines starting with `c` are comments. A hitting set body has one line of 1-based
    /// member ids per hyperedge. A dominating set body has one `u v` line per graph edge and
    /// is converted into one hyperedge per vertex: its closed neighborhood.
    ///
    /// # Errors
    /// Returns an error if the text is malformed.
    pub fn parse_pace(text: &str) -> Result<Self, GraphError> {
        let mut lines = text
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim_start().starts_with('c'));

        let (header_line, header) = lines.next().ok_or(GraphError::MissingHeader)?;
        let fields: Vec<&str> = header.split_whitespace().collect();
        let (kind, n, m) = match fields.as_slice() {
            ["p", kind @ ("hs" | "ds"), n, m, ..] => (
                *kind,
                parse_number::<usize>(n, header_line)?,
                parse_number::<usize>(m, header_line)?,
            ),
            _ => return Err(GraphError::MissingHeader),
        };

        let mut body = Vec::with_capacity(m);
        for i in 0..m {
            let (line_no, line) = lines.next().ok_or_else(|| GraphError::Parse {
                line: text.lines().count(),
                message: format!("expected {m} body lines, found {i}"),
            })?;
            let ids = line
                .split_whitespace()
                .map(|t| {
                    let v = parse_number::<usize>(t, line_no)?;
                    if v == 0 || v > n {
                        return Err(GraphError::Parse {
                            line: line_no + 1,
                            message: format!("vertex {v} outside 1..={n}"),
                        });
                    }
                    Ok(v - 1)
                })
                .collect::<Result<Vec<_>, _>>()?;
            body.push((line_no, ids));
        }

        if kind == "hs" {
            let edges: Vec<Vec<usize>> = body.into_iter().map(|(_, ids)| ids).collect();
            return Self::from_hyperedges(n, &edges);
        }

        let mut closed: Vec<Vec<usize>> = (0..n).map(|u| vec![u]).collect();
        for (line_no, ids) in body {
            let &[u, v] = ids.as_slice() else {
                return Err(GraphError::Parse {
                    line: line_no + 1,
                    message: "expected an edge `u v`".to_string(),
                });
            };
            closed[u].push(v);
            closed[v].push(u);
        }
        Self::from_hyperedges(n, &closed)
    }

    /// Reads and parses a PACE instance file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is malformed.
    pub fn load_pace(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let text = fs::read_to_string(path)?;
        Self::parse_pace(&text)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_hyperedges_builds_both_directions() {
        let g = CoverageGraph::from_hyperedges(4, &[vec![2, 0, 1, 0], vec![3], vec![1, 3]]).unwrap();
        assert_eq!(g.vertex_count(), 4);
        assert_eq!(g.edge_count(), 3);
        assert_eq!(g.members(0), &[0, 1, 2]);
        assert_eq!(g.edges_of(1), &[0, 2]);
        assert_eq!(g.edges_of(3), &[1, 2]);
        assert_eq!(g.edge_degree(0), 3);
        assert_eq!(g.vertex_degree(0), 1);
        assert!(g.validate().is_ok());
    }

    #[test]
    fn from_hyperedges_rejects_empty_and_out_of_range() {
        let err = CoverageGraph::from_hyperedges(2, &[vec![0], vec![]]).unwrap_err();
        assert!(matches!(err, GraphError::EmptyHyperedge { edge: 1 }));
        let err = CoverageGraph::from_hyperedges(2, &[vec![5]]).unwrap_err();
        assert!(matches!(err, GraphError::VertexOutOfRange { vertex: 5, n: 2 }));
    }

    #[test]
    fn parse_pace_hitting_set() {
        let text = "c example\np hs 4 2\n1 2 3\nc inline comment\n4 1\n";
        let g = CoverageGraph::parse_pace(text).unwrap();
        assert_eq!(g.vertex_count(), 4);
        assert_eq!(g.members(0), &[0, 1, 2]);
        assert_eq!(g.members(1), &[0, 3]);
    }

    #[test]
    fn parse_pace_dominating_set_uses_closed_neighborhoods() {
        let text = "p ds 3 2\n1 2\n2 3\n";
        let g = CoverageGraph::parse_pace(text).unwrap();
        assert_eq!(g.edge_count(), 3);
        assert_eq!(g.members(0), &[0, 1]);
        assert_eq!(g.members(1), &[0, 1, 2]);
        assert_eq!(g.members(2), &[1, 2]);
    }

    #[test]
    fn parse_pace_rejects_bad_input() {
        assert!(matches!(CoverageGraph::parse_pace("p xx 1 1\n1\n"), Err(GraphError::MissingHeader)));
        let err = CoverageGraph::parse_pace("p hs 2 1\n3\n").unwrap_err();
        assert!(matches!(err, GraphError::Parse { line: 2, .. }));
        let err = CoverageGraph::parse_pace("p ds 2 1\n1 2 1\n").unwrap_err();
        assert!(matches!(err, GraphError::Parse { line: 2, .. }));
        let err = CoverageGraph::parse_pace("p hs 2 2\n1\n").unwrap_err();
        assert!(matches!(err, GraphError::Parse { .. }));
    }
}
