//! Independent checks of finished solutions.
//!
//! These recompute everything from the graph and the selection alone, without trusting any
//! counter a replica maintains.

use crate::coverage::CoverageGraph;
use crate::graph::WeightedGraph;

// ============================================================================
// Independent set
// ============================================================================

/// Returns `true` if no two selected vertices are adjacent.
///
/// # Panics
/// Panics if `solution.len() != g.len()`.
pub fn is_independent_set(g: &WeightedGraph, solution: &[bool]) -> bool {
    assert_eq!(solution.len(), g.len());
    (0..g.len()).all(|u| !solution[u] || g.neighbors(u).iter().all(|&v| !solution[v]))
}

/// Total weight of the selected vertices.
///
/// # Panics
/// Panics if `solution.len() != g.len()`.
pub fn independent_set_weight(g: &WeightedGraph, solution: &[bool]) -> i64 {
    assert_eq!(solution.len(), g.len());
    (0..g.len()).filter(|&u| solution[u]).map(|u| g.weight(u)).sum()
}

/// Checks that `solution` is an independent set of weight `cost`.
///
/// # Errors
/// Describes the first violated edge or the cost mismatch.
pub fn check_independent_set(g: &WeightedGraph, solution: &[bool], cost: i64) -> Result<(), String> {
    if solution.len() != g.len() {
        return Err(format!(
            "solution has {} entries, graph has {} vertices",
            solution.len(),
            g.len()
        ));
    }
    for u in (0..g.len()).filter(|&u| solution[u]) {
        if let Some(&v) = g.neighbors(u).iter().find(|&&v| solution[v]) {
            return Err(format!("adjacent vertices {} and {} are both selected", u + 1, v + 1));
        }
    }
    let weight = independent_set_weight(g, solution);
    if weight != cost {
        return Err(format!("reported cost {cost}, selected weight is {weight}"));
    }
    Ok(())
}

// ============================================================================
// Hitting set
// ============================================================================

/// Returns `true` if every hyperedge has at least one selected member.
///
/// # Panics
/// Panics if `solution.len()` differs from the vertex count.
pub fn is_hitting_set(g: &CoverageGraph, solution: &[bool]) -> bool {
    assert_eq!(solution.len(), g.vertex_count());
    (0..g.edge_count()).all(|e| g.members(e).iter().any(|&v| solution[v]))
}

/// Checks that `solution` hits every hyperedge with exactly `cost` vertices.
///
/// # Errors
/// Describes the first uncovered hyperedge or the cost mismatch.
pub fn check_hitting_set(g: &CoverageGraph, solution: &[bool], cost: i64) -> Result<(), String> {
    if solution.len() != g.vertex_count() {
        return Err(format!(
            "solution has {} entries, instance has {} vertices",
            solution.len(),
            g.vertex_count()
        ));
    }
    if let Some(e) = (0..g.edge_count()).find(|&e| g.members(e).iter().all(|&v| !solution[v])) {
        return Err(format!("hyperedge {} is not hit", e + 1));
    }
    let size = solution.iter().filter(|&&s| s).count() as i64;
    if size != cost {
        return Err(format!("reported cost {cost}, selection has {size} vertices"));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
