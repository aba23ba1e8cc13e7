//! # CHILS Local Search Engine
//!
//! Incremental local search for two dual problems on sparse graphs:
//!
//! - **Maximum weight independent set** (IS mode): select pairwise non-adjacent vertices of
//!   maximum total weight.
//! - **Minimum hitting set** (HS mode): select the fewest vertices such that every hyperedge
//!   contains at least one of them.
//!
//! This crate provides:
//! - Validated CSR graphs with METIS and PACE readers.
//! - Search replicas with O(degree) incremental bookkeeping, a tabu lock, a dirty-vertex
//!   queue and an exact per-episode undo log.
//! - The CHILS coordinator, which runs a population of IS replicas and re-optimizes the
//!   contested core on which they disagree.
//! - A simulated annealing warm start for hitting set.
//!
//! ## Quick Start
//!
//! ```
//! use chils::prelude::*;
//!
//! // Unit-weight 5-cycle: greedy reaches a maximal independent set of size 2.
//! let g = WeightedGraph::from_edges(vec![1; 5], &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 0)]).unwrap();
//! let mut r = IndependentSetReplica::new(&g, 42, LocalSearchConfig::for_independent_set());
//! r.greedy(&g);
//! assert_eq!(r.cost(), 2);
//! assert!(is_independent_set(&g, r.solution()));
//! ```
//!
//! ## Running CHILS
//!
//! ```no_run
//! use chils::prelude::*;
//! use std::sync::atomic::AtomicBool;
//! use std::time::Duration;
//!
//! let g = WeightedGraph::load_metis("graph.metis").unwrap();
//! let mut chils = Chils::new(&g, 0, ChilsConfig::default());
//! let report = chils.run(&g, &Budget::time(Duration::from_secs(60)), &AtomicBool::new(false));
//! println!("best weight {}", report.best_cost);
//! ```
//!
//! ## Modules
//!
//! - [`graph`]: Weighted CSR graph, induced subgraphs and the METIS reader.
//! - [`coverage`]: Hypergraph incidence structure and the PACE reader.
//! - [`queue`]: Dirty-vertex work queue.
//! - [`replica`]: Shared local search machinery (budgets, undo log, explore loop).
//! - [`mwis`]: Independent set replica.
//! - [`hitting`]: Hitting set replica.
//! - [`chils`]: Cooperative replica population.
//! - [`anneal`]: Simulated annealing for hitting set.
//! - [`validate`]: Independent solution checks.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::inline_always)] // Hot-path accessors
#![allow(clippy::many_single_char_names)] // Graph notation: g, u, v, e
#![allow(clippy::needless_range_loop)] // Often clearer for parallel arrays
#![allow(clippy::doc_markdown)]
#![allow(clippy::multiple_crate_versions)] // Cargo.lock management is external

pub mod anneal;
pub mod chils;
pub mod coverage;
pub mod graph;
pub mod hitting;
pub mod mwis;
pub mod queue;
pub mod replica;
pub mod validate;

/// Re-export commonly used types for convenience.
pub mod prelude {
    pub use crate::anneal::{AnnealConfig, Annealer};
    pub use crate::chils::{Chils, ChilsConfig, ChilsReport};
    pub use crate::coverage::CoverageGraph;
    pub use crate::graph::{CoreSubgraph, GraphBuilder, GraphError, WeightedGraph};
    pub use crate::hitting::HittingSetReplica;
    pub use crate::mwis::IndependentSetReplica;
    pub use crate::replica::{Budget, ExploreReport, LocalSearch, LocalSearchConfig, StopReason};
    pub use crate::validate::{
        check_hitting_set, check_independent_set, is_hitting_set, is_independent_set,
    };
}
