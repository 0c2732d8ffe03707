//! Relationship graph derivation and edge-set merging.

pub mod extract;
pub mod store;

pub use extract::{extract_relations, EntityWatchlist};
pub use store::{merge_edges, MergeOutcome};

pub const CRATE_NAME: &str = "siga-graph";
