//! HNSW (Hierarchical Navigable Small World) graph algorithms.
//!
//! Storage-agnostic: [`Writer`](crate::Writer) and [`Searcher`](crate::Searcher)
//! expose their nodes through [`GraphReader`] and share these routines.

pub mod backlinks;
pub mod graph;
pub mod neighbor_queue;
pub mod select;

pub use backlinks::Backlinks;
pub use graph::{distance_to, greedy_descend, random_level, search_layer, GraphReader};
pub use neighbor_queue::Neighbor;
pub use select::{select_neighbors, Candidate};
