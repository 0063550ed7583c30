//! callgraph-db: a directed graph store for program call graphs on SQLite.
//!
//! Nodes are JSON documents keyed by a unique identifier; edges are
//! directed (source, target) pairs with optional JSON properties. On top of
//! that the crate offers a safe query builder for body lookups, a
//! recursive-CTE traversal engine, a full-graph export for viewers, and an
//! importer for call records produced by an external analysis.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod http;
pub mod ingest;
pub mod observability;
pub mod types;

pub use error::{GraphError, Result};
pub use graph::store::GraphStore;
pub use graph::traversal::Traversal;
