//! Core domain types for the call-graph store.
//!
//! Rows are kept as JSON text. Nothing here caches graph state; every value
//! is a snapshot of what a query returned.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// A graph vertex as stored: identifier plus JSON body text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub body: String,
}

/// A directed edge as exported to viewers: endpoints only. Edge properties
/// stay reachable through [`EdgeData`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

/// One-hop neighbor record returned by the connection queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeData {
    pub source: String,
    pub target: String,
    pub label: Option<String>,
}

/// Aggregate counts for the stored graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
}

// ---------------------------------------------------------------------------
// Traversal stream
// ---------------------------------------------------------------------------

/// Orientation of an edge row relative to the node it was reached from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Followed an outbound edge (`->`).
    Forward,
    /// Followed an inbound edge (`<-`).
    Backward,
}

impl Direction {
    pub fn marker(&self) -> &'static str {
        match self {
            Self::Forward => "->",
            Self::Backward => "<-",
        }
    }

    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "->" => Some(Self::Forward),
            "<-" => Some(Self::Backward),
            _ => None,
        }
    }
}

/// One row of a traversal stream.
///
/// Edge rows always name both endpoints in source/target order, whatever
/// direction they were walked in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TraversalStep {
    Node {
        id: String,
        body: Option<String>,
    },
    Edge {
        direction: Direction,
        from: String,
        to: String,
        label: Option<String>,
    },
}

impl TraversalStep {
    /// Identifier of a node row, `None` for edge rows.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::Node { id, .. } => Some(id),
            Self::Edge { .. } => None,
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Self::Node { .. })
    }
}

// ---------------------------------------------------------------------------
// Export DTO
// ---------------------------------------------------------------------------

/// The whole graph, as served to an external viewer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphResponse {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}
