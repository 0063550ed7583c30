//! Recursive graph walks as a single SQLite recursive CTE.
//!
//! One query yields an interleaved stream of node rows (`()`) and edge rows
//! (`->` forward, `<-` backward). Edge rows are produced only from node rows
//! and node rows only from edge rows, so each edge row follows the node it
//! was walked from, and it carries that node explicitly in `origin`.

use std::collections::HashMap;

use rusqlite::params;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};

use crate::error::Result;
use crate::graph::store::GraphStore;
use crate::types::{Direction, TraversalStep};

/// Discriminator value of node rows.
pub const NODE_MARKER: &str = "()";

// ---------------------------------------------------------------------------
// Traversal options
// ---------------------------------------------------------------------------

/// Which edges to follow and whether node bodies ride along.
///
/// `inbound` and `outbound` are independent; set both for an undirected walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Traversal {
    pub with_bodies: bool,
    pub inbound: bool,
    pub outbound: bool,
}

impl Traversal {
    pub fn outbound() -> Self {
        Self {
            outbound: true,
            ..Self::default()
        }
    }

    pub fn inbound() -> Self {
        Self {
            inbound: true,
            ..Self::default()
        }
    }

    pub fn both() -> Self {
        Self {
            inbound: true,
            outbound: true,
            ..Self::default()
        }
    }

    pub fn with_bodies(mut self, with_bodies: bool) -> Self {
        self.with_bodies = with_bodies;
        self
    }

    fn index(&self) -> usize {
        (self.with_bodies as usize) << 2 | (self.inbound as usize) << 1 | self.outbound as usize
    }
}

// ---------------------------------------------------------------------------
// SQL generation
// ---------------------------------------------------------------------------

/// Build the recursive walk. Binds one parameter: the start identifier.
///
/// Columns: `x` (identifier), `y` (marker), `obj` (body or edge properties),
/// `origin` (node an edge row was reached from, NULL on node rows).
pub fn generate_traversal(traversal: &Traversal) -> String {
    let payload = if traversal.with_bodies {
        "nodes.body"
    } else {
        "NULL"
    };
    let mut sql = format!(
        "WITH RECURSIVE traverse(x, y, obj, origin) AS (
  SELECT nodes.id, '()', {payload}, NULL FROM nodes WHERE nodes.id = ?1
  UNION
  SELECT nodes.id, '()', {payload}, NULL FROM nodes
    JOIN traverse ON nodes.id = traverse.x WHERE traverse.y <> '()'"
    );
    if traversal.inbound {
        sql.push_str(
            "
  UNION
  SELECT edges.source, '<-', edges.properties, traverse.x FROM edges
    JOIN traverse ON edges.target = traverse.x WHERE traverse.y = '()'",
        );
    }
    if traversal.outbound {
        sql.push_str(
            "
  UNION
  SELECT edges.target, '->', edges.properties, traverse.x FROM edges
    JOIN traverse ON edges.source = traverse.x WHERE traverse.y = '()'",
        );
    }
    sql.push_str(
        "
)
SELECT x, y, obj, origin FROM traverse",
    );
    sql
}

/// Every traversal variant, generated once and owned by the store.
#[derive(Debug, Clone)]
pub struct TraversalTemplates {
    sql: Vec<String>,
}

impl TraversalTemplates {
    pub fn new() -> Self {
        let sql = (0..8usize)
            .map(|i| {
                generate_traversal(&Traversal {
                    with_bodies: i & 0b100 != 0,
                    inbound: i & 0b010 != 0,
                    outbound: i & 0b001 != 0,
                })
            })
            .collect();
        Self { sql }
    }

    pub fn get(&self, traversal: &Traversal) -> &str {
        &self.sql[traversal.index()]
    }
}

impl Default for TraversalTemplates {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

/// Typed form of the `y` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Node,
    Edge(Direction),
}

impl FromSql for Marker {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        if text == NODE_MARKER {
            return Ok(Self::Node);
        }
        Direction::from_marker(text)
            .map(Self::Edge)
            .ok_or_else(|| FromSqlError::Other(format!("unknown traversal marker {text:?}").into()))
    }
}

/// Turn one `(x, y, obj, origin)` row into a step. `cursor` tracks the last
/// node row and stands in for a missing origin.
fn decode_step(
    id: String,
    marker: Marker,
    payload: Option<String>,
    origin: Option<String>,
    cursor: &mut Option<String>,
) -> TraversalStep {
    match marker {
        Marker::Node => {
            *cursor = Some(id.clone());
            TraversalStep::Node { id, body: payload }
        }
        Marker::Edge(direction) => {
            let anchor = origin.or_else(|| cursor.clone()).unwrap_or_default();
            let (from, to) = match direction {
                Direction::Forward => (anchor, id),
                Direction::Backward => (id, anchor),
            };
            TraversalStep::Edge {
                direction,
                from,
                to,
                label: payload,
            }
        }
    }
}

/// Rebuild the walk from `source` to `target` out of a traversal stream.
///
/// The stream is breadth-first, so the first edge reaching a node lies on a
/// shortest path. Returns `None` when `target` never appears.
pub fn path_between(steps: &[TraversalStep], source: &str, target: &str) -> Option<Vec<String>> {
    if source == target {
        return steps
            .iter()
            .any(|s| s.node_id() == Some(source))
            .then(|| vec![source.to_string()]);
    }

    let mut predecessor: HashMap<&str, &str> = HashMap::new();
    for step in steps {
        if let TraversalStep::Edge {
            direction, from, to, ..
        } = step
        {
            let (anchor, reached) = match direction {
                Direction::Forward => (from.as_str(), to.as_str()),
                Direction::Backward => (to.as_str(), from.as_str()),
            };
            if reached != source {
                predecessor.entry(reached).or_insert(anchor);
            }
        }
    }

    let mut path = vec![target.to_string()];
    let mut current = target;
    while current != source {
        current = predecessor.get(current)?;
        path.push(current.to_string());
        if path.len() > predecessor.len() + 1 {
            return None;
        }
    }
    path.reverse();
    Some(path)
}

// ---------------------------------------------------------------------------
// GraphTraversal
// ---------------------------------------------------------------------------

/// Walks bound to a store. Each call re-reads the database.
pub struct GraphTraversal<'a> {
    store: &'a GraphStore,
}

impl<'a> GraphTraversal<'a> {
    pub fn new(store: &'a GraphStore) -> Self {
        Self { store }
    }

    /// Run a walk from `source`, stopping right after the node row for
    /// `target` when one is given.
    ///
    /// Stopping only ends reading; SQLite may already have computed more of
    /// the recursion than the returned prefix.
    pub fn walk(
        &self,
        source: &str,
        target: Option<&str>,
        traversal: Traversal,
    ) -> Result<Vec<TraversalStep>> {
        let conn = self.store.connection()?;
        let mut stmt = conn.prepare_cached(self.store.traversal_templates().get(&traversal))?;
        let mut rows = stmt.query(params![source])?;

        let mut steps = Vec::new();
        let mut cursor: Option<String> = None;
        while let Some(row) = rows.next()? {
            let step = decode_step(row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, &mut cursor);
            let reached = target.is_some() && step.node_id() == target;
            steps.push(step);
            if reached {
                break;
            }
        }
        tracing::debug!(
            "traversal from {} ({:?}) produced {} rows",
            source,
            traversal,
            steps.len()
        );
        Ok(steps)
    }

    /// Identifiers of every node reached from `source`, in walk order.
    pub fn traverse_from(&self, source: &str, traversal: Traversal) -> Result<Vec<String>> {
        self.node_ids(source, None, traversal)
    }

    /// Identifiers reached from `source`, ending at `target` if reached.
    pub fn traverse_from_to(
        &self,
        source: &str,
        target: &str,
        traversal: Traversal,
    ) -> Result<Vec<String>> {
        self.node_ids(source, Some(target), traversal)
    }

    /// Full tagged stream including node bodies.
    pub fn traverse_with_bodies_from(
        &self,
        source: &str,
        traversal: Traversal,
    ) -> Result<Vec<TraversalStep>> {
        self.walk(source, None, traversal.with_bodies(true))
    }

    pub fn traverse_with_bodies_from_to(
        &self,
        source: &str,
        target: &str,
        traversal: Traversal,
    ) -> Result<Vec<TraversalStep>> {
        self.walk(source, Some(target), traversal.with_bodies(true))
    }

    /// Shortest identifier path from `source` to `target` along the
    /// directions in `traversal`.
    pub fn find_path(
        &self,
        source: &str,
        target: &str,
        traversal: Traversal,
    ) -> Result<Option<Vec<String>>> {
        let steps = self.walk(source, Some(target), traversal.with_bodies(false))?;
        Ok(path_between(&steps, source, target))
    }

    fn node_ids(
        &self,
        source: &str,
        target: Option<&str>,
        traversal: Traversal,
    ) -> Result<Vec<String>> {
        let steps = self.walk(source, target, traversal.with_bodies(false))?;
        Ok(steps
            .into_iter()
            .filter_map(|step| match step {
                TraversalStep::Node { id, .. } => Some(id),
                TraversalStep::Edge { .. } => None,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
