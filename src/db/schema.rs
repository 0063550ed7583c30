//! Schema initialization for the graph store.
//!
//! DDL is kept as separate statements so each one is prepared and executed
//! on its own and a failure names the statement that caused it.

use rusqlite::Connection;

use crate::error::{GraphError, Result};

// ---------------------------------------------------------------------------
// DDL constants
// ---------------------------------------------------------------------------

const CREATE_NODES: &str = "\
CREATE TABLE IF NOT EXISTS nodes (
  id TEXT PRIMARY KEY NOT NULL,
  body TEXT NOT NULL CHECK (json_valid(body))
)";

const CREATE_EDGES: &str = "\
CREATE TABLE IF NOT EXISTS edges (
  source TEXT NOT NULL,
  target TEXT NOT NULL,
  properties TEXT
)";

const CREATE_EDGES_SOURCE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source)";

const CREATE_EDGES_TARGET_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target)";

/// Named DDL statements, applied in order.
pub const SCHEMA: &[(&str, &str)] = &[
    ("create_nodes", CREATE_NODES),
    ("create_edges", CREATE_EDGES),
    ("create_edges_source_index", CREATE_EDGES_SOURCE_INDEX),
    ("create_edges_target_index", CREATE_EDGES_TARGET_INDEX),
];

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Apply the schema. Idempotent; safe on every process start.
///
/// Stops at the first failing statement. Earlier statements are not rolled
/// back.
///
/// # Errors
///
/// Returns [`GraphError::Schema`] naming the statement that failed to
/// prepare or execute.
pub fn initialize(conn: &Connection) -> Result<()> {
    for &(name, sql) in SCHEMA {
        let wrap = |source| GraphError::Schema {
            statement: name,
            source,
        };
        let mut stmt = conn.prepare(sql).map_err(wrap)?;
        stmt.execute([]).map_err(wrap)?;
    }
    tracing::debug!("graph schema applied ({} statements)", SCHEMA.len());
    Ok(())
}
