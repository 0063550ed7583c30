//! SQLite CRUD layer for the call graph.
//!
//! Nodes are `(id, body)` rows with a JSON body that repeats the id; edges
//! are `(source, target, properties)` rows with no uniqueness on the pair.
//! Every statement goes through [`rusqlite::Connection::prepare_cached`], and
//! every multi-statement write runs in one transaction that rolls back when
//! dropped uncommitted.

use std::borrow::Cow;
use std::collections::HashSet;

use rusqlite::{ffi, params, params_from_iter, Connection, TransactionBehavior};
use serde::de::IgnoredAny;

use crate::config::StoreConfig;
use crate::db::pool::{self, PooledConnection, SqlitePool};
use crate::db::schema;
use crate::error::{GraphError, Result};
use crate::graph::codec;
use crate::graph::query::{
    generate_search_statement, generate_where_clause, ResultColumn, SearchQuery, WhereClause,
};
use crate::graph::traversal::{GraphTraversal, TraversalTemplates};
use crate::types::{EdgeData, GraphStats};

// ---------------------------------------------------------------------------
// SQL constants
// ---------------------------------------------------------------------------

const INSERT_NODE_SQL: &str = "INSERT INTO nodes (id, body) VALUES (?1, ?2)";

const UPDATE_NODE_SQL: &str = "UPDATE nodes SET body = ?1 WHERE id = ?2";

const INSERT_EDGE_SQL: &str = "INSERT INTO edges (source, target, properties) VALUES (?1, ?2, ?3)";

const DELETE_EDGES_SQL: &str = "DELETE FROM edges WHERE source = ?1 OR target = ?1";

const DELETE_NODE_SQL: &str = "DELETE FROM nodes WHERE id = ?1";

const NODE_EXISTS_SQL: &str = "SELECT 1 FROM nodes WHERE id = ?1";

const SEARCH_EDGES_OUTBOUND_SQL: &str =
    "SELECT source, target, properties FROM edges WHERE source = ?1 ORDER BY rowid";

const SEARCH_EDGES_INBOUND_SQL: &str =
    "SELECT source, target, properties FROM edges WHERE target = ?1 ORDER BY rowid";

const SEARCH_EDGES_SQL: &str =
    "SELECT source, target, properties FROM edges WHERE source = ?1 OR target = ?1 ORDER BY rowid";

/// Properties stored when an edge is inserted without any.
pub const EMPTY_PROPERTIES: &str = "{}";

/// Rows per multi-row INSERT; keeps bound parameters well under SQLite's
/// variable limit.
const ROWS_PER_STATEMENT: usize = 300;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `INSERT ... VALUES (?, ?), (?, ?), ...` with `rows` tuples of `width`
/// placeholders each.
fn bulk_insert_sql(prefix: &str, width: usize, rows: usize) -> String {
    let tuple = format!("({})", vec!["?"; width].join(", "));
    let mut sql = String::with_capacity(prefix.len() + rows * (tuple.len() + 2));
    sql.push_str(prefix);
    for i in 0..rows {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&tuple);
    }
    sql
}

fn check_lengths(operation: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(GraphError::LengthMismatch {
            operation,
            expected,
            actual,
        });
    }
    Ok(())
}

fn check_identifier(identifier: &str) -> Result<()> {
    if identifier.is_empty() {
        return Err(GraphError::MissingIdentifier);
    }
    Ok(())
}

/// Body lookup by id; the no-rows signal becomes [`GraphError::NotFound`].
fn find_body(conn: &Connection, sql: &str, identifier: &str) -> Result<String> {
    let mut stmt = conn.prepare_cached(sql)?;
    stmt.query_row(params![identifier], |row| row.get(0))
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => GraphError::NotFound(identifier.to_string()),
            other => GraphError::Sqlite(other),
        })
}

/// Identifier of the row that made a multi-row node insert fail.
///
/// A key conflict belongs to the first id already present; a CHECK failure
/// belongs to the first body that is not valid JSON. Falls back to the
/// first id of the chunk.
fn bulk_insert_culprit<'a, I: AsRef<str>>(
    conn: &Connection,
    err: &rusqlite::Error,
    ids: &'a [I],
    bodies: &[Cow<'_, str>],
) -> &'a str {
    let extended = match err {
        rusqlite::Error::SqliteFailure(e, _) => e.extended_code,
        _ => return ids[0].as_ref(),
    };
    let found = match extended {
        ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE => ids
            .iter()
            .map(AsRef::as_ref)
            .find(|id| {
                conn.prepare_cached(NODE_EXISTS_SQL)
                    .and_then(|mut s| s.exists(params![id]))
                    .unwrap_or(false)
            }),
        ffi::SQLITE_CONSTRAINT_CHECK => ids
            .iter()
            .zip(bodies)
            .find(|(_, body)| serde_json::from_str::<IgnoredAny>(body).is_err())
            .map(|(id, _)| id.as_ref()),
        _ => None,
    };
    found.unwrap_or_else(|| ids[0].as_ref())
}

fn query_edges(conn: &Connection, sql: &str, identifier: &str) -> Result<Vec<EdgeData>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params![identifier], |row| {
        Ok(EdgeData {
            source: row.get(0)?,
            target: row.get(1)?,
            label: row.get(2)?,
        })
    })?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Into::into)
}

// ---------------------------------------------------------------------------
// GraphStore
// ---------------------------------------------------------------------------

/// Typed access to the node/edge tables.
///
/// Holds the connection pool plus the statements generated once at startup
/// (by-id lookup, all traversal variants). Nothing about the graph itself is
/// cached: every call re-reads the database.
pub struct GraphStore {
    pool: SqlitePool,
    find_node_sql: String,
    traversals: TraversalTemplates,
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl GraphStore {
    /// Open the database described by `config` and apply the schema.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        Self::from_pool(pool::open(config)?)
    }

    /// Fresh private in-memory store.
    pub fn in_memory() -> Result<Self> {
        Self::open(&StoreConfig::in_memory())
    }

    /// Wrap an existing pool. The schema is applied (idempotently).
    pub fn from_pool(pool: SqlitePool) -> Result<Self> {
        schema::initialize(&*pool.get()?)?;
        let find_node_sql = generate_search_statement(&SearchQuery {
            result_column: ResultColumn::Body,
            clauses: vec![generate_where_clause(&WhereClause::id())?],
            ..SearchQuery::default()
        })?;
        Ok(Self {
            pool,
            find_node_sql,
            traversals: TraversalTemplates::new(),
        })
    }

    /// Check out a pooled connection. Released when the guard drops.
    ///
    /// Every store method checks out its own connection. On an in-memory
    /// store the pool holds a single connection, so while a caller keeps this
    /// guard alive any other store call on the same store waits up to
    /// `checkout_timeout_ms` and then fails with [`GraphError::Pool`].
    pub fn connection(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    pub fn traversal_templates(&self) -> &TraversalTemplates {
        &self.traversals
    }

    pub fn traversal(&self) -> GraphTraversal<'_> {
        GraphTraversal::new(self)
    }

    // -------------------------------------------------------------------
    // Nodes
    // -------------------------------------------------------------------

    /// Insert one node, setting the body's `id` to `identifier`.
    ///
    /// # Errors
    ///
    /// [`GraphError::DuplicateIdentifier`] when the id already exists; the
    /// stored body is left untouched.
    pub fn add_node(&self, identifier: &str, body: &str) -> Result<()> {
        check_identifier(identifier)?;
        let body = codec::with_identifier(body, identifier);
        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(INSERT_NODE_SQL)?;
        stmt.execute(params![identifier, &*body])
            .map_err(|e| GraphError::from_node_write(e, identifier))?;
        tracing::debug!("added node {identifier}");
        Ok(())
    }

    /// Insert many nodes in one transaction. All or nothing.
    ///
    /// # Errors
    ///
    /// [`GraphError::LengthMismatch`] when the slices differ in length,
    /// before anything is written.
    pub fn add_nodes<I, B>(&self, identifiers: &[I], bodies: &[B]) -> Result<usize>
    where
        I: AsRef<str>,
        B: AsRef<str>,
    {
        check_lengths("add_nodes", identifiers.len(), bodies.len())?;
        let mut seen = HashSet::with_capacity(identifiers.len());
        for id in identifiers {
            let id = id.as_ref();
            check_identifier(id)?;
            if !seen.insert(id) {
                return Err(GraphError::DuplicateIdentifier(id.to_string()));
            }
        }
        if identifiers.is_empty() {
            return Ok(0);
        }

        let prepared: Vec<_> = identifiers
            .iter()
            .zip(bodies)
            .map(|(id, body)| codec::with_identifier(body.as_ref(), id.as_ref()))
            .collect();

        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        for (ids, bodies) in identifiers
            .chunks(ROWS_PER_STATEMENT)
            .zip(prepared.chunks(ROWS_PER_STATEMENT))
        {
            let sql = bulk_insert_sql("INSERT INTO nodes (id, body) VALUES ", 2, ids.len());
            let mut stmt = tx.prepare_cached(&sql)?;
            let values = ids
                .iter()
                .zip(bodies)
                .flat_map(|(id, body)| [id.as_ref(), &**body]);
            match stmt.execute(params_from_iter(values)) {
                Ok(n) => inserted += n,
                Err(e) => {
                    let culprit = bulk_insert_culprit(&tx, &e, ids, bodies);
                    return Err(GraphError::from_node_write(e, culprit));
                }
            }
        }
        tx.commit()?;
        tracing::debug!("added {inserted} nodes");
        Ok(inserted)
    }

    /// Replace a node's body in place.
    pub fn update_node_body(&self, identifier: &str, body: &str) -> Result<()> {
        let body = codec::with_identifier(body, identifier);
        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(UPDATE_NODE_SQL)?;
        let changed = stmt
            .execute(params![&*body, identifier])
            .map_err(|e| GraphError::from_node_write(e, identifier))?;
        if changed == 0 {
            return Err(GraphError::NotFound(identifier.to_string()));
        }
        Ok(())
    }

    /// Insert the node if absent, otherwise overwrite its body.
    ///
    /// Existence is decided by the lookup returning no rows, never by the
    /// body's content. Lookup and write share one IMMEDIATE transaction, so
    /// concurrent upserts of the same id cannot both take the insert branch.
    pub fn upsert_node(&self, identifier: &str, body: &str) -> Result<()> {
        check_identifier(identifier)?;
        let body = codec::with_identifier(body, identifier);
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists = match find_body(&tx, &self.find_node_sql, identifier) {
            Ok(_) => true,
            Err(GraphError::NotFound(_)) => false,
            Err(e) => return Err(e),
        };
        let sql = if exists { UPDATE_NODE_SQL } else { INSERT_NODE_SQL };
        {
            let mut stmt = tx.prepare_cached(sql)?;
            let result = if exists {
                stmt.execute(params![&*body, identifier])
            } else {
                stmt.execute(params![identifier, &*body])
            };
            result.map_err(|e| GraphError::from_node_write(e, identifier))?;
        }
        tx.commit()?;
        tracing::debug!(
            "upserted node {identifier} ({})",
            if exists { "updated" } else { "inserted" }
        );
        Ok(())
    }

    /// Delete nodes and every edge touching them, as one transaction.
    ///
    /// Returns the number of node rows removed.
    ///
    /// # Errors
    ///
    /// [`GraphError::RemovalFailed`] naming the identifier whose statement
    /// failed. Nothing from the batch is applied in that case.
    pub fn remove_nodes<I: AsRef<str>>(&self, identifiers: &[I]) -> Result<usize> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        for id in identifiers {
            let id = id.as_ref();
            let failed = |source| GraphError::RemovalFailed {
                identifier: id.to_string(),
                source,
            };
            tx.prepare_cached(DELETE_EDGES_SQL)
                .and_then(|mut stmt| stmt.execute(params![id]))
                .map_err(failed)?;
            removed += tx
                .prepare_cached(DELETE_NODE_SQL)
                .and_then(|mut stmt| stmt.execute(params![id]))
                .map_err(failed)?;
        }
        tx.commit()?;
        tracing::debug!("removed {removed} of {} nodes", identifiers.len());
        Ok(removed)
    }

    /// Body of the node, or [`GraphError::NotFound`].
    pub fn find_node(&self, identifier: &str) -> Result<String> {
        find_body(&*self.connection()?, &self.find_node_sql, identifier)
    }

    /// Run a parametrized single-column statement and collect the column.
    pub fn find_nodes(&self, statement: &str, bindings: &[&str]) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(statement)?;
        let rows = stmt.query_map(params_from_iter(bindings.iter()), |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Generate the statement for `query` and run it with `bindings`.
    pub fn search_nodes(&self, query: &SearchQuery, bindings: &[&str]) -> Result<Vec<String>> {
        let statement = generate_search_statement(query)?;
        self.find_nodes(&statement, bindings)
    }

    // -------------------------------------------------------------------
    // Edges
    // -------------------------------------------------------------------

    /// Connect `source` to `target` with empty properties.
    pub fn add_edge(&self, source: &str, target: &str) -> Result<()> {
        self.add_edge_with_properties(source, target, EMPTY_PROPERTIES)
    }

    /// Insert one edge. Parallel edges are allowed.
    pub fn add_edge_with_properties(
        &self,
        source: &str,
        target: &str,
        properties: &str,
    ) -> Result<()> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(INSERT_EDGE_SQL)?;
        stmt.execute(params![source, target, properties])?;
        Ok(())
    }

    /// Bulk form of [`Self::add_edge`].
    pub fn add_edges<S, T>(&self, sources: &[S], targets: &[T]) -> Result<usize>
    where
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let properties = vec![EMPTY_PROPERTIES; sources.len()];
        self.add_edges_with_properties(sources, targets, &properties)
    }

    /// Insert many edges in one transaction. All or nothing.
    ///
    /// # Errors
    ///
    /// [`GraphError::LengthMismatch`] when the three slices differ in
    /// length, before anything is written.
    pub fn add_edges_with_properties<S, T, P>(
        &self,
        sources: &[S],
        targets: &[T],
        properties: &[P],
    ) -> Result<usize>
    where
        S: AsRef<str>,
        T: AsRef<str>,
        P: AsRef<str>,
    {
        check_lengths("add_edges", sources.len(), targets.len())?;
        check_lengths("add_edges", sources.len(), properties.len())?;
        if sources.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        for start in (0..sources.len()).step_by(ROWS_PER_STATEMENT) {
            let end = (start + ROWS_PER_STATEMENT).min(sources.len());
            let sql = bulk_insert_sql(
                "INSERT INTO edges (source, target, properties) VALUES ",
                3,
                end - start,
            );
            let mut stmt = tx.prepare_cached(&sql)?;
            let values = (start..end).flat_map(|i| {
                [
                    sources[i].as_ref(),
                    targets[i].as_ref(),
                    properties[i].as_ref(),
                ]
            });
            inserted += stmt.execute(params_from_iter(values))?;
        }
        tx.commit()?;
        tracing::debug!("added {inserted} edges");
        Ok(inserted)
    }

    /// Edges pointing at `identifier`.
    pub fn connections_in(&self, identifier: &str) -> Result<Vec<EdgeData>> {
        query_edges(&*self.connection()?, SEARCH_EDGES_INBOUND_SQL, identifier)
    }

    /// Edges leaving `identifier`.
    pub fn connections_out(&self, identifier: &str) -> Result<Vec<EdgeData>> {
        query_edges(&*self.connection()?, SEARCH_EDGES_OUTBOUND_SQL, identifier)
    }

    /// Edges touching `identifier` in either direction.
    pub fn connections(&self, identifier: &str) -> Result<Vec<EdgeData>> {
        query_edges(&*self.connection()?, SEARCH_EDGES_SQL, identifier)
    }

    // -------------------------------------------------------------------
    // Counts
    // -------------------------------------------------------------------

    pub fn stats(&self) -> Result<GraphStats> {
        let conn = self.connection()?;
        let nodes: i64 = conn
            .prepare_cached("SELECT count(*) FROM nodes")?
            .query_row([], |row| row.get(0))?;
        let edges: i64 = conn
            .prepare_cached("SELECT count(*) FROM edges")?
            .query_row([], |row| row.get(0))?;
        Ok(GraphStats {
            nodes: nodes as usize,
            edges: edges as usize,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::query::{Lookup, Predicate};
    use pretty_assertions::assert_eq;

    fn setup() -> GraphStore {
        GraphStore::in_memory().expect("in-memory store")
    }

    #[test]
    fn bulk_sql_shape() {
        assert_eq!(
            bulk_insert_sql("INSERT INTO nodes (id, body) VALUES ", 2, 3),
            "INSERT INTO nodes (id, body) VALUES (?, ?), (?, ?), (?, ?)"
        );
    }

    #[test]
    fn add_node_injects_identifier() {
        let store = setup();
        store.add_node("x", "{}").unwrap();
        assert_eq!(store.find_node("x").unwrap(), r#"{"id":"x"}"#);
    }

    #[test]
    fn add_node_keeps_existing_identifier() {
        let store = setup();
        let body = r#"{"id":"pkg.main","name":"main","type":"func"}"#;
        store.add_node("pkg.main", body).unwrap();
        assert_eq!(store.find_node("pkg.main").unwrap(), body);
    }

    #[test]
    fn duplicate_add_is_rejected_and_not_overwritten() {
        let store = setup();
        store.add_node("a", r#"{"v":1}"#).unwrap();
        let err = store.add_node("a", r#"{"v":2}"#).unwrap_err();
        assert!(err.is_duplicate(), "got {err}");
        assert_eq!(store.find_node("a").unwrap(), r#"{"v":1,"id":"a"}"#);
    }

    #[test]
    fn empty_identifier_is_missing() {
        let store = setup();
        assert!(matches!(
            store.add_node("", "{}"),
            Err(GraphError::MissingIdentifier)
        ));
    }

    #[test]
    fn malformed_body_rejected_by_store() {
        let store = setup();
        let err = store.add_node("bad", "{not json").unwrap_err();
        assert!(matches!(err, GraphError::MalformedBody(ref id) if id == "bad"));
    }

    #[test]
    fn find_node_missing_is_not_found() {
        let store = setup();
        let err = store.find_node("ghost").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn add_nodes_bulk() {
        let store = setup();
        let ids: Vec<String> = (0..700).map(|i| format!("n{i}")).collect();
        let bodies = vec!["{}"; ids.len()];
        assert_eq!(store.add_nodes(&ids, &bodies).unwrap(), 700);
        assert_eq!(store.stats().unwrap().nodes, 700);
        assert_eq!(store.find_node("n699").unwrap(), r#"{"id":"n699"}"#);
    }

    #[test]
    fn add_nodes_length_mismatch() {
        let store = setup();
        let err = store.add_nodes(&["a", "b"], &["{}"]).unwrap_err();
        assert!(matches!(
            err,
            GraphError::LengthMismatch {
                operation: "add_nodes",
                expected: 2,
                actual: 1
            }
        ));
        assert_eq!(store.stats().unwrap().nodes, 0);
    }

    #[test]
    fn add_nodes_is_all_or_nothing() {
        let store = setup();
        store.add_node("b", "{}").unwrap();
        let err = store.add_nodes(&["a", "b", "c"], &["{}", "{}", "{}"]).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateIdentifier(ref id) if id == "b"));
        assert!(store.find_node("a").unwrap_err().is_not_found());
        assert_eq!(store.stats().unwrap().nodes, 1);
    }

    #[test]
    fn add_nodes_blames_the_malformed_body() {
        let store = setup();
        let err = store
            .add_nodes(&["good", "bad"], &["{}", "{not json"])
            .unwrap_err();
        assert!(matches!(err, GraphError::MalformedBody(ref id) if id == "bad"), "{err}");
        assert_eq!(store.stats().unwrap().nodes, 0);
    }

    #[test]
    fn add_nodes_malformed_body_is_not_blamed_on_existing_row() {
        let store = setup();
        store.add_node("c", "{}").unwrap();
        let err = store
            .add_nodes(&["a", "b", "c"], &["{}", "[broken", "{}"])
            .unwrap_err();
        assert!(matches!(err, GraphError::MalformedBody(ref id) if id == "b"), "{err}");
        assert_eq!(store.stats().unwrap().nodes, 1);
    }

    #[test]
    fn busy_connection_times_out_instead_of_hanging() {
        let store = GraphStore::open(&StoreConfig {
            checkout_timeout_ms: 50,
            ..StoreConfig::in_memory()
        })
        .unwrap();
        store.add_node("x", "{}").unwrap();

        let held = store.connection().unwrap();
        let err = store.find_node("x").unwrap_err();
        assert!(matches!(err, GraphError::Pool(_)), "{err}");
        drop(held);
        assert_eq!(store.find_node("x").unwrap(), r#"{"id":"x"}"#);
    }

    #[test]
    fn add_nodes_duplicate_within_batch() {
        let store = setup();
        let err = store.add_nodes(&["a", "a"], &["{}", "{}"]).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateIdentifier(ref id) if id == "a"));
    }

    #[test]
    fn add_edges_bulk_and_parallel_edges() {
        let store = setup();
        let n = store
            .add_edges(&["a", "a", "b"], &["b", "b", "c"])
            .unwrap();
        assert_eq!(n, 3);
        let out = store.connections_out("a").unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| e.label.as_deref() == Some("{}")));
    }

    #[test]
    fn add_edges_rejects_mismatch() {
        let store = setup();
        let err = store
            .add_edges(&["a", "b", "c"], &["x", "y"])
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::LengthMismatch {
                expected: 3,
                actual: 2,
                ..
            }
        ));
        assert_eq!(store.stats().unwrap().edges, 0);
    }

    #[test]
    fn add_edges_with_properties_mismatch() {
        let store = setup();
        let err = store
            .add_edges_with_properties(&["a"], &["b"], &["{}", "{}"])
            .unwrap_err();
        assert!(matches!(err, GraphError::LengthMismatch { .. }));
    }

    #[test]
    fn connections_in_out_and_both() {
        let store = setup();
        store.add_edge("a", "b").unwrap();
        store.add_edge_with_properties("c", "b", r#"{"w":2}"#).unwrap();
        store.add_edge("b", "d").unwrap();

        let incoming = store.connections_in("b").unwrap();
        assert_eq!(
            incoming,
            vec![
                EdgeData {
                    source: "a".into(),
                    target: "b".into(),
                    label: Some("{}".into()),
                },
                EdgeData {
                    source: "c".into(),
                    target: "b".into(),
                    label: Some(r#"{"w":2}"#.into()),
                },
            ]
        );
        assert_eq!(store.connections_out("b").unwrap().len(), 1);
        assert_eq!(store.connections("b").unwrap().len(), 3);
    }

    #[test]
    fn remove_nodes_cascades_edges() {
        let store = setup();
        for id in ["a", "b", "c"] {
            store.add_node(id, "{}").unwrap();
        }
        store.add_edge("a", "b").unwrap();
        store.add_edge("b", "c").unwrap();
        store.add_edge("c", "a").unwrap();

        assert_eq!(store.remove_nodes(&["b"]).unwrap(), 1);
        assert!(store.find_node("b").unwrap_err().is_not_found());
        assert!(store.connections("b").unwrap().is_empty());
        assert_eq!(store.stats().unwrap(), GraphStats { nodes: 2, edges: 1 });
    }

    #[test]
    fn remove_nodes_rolls_back_whole_batch() {
        let store = setup();
        for id in ["a", "b"] {
            store.add_node(id, "{}").unwrap();
        }
        store.add_edge("a", "x").unwrap();
        store.add_edge("b", "y").unwrap();
        store
            .connection()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER block_b BEFORE DELETE ON edges WHEN old.source = 'b'
                 BEGIN SELECT RAISE(ABORT, 'edge delete blocked'); END",
            )
            .unwrap();

        let err = store.remove_nodes(&["a", "b"]).unwrap_err();
        assert!(matches!(err, GraphError::RemovalFailed { ref identifier, .. } if identifier == "b"));
        assert_eq!(store.find_node("a").unwrap(), r#"{"id":"a"}"#);
        assert_eq!(store.connections_out("a").unwrap().len(), 1);
        assert_eq!(store.stats().unwrap(), GraphStats { nodes: 2, edges: 2 });
    }

    #[test]
    fn remove_unknown_nodes_is_noop() {
        let store = setup();
        assert_eq!(store.remove_nodes(&["ghost"]).unwrap(), 0);
    }

    #[test]
    fn update_node_body_requires_existing_row() {
        let store = setup();
        assert!(store.update_node_body("a", "{}").unwrap_err().is_not_found());
        store.add_node("a", "{}").unwrap();
        store.update_node_body("a", r#"{"name":"f"}"#).unwrap();
        assert_eq!(store.find_node("a").unwrap(), r#"{"name":"f","id":"a"}"#);
    }

    #[test]
    fn upsert_inserts_then_updates() {
        let store = setup();
        store.upsert_node("u", r#"{"v":1}"#).unwrap();
        assert_eq!(store.find_node("u").unwrap(), r#"{"v":1,"id":"u"}"#);
        store.upsert_node("u", r#"{"v":2}"#).unwrap();
        assert_eq!(store.find_node("u").unwrap(), r#"{"v":2,"id":"u"}"#);
        assert_eq!(store.stats().unwrap().nodes, 1);
    }

    #[test]
    fn upsert_is_idempotent() {
        let store = setup();
        store.upsert_node("u", r#"{"name":"f"}"#).unwrap();
        let once = store.find_node("u").unwrap();
        store.upsert_node("u", r#"{"name":"f"}"#).unwrap();
        assert_eq!(store.find_node("u").unwrap(), once);
        assert_eq!(store.stats().unwrap().nodes, 1);
    }

    #[test]
    fn upsert_treats_existing_row_as_found_even_with_minimal_body() {
        let store = setup();
        store
            .connection()
            .unwrap()
            .execute("INSERT INTO nodes (id, body) VALUES ('e', '\"\"')", [])
            .unwrap();
        store.upsert_node("e", "{}").unwrap();
        assert_eq!(store.find_node("e").unwrap(), r#"{"id":"e"}"#);
        assert_eq!(store.stats().unwrap().nodes, 1);
    }

    #[test]
    fn search_nodes_by_key_value() {
        let store = setup();
        store.add_node("f1", r#"{"name":"main","type":"func"}"#).unwrap();
        store.add_node("f2", r#"{"name":"helper","type":"func"}"#).unwrap();
        store.add_node("t1", r#"{"name":"Config","type":"type"}"#).unwrap();

        let clauses = vec![
            generate_where_clause(&WhereClause::key_value("type")).unwrap(),
            generate_where_clause(
                &WhereClause::key_value("name")
                    .and()
                    .with_predicate(Predicate::Like),
            )
            .unwrap(),
        ];
        let ids = store
            .search_nodes(
                &SearchQuery {
                    result_column: ResultColumn::Id,
                    clauses,
                    ..SearchQuery::default()
                },
                &["func", "h%"],
            )
            .unwrap();
        assert_eq!(ids, vec!["f2"]);
    }

    #[test]
    fn search_nodes_by_keys_needing_quotes() {
        let store = setup();
        store
            .add_node("a", r#"{"file-name":"main.go","$ref":"x","args":["ctx"]}"#)
            .unwrap();
        store.add_node("b", r#"{"file-name":"util.go"}"#).unwrap();

        let search = |key: &str, value: &str| {
            store
                .search_nodes(
                    &SearchQuery {
                        result_column: ResultColumn::Id,
                        clauses: vec![generate_where_clause(&WhereClause::key_value(key)).unwrap()],
                        ..SearchQuery::default()
                    },
                    &[value],
                )
                .unwrap()
        };
        assert_eq!(search("file-name", "main.go"), vec!["a"]);
        assert_eq!(search("$ref", "x"), vec!["a"]);
        assert_eq!(search("args[0]", "ctx"), vec!["a"]);
    }

    #[test]
    fn search_nodes_in_tree_mode() {
        let store = setup();
        store
            .add_node("a", r#"{"meta":{"tags":["hot","io"]}}"#)
            .unwrap();
        store.add_node("b", r#"{"meta":{"tags":["cold"]}}"#).unwrap();

        let clause = WhereClause {
            and_or: None,
            lookup: Lookup::Tree { key: None },
            predicate: Predicate::Eq,
        };
        let ids = store
            .search_nodes(
                &SearchQuery {
                    result_column: ResultColumn::Id,
                    key: Some("meta".into()),
                    tree: true,
                    clauses: vec![generate_where_clause(&clause).unwrap()],
                },
                &["io"],
            )
            .unwrap();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn find_nodes_with_caller_statement() {
        let store = setup();
        store.add_node("a", "{}").unwrap();
        store.add_node("b", "{}").unwrap();
        let ids = store
            .find_nodes("SELECT id FROM nodes WHERE id > ? ORDER BY id", &["a"])
            .unwrap();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn find_nodes_surfaces_bad_sql() {
        let store = setup();
        let err = store.find_nodes("SELECT nope FROM nowhere", &[]).unwrap_err();
        assert!(matches!(err, GraphError::Sqlite(_)));
    }
}
