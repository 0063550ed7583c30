//! Error taxonomy for the graph store.
//!
//! Constraint violations are classified from SQLite's extended result codes
//! so callers can match on [`GraphError`] variants instead of message text.

use rusqlite::{ffi, ErrorCode};

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Every failure the store can report.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A node with this identifier already exists.
    #[error("duplicate identifier: {0}")]
    DuplicateIdentifier(String),

    /// The node identifier was empty or NULL.
    #[error("missing identifier")]
    MissingIdentifier,

    /// No node row matched the identifier.
    #[error("no node found for identifier: {0}")]
    NotFound(String),

    /// Parallel input slices of a bulk operation differ in length.
    #[error("{operation}: expected {expected} entries, got {actual}")]
    LengthMismatch {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The body rejected by the engine's JSON validity check.
    #[error("body of node {0} is not valid JSON")]
    MalformedBody(String),

    /// A JSON key that cannot be embedded in a path expression.
    #[error("invalid JSON key: {0:?}")]
    InvalidKey(String),

    /// A DDL statement failed during schema initialization.
    #[error("schema statement `{statement}` failed: {source}")]
    Schema {
        statement: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// A batched removal failed and was rolled back as a whole.
    #[error("removal of {identifier} failed, batch rolled back: {source}")]
    RemovalFailed {
        identifier: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A call record in an import stream could not be parsed.
    #[error("malformed call record on line {line}: {source}")]
    Record {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// No pooled connection could be checked out in time, or the pool
    /// could not open its connections.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl GraphError {
    /// Map a node insert/update failure onto the named constraint kinds.
    pub(crate) fn from_node_write(err: rusqlite::Error, identifier: &str) -> Self {
        if let rusqlite::Error::SqliteFailure(ref e, _) = err {
            if e.code == ErrorCode::ConstraintViolation {
                match e.extended_code {
                    ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE => {
                        return Self::DuplicateIdentifier(identifier.to_string());
                    }
                    ffi::SQLITE_CONSTRAINT_NOTNULL => return Self::MissingIdentifier,
                    ffi::SQLITE_CONSTRAINT_CHECK => {
                        return Self::MalformedBody(identifier.to_string());
                    }
                    _ => {}
                }
            }
        }
        Self::Sqlite(err)
    }

    /// True for the duplicate-identifier constraint kind.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateIdentifier(_))
    }

    /// True for the no-rows signal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
