//! WHERE-clause and SELECT generation for node lookups.
//!
//! Values are never interpolated: every generated fragment carries `?`
//! placeholders and the caller binds them in clause order. JSON keys do end
//! up in the SQL text, as quoted path members inside an escaped literal.

use crate::error::{GraphError, Result};

// ---------------------------------------------------------------------------
// Clause options
// ---------------------------------------------------------------------------

/// How a clause joins the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AndOr {
    And,
    Or,
}

impl AndOr {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// Comparison operator between the selected value and its binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Predicate {
    #[default]
    Eq,
    NotEq,
    Like,
    Glob,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Predicate {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Like => "LIKE",
            Self::Glob => "GLOB",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }
}

/// What a clause compares against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The row identifier.
    Id,
    /// A top-level (or dotted) field of the body.
    KeyValue { key: String },
    /// Any value in the body's JSON tree, optionally only under member `key`.
    Tree { key: Option<String> },
}

/// One predicate fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhereClause {
    pub and_or: Option<AndOr>,
    pub lookup: Lookup,
    pub predicate: Predicate,
}

impl WhereClause {
    pub fn id() -> Self {
        Self {
            and_or: None,
            lookup: Lookup::Id,
            predicate: Predicate::Eq,
        }
    }

    pub fn key_value(key: impl Into<String>) -> Self {
        Self {
            and_or: None,
            lookup: Lookup::KeyValue { key: key.into() },
            predicate: Predicate::Eq,
        }
    }

    pub fn tree(key: Option<&str>) -> Self {
        Self {
            and_or: None,
            lookup: Lookup::Tree {
                key: key.map(str::to_string),
            },
            predicate: Predicate::Eq,
        }
    }

    pub fn and(mut self) -> Self {
        self.and_or = Some(AndOr::And);
        self
    }

    pub fn or(mut self) -> Self {
        self.and_or = Some(AndOr::Or);
        self
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }
}

// ---------------------------------------------------------------------------
// Search statement options
// ---------------------------------------------------------------------------

/// Column returned by a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultColumn {
    Id,
    #[default]
    Body,
}

impl ResultColumn {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Id => "nodes.id",
            Self::Body => "nodes.body",
        }
    }
}

/// A full SELECT over `nodes`, assembled from generated clauses.
///
/// `tree` joins `json_tree` over each body (rooted at `key` when given) so
/// [`Lookup::Tree`] clauses have something to match against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub result_column: ResultColumn,
    pub key: Option<String>,
    pub tree: bool,
    pub clauses: Vec<String>,
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Refuse keys that cannot be written as quoted path members.
fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && !key.split('.').any(str::is_empty)
        && !key.contains(['"', '\\']);
    if valid {
        Ok(())
    } else {
        Err(GraphError::InvalidKey(key.to_string()))
    }
}

/// Split a trailing run of array subscripts off a member: `args[0][1]`
/// becomes `("args", "[0][1]")`. Anything else is all member name.
fn split_subscripts(segment: &str) -> (&str, &str) {
    let mut end = segment.len();
    while segment[..end].ends_with(']') {
        let Some(open) = segment[..end].rfind('[') else {
            break;
        };
        let index = &segment[open + 1..end - 1];
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            break;
        }
        end = open;
    }
    if end == 0 {
        return (segment, "");
    }
    segment.split_at(end)
}

/// `pkg.file-name` becomes `$."pkg"."file-name"`; dots nest, `[n]` indexes.
fn json_path(key: &str) -> Result<String> {
    validate_key(key)?;
    let mut path = String::from("$");
    for segment in key.split('.') {
        let (member, subscripts) = split_subscripts(segment);
        path.push_str(".\"");
        path.push_str(member);
        path.push('"');
        path.push_str(subscripts);
    }
    Ok(path)
}

/// Quote text for use inside a SQL string literal.
fn sql_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Render one predicate fragment, e.g. `AND json_extract(nodes.body, '$."name"') = ?`.
pub fn generate_where_clause(clause: &WhereClause) -> Result<String> {
    let op = clause.predicate.as_sql();
    let body = match &clause.lookup {
        Lookup::Id => format!("nodes.id {op} ?"),
        Lookup::KeyValue { key } => {
            let path = sql_literal(&json_path(key)?);
            format!("json_extract(nodes.body, {path}) {op} ?")
        }
        Lookup::Tree { key: None } => format!("json_tree.value {op} ?"),
        Lookup::Tree { key: Some(key) } => {
            validate_key(key)?;
            let label = sql_literal(key);
            format!("(json_tree.key = {label} AND json_tree.value {op} ?)")
        }
    };
    Ok(match clause.and_or {
        Some(joiner) => format!("{} {}", joiner.as_sql(), body),
        None => body,
    })
}

/// Wrap generated fragments into a SELECT over `nodes`.
pub fn generate_search_statement(query: &SearchQuery) -> Result<String> {
    let column = query.result_column.as_sql();
    let mut sql = if query.tree {
        let source = match &query.key {
            Some(key) => format!("json_tree(nodes.body, {})", sql_literal(&json_path(key)?)),
            None => "json_tree(nodes.body)".to_string(),
        };
        format!("SELECT DISTINCT {column} FROM nodes, {source}")
    } else {
        format!("SELECT {column} FROM nodes")
    };
    if !query.clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&query.clauses.join(" "));
    }
    Ok(sql)
}
