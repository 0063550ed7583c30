//! Loads caller/callee records produced by an external call-graph analysis.
//!
//! Each function becomes a node whose body is the serialized
//! [`FunctionNode`]. The same function shows up from many call sites, so
//! duplicate-identifier failures are expected and counted, not raised. Each
//! `caller->callee` pair is connected at most once per importer.

use std::collections::HashSet;
use std::io::BufRead;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::graph::store::GraphStore;

/// A function as seen by the analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    "func".to_string()
}

impl FunctionNode {
    pub fn func(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: default_kind(),
        }
    }
}

/// One call-graph edge. A record without a callee only registers the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub caller: FunctionNode,
    #[serde(default)]
    pub callee: Option<FunctionNode>,
}

/// Counters for one import run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub records: usize,
    pub nodes_added: usize,
    pub nodes_existing: usize,
    pub edges_added: usize,
    pub edges_skipped: usize,
}

/// Feeds [`CallRecord`]s into a store.
pub struct CallGraphImporter<'a> {
    store: &'a GraphStore,
    visited: HashSet<String>,
    stats: ImportStats,
}

impl<'a> CallGraphImporter<'a> {
    pub fn new(store: &'a GraphStore) -> Self {
        Self {
            store,
            visited: HashSet::new(),
            stats: ImportStats::default(),
        }
    }

    /// Add both endpoints and connect them.
    pub fn add_record(&mut self, record: &CallRecord) -> Result<()> {
        self.stats.records += 1;
        self.ensure_node(&record.caller)?;
        let Some(callee) = &record.callee else {
            return Ok(());
        };
        self.ensure_node(callee)?;

        let key = format!("{}->{}", record.caller.id, callee.id);
        if self.visited.insert(key) {
            self.store.add_edge(&record.caller.id, &callee.id)?;
            self.stats.edges_added += 1;
            tracing::debug!("{} calls {}", record.caller.id, callee.id);
        } else {
            self.stats.edges_skipped += 1;
        }
        Ok(())
    }

    pub fn import<I>(&mut self, records: I) -> Result<ImportStats>
    where
        I: IntoIterator<Item = CallRecord>,
    {
        for record in records {
            self.add_record(&record)?;
        }
        Ok(self.stats)
    }

    pub fn stats(&self) -> ImportStats {
        self.stats
    }

    fn ensure_node(&mut self, node: &FunctionNode) -> Result<()> {
        let body = serde_json::to_string(node)?;
        match self.store.add_node(&node.id, &body) {
            Ok(()) => self.stats.nodes_added += 1,
            Err(e) if e.is_duplicate() => self.stats.nodes_existing += 1,
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

/// Parse JSON Lines into records, skipping blank lines. Errors carry the
/// 1-based line number.
pub fn read_json_lines<R: BufRead>(reader: R) -> impl Iterator<Item = Result<CallRecord>> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(index, line)| match line {
            Ok(text) if text.trim().is_empty() => None,
            Ok(text) => Some(serde_json::from_str(&text).map_err(|source| GraphError::Record {
                line: index + 1,
                source,
            })),
            Err(e) => Some(Err(e.into())),
        })
}
