//! Read-all export of the stored graph.

use crate::error::Result;
use crate::graph::store::GraphStore;
use crate::types::{Edge, GraphResponse, Node};

const ALL_EDGES_SQL: &str = "SELECT source, target FROM edges ORDER BY rowid";

const ALL_NODES_SQL: &str = "SELECT id, body FROM nodes ORDER BY rowid";

impl GraphStore {
    /// Every edge and every node, in storage order.
    ///
    /// Both reads share one transaction so the two lists come from the
    /// same snapshot. No pagination or filtering.
    pub fn get_all_data(&self) -> Result<GraphResponse> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let response = {
            let mut stmt = tx.prepare_cached(ALL_EDGES_SQL)?;
            let edges = stmt
                .query_map([], |row| {
                    Ok(Edge {
                        source: row.get(0)?,
                        target: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut stmt = tx.prepare_cached(ALL_NODES_SQL)?;
            let nodes = stmt
                .query_map([], |row| {
                    Ok(Node {
                        id: row.get(0)?,
                        body: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            GraphResponse { nodes, edges }
        };
        tx.commit()?;
        tracing::debug!(
            "exported {} nodes and {} edges",
            response.nodes.len(),
            response.edges.len()
        );
        Ok(response)
    }
}
