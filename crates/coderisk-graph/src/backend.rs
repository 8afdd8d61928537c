//! Narrow storage interface for the property graph.
//!
//! The interface deliberately stays at the level of "upsert node", "upsert
//! edge", "expand neighborhood", "count edges" so the local and managed
//! backends are true peers; no query-language dialect leaks through it.

use async_trait::async_trait;

use coderisk_core::{EdgeKind, NodeLabel, Result};

use crate::model::{Direction, GraphCounts, GraphEdge, GraphNode};

#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Idempotent: matches on `unique_id`, replaces properties on re-upsert.
    async fn upsert_node(&self, node: &GraphNode) -> Result<()>;

    /// Idempotent on `(kind, from, to)`. Fails with
    /// `CodeRiskError::EndpointMissing` when either endpoint is absent;
    /// the edge must not be created in that case.
    async fn upsert_edge(&self, edge: &GraphEdge) -> Result<()>;

    async fn get_node(&self, unique_id: &str) -> Result<Option<GraphNode>>;

    async fn node_exists(&self, unique_id: &str) -> Result<bool>;

    /// One hop of neighbors over `kind` edges in `direction`.
    async fn neighbors(
        &self,
        unique_id: &str,
        kind: EdgeKind,
        direction: Direction,
    ) -> Result<Vec<(GraphNode, GraphEdge)>>;

    /// Count of `kind` edges incident on the node in `direction`, without
    /// materializing neighbor nodes.
    async fn count_edges(
        &self,
        unique_id: &str,
        kind: EdgeKind,
        direction: Direction,
    ) -> Result<usize>;

    async fn nodes_by_label(&self, label: NodeLabel) -> Result<Vec<GraphNode>>;

    /// Removes the node and all incident edges. Used for Layer-1 rebuilds
    /// and the Layer-2 window sweep.
    async fn delete_node(&self, unique_id: &str) -> Result<()>;

    async fn counts(&self) -> Result<GraphCounts>;

    async fn health_check(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
