//! Local single-node graph store on RocksDB.
//!
//! Node and edge records live in their own column families as JSON values;
//! an in-memory adjacency index (rebuilt on open) serves neighborhood
//! expansion without scans. Writes go through a WriteBatch per upsert so a
//! record and its index entry land together.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use rocksdb::{ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded, Options};
use tracing::{debug, info};

use coderisk_core::{CodeRiskError, EdgeKind, NodeLabel, Result};

use crate::backend::GraphBackend;
use crate::model::{Direction, GraphCounts, GraphEdge, GraphNode};

type Db = DBWithThreadMode<MultiThreaded>;

const NODES_CF: &str = "nodes";
const EDGES_CF: &str = "edges";
const SEP: char = '\u{1}';

pub struct LocalGraphStore {
    db: Arc<Db>,
    /// unique_id -> edge keys leaving the node
    out_index: DashMap<String, HashSet<String>>,
    /// unique_id -> edge keys arriving at the node
    in_index: DashMap<String, HashSet<String>>,
}

fn edge_key(kind: EdgeKind, from_id: &str, to_id: &str) -> String {
    format!("{}{}{}{}{}", from_id, SEP, kind, SEP, to_id)
}

fn graph_err(e: rocksdb::Error) -> CodeRiskError {
    CodeRiskError::Graph(e.to_string())
}

impl LocalGraphStore {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        let cfs = vec![
            ColumnFamilyDescriptor::new(NODES_CF, Options::default()),
            ColumnFamilyDescriptor::new(EDGES_CF, Options::default()),
        ];
        let db = Db::open_cf_descriptors(&opts, path, cfs).map_err(graph_err)?;

        let store = Self {
            db: Arc::new(db),
            out_index: DashMap::new(),
            in_index: DashMap::new(),
        };
        store.rebuild_index()?;
        info!(path = %path.display(), "local graph store opened");
        Ok(store)
    }

    fn nodes_cf(&self) -> Arc<rocksdb::BoundColumnFamily<'_>> {
        self.db.cf_handle(NODES_CF).expect("nodes cf")
    }

    fn edges_cf(&self) -> Arc<rocksdb::BoundColumnFamily<'_>> {
        self.db.cf_handle(EDGES_CF).expect("edges cf")
    }

    fn rebuild_index(&self) -> Result<()> {
        let cf = self.edges_cf();
        let mut edges = 0usize;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = item.map_err(graph_err)?;
            let key = String::from_utf8_lossy(&key).to_string();
            let edge: GraphEdge = serde_json::from_slice(&value)?;
            self.out_index
                .entry(edge.from_id.clone())
                .or_default()
                .insert(key.clone());
            self.in_index.entry(edge.to_id).or_default().insert(key);
            edges += 1;
        }
        debug!(edges, "adjacency index rebuilt");
        Ok(())
    }

    fn load_edge(&self, key: &str) -> Result<Option<GraphEdge>> {
        let cf = self.edges_cf();
        match self.db.get_cf(&cf, key.as_bytes()).map_err(graph_err)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn load_node_sync(&self, unique_id: &str) -> Result<Option<GraphNode>> {
        let cf = self.nodes_cf();
        match self
            .db
            .get_cf(&cf, unique_id.as_bytes())
            .map_err(graph_err)?
        {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Edge keys incident on a node for one direction.
    fn incident_keys(&self, unique_id: &str, direction: Direction) -> Vec<String> {
        let mut keys = Vec::new();
        if matches!(direction, Direction::Out | Direction::Both) {
            if let Some(set) = self.out_index.get(unique_id) {
                keys.extend(set.iter().cloned());
            }
        }
        if matches!(direction, Direction::In | Direction::Both) {
            if let Some(set) = self.in_index.get(unique_id) {
                keys.extend(set.iter().cloned());
            }
        }
        keys
    }
}

#[async_trait]
impl GraphBackend for LocalGraphStore {
    async fn upsert_node(&self, node: &GraphNode) -> Result<()> {
        let cf = self.nodes_cf();
        let bytes = serde_json::to_vec(node)?;
        self.db
            .put_cf(&cf, node.unique_id.as_bytes(), bytes)
            .map_err(graph_err)
    }

    async fn upsert_edge(&self, edge: &GraphEdge) -> Result<()> {
        if !self.node_exists(&edge.from_id).await? {
            return Err(CodeRiskError::EndpointMissing(edge.from_id.clone()));
        }
        if !self.node_exists(&edge.to_id).await? {
            return Err(CodeRiskError::EndpointMissing(edge.to_id.clone()));
        }
        let key = edge_key(edge.kind, &edge.from_id, &edge.to_id);
        let cf = self.edges_cf();
        let bytes = serde_json::to_vec(edge)?;
        self.db
            .put_cf(&cf, key.as_bytes(), bytes)
            .map_err(graph_err)?;
        self.out_index
            .entry(edge.from_id.clone())
            .or_default()
            .insert(key.clone());
        self.in_index
            .entry(edge.to_id.clone())
            .or_default()
            .insert(key);
        Ok(())
    }

    async fn get_node(&self, unique_id: &str) -> Result<Option<GraphNode>> {
        self.load_node_sync(unique_id)
    }

    async fn node_exists(&self, unique_id: &str) -> Result<bool> {
        let cf = self.nodes_cf();
        Ok(self
            .db
            .get_pinned_cf(&cf, unique_id.as_bytes())
            .map_err(graph_err)?
            .is_some())
    }

    async fn neighbors(
        &self,
        unique_id: &str,
        kind: EdgeKind,
        direction: Direction,
    ) -> Result<Vec<(GraphNode, GraphEdge)>> {
        let mut out = Vec::new();
        for key in self.incident_keys(unique_id, direction) {
            let Some(edge) = self.load_edge(&key)? else {
                continue;
            };
            if edge.kind != kind {
                continue;
            }
            let other = if edge.from_id == unique_id {
                &edge.to_id
            } else {
                &edge.from_id
            };
            if let Some(node) = self.load_node_sync(other)? {
                out.push((node, edge));
            }
        }
        Ok(out)
    }

    async fn count_edges(
        &self,
        unique_id: &str,
        kind: EdgeKind,
        direction: Direction,
    ) -> Result<usize> {
        let mut count = 0usize;
        for key in self.incident_keys(unique_id, direction) {
            if let Some(edge) = self.load_edge(&key)? {
                if edge.kind == kind {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    async fn nodes_by_label(&self, label: NodeLabel) -> Result<Vec<GraphNode>> {
        let cf = self.nodes_cf();
        let mut out = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(graph_err)?;
            let node: GraphNode = serde_json::from_slice(&value)?;
            if node.label == label {
                out.push(node);
            }
        }
        Ok(out)
    }

    async fn delete_node(&self, unique_id: &str) -> Result<()> {
        let edge_keys = self.incident_keys(unique_id, Direction::Both);
        let edges_cf = self.edges_cf();
        for key in &edge_keys {
            if let Some(edge) = self.load_edge(key)? {
                if let Some(mut set) = self.out_index.get_mut(&edge.from_id) {
                    set.remove(key);
                }
                if let Some(mut set) = self.in_index.get_mut(&edge.to_id) {
                    set.remove(key);
                }
            }
            self.db
                .delete_cf(&edges_cf, key.as_bytes())
                .map_err(graph_err)?;
        }
        self.out_index.remove(unique_id);
        self.in_index.remove(unique_id);

        let nodes_cf = self.nodes_cf();
        self.db
            .delete_cf(&nodes_cf, unique_id.as_bytes())
            .map_err(graph_err)
    }

    async fn counts(&self) -> Result<GraphCounts> {
        let mut counts = GraphCounts::default();
        for item in self.db.iterator_cf(&self.nodes_cf(), IteratorMode::Start) {
            item.map_err(graph_err)?;
            counts.nodes += 1;
        }
        for item in self.db.iterator_cf(&self.edges_cf(), IteratorMode::Start) {
            item.map_err(graph_err)?;
            counts.edges += 1;
        }
        Ok(counts)
    }

    async fn health_check(&self) -> Result<()> {
        // a read through both column families proves the handles are live
        self.node_exists("health:probe").await.map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        self.db.flush().map_err(graph_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{file_node, GraphEdge};
    use coderisk_core::Language;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, LocalGraphStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalGraphStore::open(dir.path()).unwrap();
        (dir, store)
    }

    fn a_file(path: &str) -> GraphNode {
        file_node(path, &Language::Go, "main", Some("abc"))
    }

    #[tokio::test]
    async fn node_upsert_is_idempotent() {
        let (_dir, store) = store();
        let node = a_file("/r/a.go");
        store.upsert_node(&node).await.unwrap();
        store.upsert_node(&node).await.unwrap();
        assert_eq!(store.counts().await.unwrap().nodes, 1);
    }

    #[tokio::test]
    async fn edge_requires_both_endpoints() {
        let (_dir, store) = store();
        store.upsert_node(&a_file("/r/a.go")).await.unwrap();

        let edge = GraphEdge::new(EdgeKind::Imports, "file:/r/a.go", "file:/r/missing.go");
        let err = store.upsert_edge(&edge).await.unwrap_err();
        assert!(matches!(err, CodeRiskError::EndpointMissing(_)));
        // the rejected edge must not exist
        assert_eq!(store.counts().await.unwrap().edges, 0);
    }

    #[tokio::test]
    async fn edge_upsert_is_idempotent_and_replaces_props() {
        let (_dir, store) = store();
        store.upsert_node(&a_file("/r/a.go")).await.unwrap();
        store.upsert_node(&a_file("/r/b.go")).await.unwrap();

        let edge = GraphEdge::new(EdgeKind::CoChanged, "file:/r/a.go", "file:/r/b.go")
            .with_prop("frequency", json!(0.5));
        store.upsert_edge(&edge).await.unwrap();
        let edge2 = GraphEdge::new(EdgeKind::CoChanged, "file:/r/a.go", "file:/r/b.go")
            .with_prop("frequency", json!(0.75));
        store.upsert_edge(&edge2).await.unwrap();

        assert_eq!(store.counts().await.unwrap().edges, 1);
        let neighbors = store
            .neighbors("file:/r/a.go", EdgeKind::CoChanged, Direction::Out)
            .await
            .unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].1.f64_prop("frequency"), Some(0.75));
    }

    #[tokio::test]
    async fn neighbors_filter_by_kind_and_direction() {
        let (_dir, store) = store();
        for p in ["/r/a.go", "/r/b.go", "/r/c.go"] {
            store.upsert_node(&a_file(p)).await.unwrap();
        }
        store
            .upsert_edge(&GraphEdge::new(EdgeKind::Imports, "file:/r/a.go", "file:/r/b.go"))
            .await
            .unwrap();
        store
            .upsert_edge(&GraphEdge::new(EdgeKind::Imports, "file:/r/c.go", "file:/r/a.go"))
            .await
            .unwrap();

        let out = store
            .neighbors("file:/r/a.go", EdgeKind::Imports, Direction::Out)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0.unique_id, "file:/r/b.go");

        let both = store
            .count_edges("file:/r/a.go", EdgeKind::Imports, Direction::Both)
            .await
            .unwrap();
        assert_eq!(both, 2);
    }

    #[tokio::test]
    async fn delete_node_drops_incident_edges() {
        let (_dir, store) = store();
        store.upsert_node(&a_file("/r/a.go")).await.unwrap();
        store.upsert_node(&a_file("/r/b.go")).await.unwrap();
        store
            .upsert_edge(&GraphEdge::new(EdgeKind::Imports, "file:/r/a.go", "file:/r/b.go"))
            .await
            .unwrap();

        store.delete_node("file:/r/b.go").await.unwrap();
        let counts = store.counts().await.unwrap();
        assert_eq!(counts.nodes, 1);
        assert_eq!(counts.edges, 0);
    }

    #[tokio::test]
    async fn index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LocalGraphStore::open(dir.path()).unwrap();
            store.upsert_node(&a_file("/r/a.go")).await.unwrap();
            store.upsert_node(&a_file("/r/b.go")).await.unwrap();
            store
                .upsert_edge(&GraphEdge::new(EdgeKind::Imports, "file:/r/a.go", "file:/r/b.go"))
                .await
                .unwrap();
            store.close().await.unwrap();
        }
        let store = LocalGraphStore::open(dir.path()).unwrap();
        let out = store
            .neighbors("file:/r/a.go", EdgeKind::Imports, Direction::Out)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
    }
}
