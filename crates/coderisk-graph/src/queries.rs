//! Read-side graph queries used by the metrics engine and the
//! investigation agent. Readers never mutate.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use coderisk_core::{ids, EdgeKind, Result, Severity};

use crate::backend::GraphBackend;
use crate::model::{Direction, GraphNode};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoChangeNeighbor {
    pub file_path: String,
    pub frequency: f64,
    pub co_changes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentLink {
    pub incident_id: String,
    pub title: String,
    pub severity: Severity,
    pub occurred_at: Option<DateTime<Utc>>,
    pub confidence: f64,
}

#[derive(Clone)]
pub struct GraphReader {
    backend: Arc<dyn GraphBackend>,
}

impl GraphReader {
    pub fn new(backend: Arc<dyn GraphBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn GraphBackend> {
        &self.backend
    }

    pub async fn file_node(&self, absolute_path: &str) -> Result<Option<GraphNode>> {
        self.backend.get_node(&ids::file_id(absolute_path)).await
    }

    pub async fn file_exists(&self, absolute_path: &str) -> Result<bool> {
        self.backend.node_exists(&ids::file_id(absolute_path)).await
    }

    /// Distinct files connected by IMPORTS in either direction.
    pub async fn structural_coupling(&self, absolute_path: &str) -> Result<usize> {
        let uid = ids::file_id(absolute_path);
        let neighbors = self
            .backend
            .neighbors(&uid, EdgeKind::Imports, Direction::Both)
            .await?;
        let distinct: HashSet<&str> = neighbors
            .iter()
            .map(|(node, _)| node.unique_id.as_str())
            .collect();
        Ok(distinct.len())
    }

    /// CO_CHANGED partners at or above `min_frequency`, strongest first;
    /// ties break on the raw co-change count.
    pub async fn cochange_neighbors(
        &self,
        absolute_path: &str,
        min_frequency: f64,
    ) -> Result<Vec<CoChangeNeighbor>> {
        let uid = ids::file_id(absolute_path);
        let mut out: Vec<CoChangeNeighbor> = self
            .backend
            .neighbors(&uid, EdgeKind::CoChanged, Direction::Out)
            .await?
            .into_iter()
            .filter_map(|(node, edge)| {
                let frequency = edge.f64_prop("frequency")?;
                if frequency < min_frequency {
                    return None;
                }
                Some(CoChangeNeighbor {
                    file_path: node.str_prop("file_path")?.to_string(),
                    frequency,
                    co_changes: edge.i64_prop("co_changes").unwrap_or(0),
                })
            })
            .collect();
        out.sort_by(|a, b| {
            b.frequency
                .partial_cmp(&a.frequency)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.co_changes.cmp(&a.co_changes))
        });
        Ok(out)
    }

    pub async fn max_cochange(&self, absolute_path: &str) -> Result<Option<CoChangeNeighbor>> {
        Ok(self
            .cochange_neighbors(absolute_path, 0.0)
            .await?
            .into_iter()
            .next())
    }

    /// Incidents with a CAUSED_BY edge onto the file, newest first.
    pub async fn incidents_for(&self, absolute_path: &str) -> Result<Vec<IncidentLink>> {
        let uid = ids::file_id(absolute_path);
        let mut out: Vec<IncidentLink> = self
            .backend
            .neighbors(&uid, EdgeKind::CausedBy, Direction::In)
            .await?
            .into_iter()
            .filter_map(|(node, edge)| {
                Some(IncidentLink {
                    incident_id: node.str_prop("id")?.to_string(),
                    title: node.str_prop("title").unwrap_or_default().to_string(),
                    severity: Severity::from_str(node.str_prop("severity")?).ok()?,
                    occurred_at: node
                        .str_prop("occurred_at")
                        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                        .map(|t| t.with_timezone(&Utc)),
                    confidence: edge.f64_prop("confidence").unwrap_or(1.0),
                })
            })
            .collect();
        out.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        Ok(out)
    }

    /// Files whose TESTS edge points at this file.
    pub async fn test_files_for(&self, absolute_path: &str) -> Result<Vec<String>> {
        let uid = ids::file_id(absolute_path);
        Ok(self
            .backend
            .neighbors(&uid, EdgeKind::Tests, Direction::In)
            .await?
            .into_iter()
            .filter_map(|(node, _)| node.str_prop("file_path").map(|s| s.to_string()))
            .collect())
    }

    /// Files reachable within `hops` over IMPORTS or CO_CHANGED; a rough
    /// impact estimate for a change to the file.
    pub async fn blast_radius(&self, absolute_path: &str, hops: usize) -> Result<Vec<String>> {
        let start = ids::file_id(absolute_path);
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(start.clone());
        let mut frontier = vec![start];

        for _ in 0..hops {
            let mut next = Vec::new();
            for uid in &frontier {
                for kind in [EdgeKind::Imports, EdgeKind::CoChanged] {
                    for (node, _) in self
                        .backend
                        .neighbors(uid, kind, Direction::Both)
                        .await?
                    {
                        if visited.insert(node.unique_id.clone()) {
                            next.push(node.unique_id);
                        }
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        let mut paths: Vec<String> = visited
            .into_iter()
            .filter_map(|uid| ids::file_path_of(&uid).map(|s| s.to_string()))
            .filter(|p| p != absolute_path)
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Commits modifying this file within the graph's temporal layer.
    pub async fn modification_count(&self, absolute_path: &str) -> Result<usize> {
        let uid = ids::file_id(absolute_path);
        self.backend
            .count_edges(&uid, EdgeKind::Modifies, Direction::In)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalGraphStore;
    use crate::model::{file_node, incident_node, GraphEdge};
    use coderisk_core::Language;
    use serde_json::json;
    use uuid::Uuid;

    async fn seeded() -> (tempfile::TempDir, GraphReader) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalGraphStore::open(dir.path()).unwrap());
        for p in ["/r/a.go", "/r/b.go", "/r/c.go"] {
            store
                .upsert_node(&file_node(p, &Language::Go, "main", None))
                .await
                .unwrap();
        }
        store
            .upsert_edge(&GraphEdge::new(EdgeKind::Imports, "file:/r/a.go", "file:/r/b.go"))
            .await
            .unwrap();
        store
            .upsert_edge(
                &GraphEdge::new(EdgeKind::CoChanged, "file:/r/a.go", "file:/r/c.go")
                    .with_prop("frequency", json!(0.87))
                    .with_prop("co_changes", json!(13)),
            )
            .await
            .unwrap();
        (dir, GraphReader::new(store))
    }

    #[tokio::test]
    async fn coupling_counts_distinct_files() {
        let (_dir, reader) = seeded().await;
        assert_eq!(reader.structural_coupling("/r/a.go").await.unwrap(), 1);
        assert_eq!(reader.structural_coupling("/r/b.go").await.unwrap(), 1);
        // no IMPORTS edges at all
        assert_eq!(reader.structural_coupling("/r/c.go").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn max_cochange_reports_strongest_partner() {
        let (_dir, reader) = seeded().await;
        let top = reader.max_cochange("/r/a.go").await.unwrap().unwrap();
        assert_eq!(top.file_path, "/r/c.go");
        assert!((top.frequency - 0.87).abs() < 1e-9);
    }

    #[tokio::test]
    async fn incidents_carry_confidence() {
        let (_dir, reader) = seeded().await;
        let store = reader.backend().clone();
        let id = Uuid::new_v4();
        store
            .upsert_node(&incident_node(
                &id,
                "checkout outage",
                Severity::Critical,
                Utc::now(),
                None,
                None,
            ))
            .await
            .unwrap();
        store
            .upsert_edge(
                &GraphEdge::new(
                    EdgeKind::CausedBy,
                    ids::incident_id(&id),
                    "file:/r/a.go",
                )
                .with_prop("confidence", json!(0.8)),
            )
            .await
            .unwrap();

        let incidents = reader.incidents_for("/r/a.go").await.unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].severity, Severity::Critical);
        assert!((incidents[0].confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn blast_radius_spans_both_edge_kinds() {
        let (_dir, reader) = seeded().await;
        let radius = reader.blast_radius("/r/a.go", 2).await.unwrap();
        assert_eq!(radius, vec!["/r/b.go".to_string(), "/r/c.go".to_string()]);
    }
}
