//! Managed remote graph backend.
//!
//! Speaks the Cypher transaction HTTP API (Neo4j-compatible endpoints).
//! The Cypher stays inside this module; everything above the
//! `GraphBackend` trait is dialect-free, so the local store and this one
//! are interchangeable.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use coderisk_core::{CodeRiskError, EdgeKind, NodeLabel, Result};

use crate::backend::GraphBackend;
use crate::model::{Direction, GraphCounts, GraphEdge, GraphNode};

pub struct RemoteGraphStore {
    http: Client,
    /// Transaction-commit endpoint, e.g. `https://host:7474/db/neo4j/tx/commit`.
    endpoint: String,
    auth: Option<(String, SecretString)>,
}

#[derive(Debug, Deserialize)]
struct CypherResponse {
    results: Vec<CypherResult>,
    #[serde(default)]
    errors: Vec<CypherError>,
}

#[derive(Debug, Deserialize)]
struct CypherResult {
    #[serde(default)]
    data: Vec<CypherRow>,
}

#[derive(Debug, Deserialize)]
struct CypherRow {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct CypherError {
    code: String,
    message: String,
}

impl RemoteGraphStore {
    pub fn new(endpoint: &str, auth: Option<(String, SecretString)>) -> Result<Self> {
        let http = Client::builder()
            .user_agent("coderisk")
            .build()
            .map_err(|e| CodeRiskError::Graph(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            auth,
        })
    }

    async fn run(&self, statement: &str, parameters: Value) -> Result<Vec<Vec<Value>>> {
        let body = json!({
            "statements": [{ "statement": statement, "parameters": parameters }]
        });
        let mut req = self.http.post(&self.endpoint).json(&body);
        if let Some((user, password)) = &self.auth {
            req = req.basic_auth(user, Some(password.expose_secret()));
        }
        let resp = req
            .send()
            .await
            .map_err(|e| CodeRiskError::Graph(format!("remote graph unreachable: {}", e)))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CodeRiskError::Graph(format!(
                "remote graph returned HTTP {}",
                status
            )));
        }
        let decoded: CypherResponse = resp
            .json()
            .await
            .map_err(|e| CodeRiskError::Graph(format!("remote graph decode: {}", e)))?;
        if let Some(err) = decoded.errors.first() {
            return Err(CodeRiskError::Graph(format!("{}: {}", err.code, err.message)));
        }
        debug!(statement, "cypher statement executed");
        Ok(decoded
            .results
            .into_iter()
            .flat_map(|r| r.data)
            .map(|d| d.row)
            .collect())
    }
}

fn parse_label(s: &str) -> Option<NodeLabel> {
    match s {
        "Repository" => Some(NodeLabel::Repository),
        "File" => Some(NodeLabel::File),
        "Function" => Some(NodeLabel::Function),
        "Class" => Some(NodeLabel::Class),
        "Import" => Some(NodeLabel::Import),
        "Commit" => Some(NodeLabel::Commit),
        "Developer" => Some(NodeLabel::Developer),
        "Incident" => Some(NodeLabel::Incident),
        _ => None,
    }
}

fn node_from_row(label: &Value, props: &Value) -> Option<GraphNode> {
    let label = parse_label(label.as_str()?)?;
    let props: HashMap<String, Value> =
        serde_json::from_value(props.clone()).unwrap_or_default();
    let unique_id = props.get("unique_id")?.as_str()?.to_string();
    let mut node = GraphNode::new(label, unique_id);
    node.props = props;
    node.props.remove("unique_id");
    Some(node)
}

fn edge_from_row(kind: EdgeKind, from_id: &str, to_id: &str, props: &Value) -> GraphEdge {
    let mut edge = GraphEdge::new(kind, from_id, to_id);
    edge.props = serde_json::from_value(props.clone()).unwrap_or_default();
    edge
}

#[async_trait]
impl GraphBackend for RemoteGraphStore {
    async fn upsert_node(&self, node: &GraphNode) -> Result<()> {
        // label and edge-kind names come from closed enums, never user input
        let statement = format!(
            "MERGE (n:{} {{unique_id: $id}}) SET n += $props",
            node.label
        );
        self.run(
            &statement,
            json!({ "id": node.unique_id, "props": node.props }),
        )
        .await?;
        Ok(())
    }

    async fn upsert_edge(&self, edge: &GraphEdge) -> Result<()> {
        let statement = format!(
            "MATCH (a {{unique_id: $from}}) MATCH (b {{unique_id: $to}}) \
             MERGE (a)-[r:{}]->(b) SET r += $props RETURN count(r)",
            edge.kind
        );
        let rows = self
            .run(
                &statement,
                json!({ "from": edge.from_id, "to": edge.to_id, "props": edge.props }),
            )
            .await?;
        let created = rows
            .first()
            .and_then(|r| r.first())
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        if created == 0 {
            // MATCH found nothing, so no edge was written
            return Err(CodeRiskError::EndpointMissing(format!(
                "{} -> {}",
                edge.from_id, edge.to_id
            )));
        }
        Ok(())
    }

    async fn get_node(&self, unique_id: &str) -> Result<Option<GraphNode>> {
        let rows = self
            .run(
                "MATCH (n {unique_id: $id}) RETURN labels(n)[0], properties(n)",
                json!({ "id": unique_id }),
            )
            .await?;
        Ok(rows
            .first()
            .and_then(|row| node_from_row(row.first()?, row.get(1)?)))
    }

    async fn node_exists(&self, unique_id: &str) -> Result<bool> {
        let rows = self
            .run(
                "MATCH (n {unique_id: $id}) RETURN count(n)",
                json!({ "id": unique_id }),
            )
            .await?;
        Ok(rows
            .first()
            .and_then(|r| r.first())
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
            > 0)
    }

    async fn neighbors(
        &self,
        unique_id: &str,
        kind: EdgeKind,
        direction: Direction,
    ) -> Result<Vec<(GraphNode, GraphEdge)>> {
        let pattern = match direction {
            Direction::Out => format!("(a {{unique_id: $id}})-[r:{}]->(b)", kind),
            Direction::In => format!("(b)-[r:{}]->(a {{unique_id: $id}})", kind),
            Direction::Both => format!("(a {{unique_id: $id}})-[r:{}]-(b)", kind),
        };
        let statement = format!(
            "MATCH {} RETURN labels(b)[0], properties(b), properties(r), b.unique_id",
            pattern
        );
        let rows = self.run(&statement, json!({ "id": unique_id })).await?;
        let mut out = Vec::new();
        for row in rows {
            let (Some(label), Some(props), Some(edge_props), Some(other_id)) =
                (row.first(), row.get(1), row.get(2), row.get(3))
            else {
                continue;
            };
            let Some(node) = node_from_row(label, props) else {
                continue;
            };
            let other_id = other_id.as_str().unwrap_or_default();
            let edge = match direction {
                Direction::In => edge_from_row(kind, other_id, unique_id, edge_props),
                _ => edge_from_row(kind, unique_id, other_id, edge_props),
            };
            out.push((node, edge));
        }
        Ok(out)
    }

    async fn count_edges(
        &self,
        unique_id: &str,
        kind: EdgeKind,
        direction: Direction,
    ) -> Result<usize> {
        let pattern = match direction {
            Direction::Out => format!("(a {{unique_id: $id}})-[r:{}]->()", kind),
            Direction::In => format!("()-[r:{}]->(a {{unique_id: $id}})", kind),
            Direction::Both => format!("(a {{unique_id: $id}})-[r:{}]-()", kind),
        };
        let statement = format!("MATCH {} RETURN count(r)", pattern);
        let rows = self.run(&statement, json!({ "id": unique_id })).await?;
        Ok(rows
            .first()
            .and_then(|r| r.first())
            .and_then(|v| v.as_i64())
            .unwrap_or(0) as usize)
    }

    async fn nodes_by_label(&self, label: NodeLabel) -> Result<Vec<GraphNode>> {
        let statement = format!("MATCH (n:{}) RETURN labels(n)[0], properties(n)", label);
        let rows = self.run(&statement, json!({})).await?;
        Ok(rows
            .iter()
            .filter_map(|row| node_from_row(row.first()?, row.get(1)?))
            .collect())
    }

    async fn delete_node(&self, unique_id: &str) -> Result<()> {
        self.run(
            "MATCH (n {unique_id: $id}) DETACH DELETE n",
            json!({ "id": unique_id }),
        )
        .await?;
        Ok(())
    }

    async fn counts(&self) -> Result<GraphCounts> {
        let rows = self
            .run(
                "MATCH (n) OPTIONAL MATCH ()-[r]->() RETURN count(DISTINCT n), count(DISTINCT r)",
                json!({}),
            )
            .await?;
        let row = rows.first();
        Ok(GraphCounts {
            nodes: row
                .and_then(|r| r.first())
                .and_then(|v| v.as_i64())
                .unwrap_or(0) as usize,
            edges: row
                .and_then(|r| r.get(1))
                .and_then(|v| v.as_i64())
                .unwrap_or(0) as usize,
        })
    }

    async fn health_check(&self) -> Result<()> {
        self.run("RETURN 1", json!({})).await.map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip() {
        for label in [
            NodeLabel::Repository,
            NodeLabel::File,
            NodeLabel::Function,
            NodeLabel::Class,
            NodeLabel::Import,
            NodeLabel::Commit,
            NodeLabel::Developer,
            NodeLabel::Incident,
        ] {
            assert_eq!(parse_label(&label.to_string()), Some(label));
        }
    }

    #[test]
    fn node_from_row_strips_unique_id_prop() {
        let label = json!("File");
        let props = json!({"unique_id": "file:/r/a.go", "language": "go"});
        let node = node_from_row(&label, &props).unwrap();
        assert_eq!(node.unique_id, "file:/r/a.go");
        assert_eq!(node.str_prop("language"), Some("go"));
        assert!(!node.props.contains_key("unique_id"));
    }
}
