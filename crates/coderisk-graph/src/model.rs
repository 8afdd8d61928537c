use std::collections::HashMap;

use chrono::{DateTime, Utc};
use coderisk_core::{ids, EdgeKind, Language, NodeLabel, Severity};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// A property-graph node. `unique_id` is the upsert key; properties are a
/// flat map of JSON scalars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub label: NodeLabel,
    pub unique_id: String,
    pub props: HashMap<String, Value>,
}

impl GraphNode {
    pub fn new(label: NodeLabel, unique_id: impl Into<String>) -> Self {
        Self {
            label,
            unique_id: unique_id.into(),
            props: HashMap::new(),
        }
    }

    pub fn with_prop(mut self, key: &str, value: Value) -> Self {
        self.props.insert(key.to_string(), value);
        self
    }

    pub fn str_prop(&self, key: &str) -> Option<&str> {
        self.props.get(key).and_then(|v| v.as_str())
    }

    pub fn f64_prop(&self, key: &str) -> Option<f64> {
        self.props.get(key).and_then(|v| v.as_f64())
    }
}

/// A directed edge between two nodes, keyed `(kind, from, to)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub kind: EdgeKind,
    pub from_id: String,
    pub to_id: String,
    pub props: HashMap<String, Value>,
}

impl GraphEdge {
    pub fn new(kind: EdgeKind, from_id: impl Into<String>, to_id: impl Into<String>) -> Self {
        Self {
            kind,
            from_id: from_id.into(),
            to_id: to_id.into(),
            props: HashMap::new(),
        }
    }

    pub fn with_prop(mut self, key: &str, value: Value) -> Self {
        self.props.insert(key.to_string(), value);
        self
    }

    pub fn f64_prop(&self, key: &str) -> Option<f64> {
        self.props.get(key).and_then(|v| v.as_f64())
    }

    pub fn i64_prop(&self, key: &str) -> Option<i64> {
        self.props.get(key).and_then(|v| v.as_i64())
    }
}

// ---- node constructors ------------------------------------------------

pub fn repository_node(repo_id: &str, default_branch: &str) -> GraphNode {
    GraphNode::new(NodeLabel::Repository, ids::repo_id(repo_id))
        .with_prop("name", json!(repo_id))
        .with_prop("default_branch", json!(default_branch))
}

pub fn file_node(
    absolute_path: &str,
    language: &Language,
    branch: &str,
    git_sha: Option<&str>,
) -> GraphNode {
    let mut node = GraphNode::new(NodeLabel::File, ids::file_id(absolute_path))
        .with_prop("file_path", json!(absolute_path))
        .with_prop("language", json!(language.to_string()))
        .with_prop("branch", json!(branch));
    if let Some(sha) = git_sha {
        node = node.with_prop("git_sha", json!(sha));
    }
    node
}

pub fn function_node(
    absolute_path: &str,
    name: &str,
    start_line: u32,
    end_line: u32,
    signature: &str,
) -> GraphNode {
    GraphNode::new(
        NodeLabel::Function,
        ids::function_id(absolute_path, name, start_line),
    )
    .with_prop("name", json!(name))
    .with_prop("file_path", json!(absolute_path))
    .with_prop("start_line", json!(start_line))
    .with_prop("end_line", json!(end_line))
    .with_prop("signature", json!(signature))
}

pub fn class_node(absolute_path: &str, name: &str, start_line: u32, end_line: u32) -> GraphNode {
    GraphNode::new(
        NodeLabel::Class,
        ids::class_id(absolute_path, name, start_line),
    )
    .with_prop("name", json!(name))
    .with_prop("file_path", json!(absolute_path))
    .with_prop("start_line", json!(start_line))
    .with_prop("end_line", json!(end_line))
}

pub fn import_node(absolute_path: &str, module_name: &str, line: u32) -> GraphNode {
    GraphNode::new(NodeLabel::Import, ids::import_id(absolute_path, line))
        .with_prop("module_name", json!(module_name))
        .with_prop("file_path", json!(absolute_path))
        .with_prop("line", json!(line))
}

pub fn commit_node(
    sha: &str,
    author_email: &str,
    authored_at: DateTime<Utc>,
    message: &str,
) -> GraphNode {
    // long bodies stay in staging; the graph keeps the subject line
    let subject = message.lines().next().unwrap_or("");
    GraphNode::new(NodeLabel::Commit, ids::commit_id(sha))
        .with_prop("sha", json!(sha))
        .with_prop("author", json!(author_email))
        .with_prop("authored_at", json!(authored_at.to_rfc3339()))
        .with_prop("message", json!(subject))
}

pub fn developer_node(email: &str, name: &str) -> GraphNode {
    GraphNode::new(NodeLabel::Developer, ids::developer_id(email))
        .with_prop("email", json!(email))
        .with_prop("name", json!(name))
}

pub fn incident_node(
    id: &Uuid,
    title: &str,
    severity: Severity,
    occurred_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    root_cause: Option<&str>,
) -> GraphNode {
    let mut node = GraphNode::new(NodeLabel::Incident, ids::incident_id(id))
        .with_prop("id", json!(id.to_string()))
        .with_prop("title", json!(title))
        .with_prop("severity", json!(severity.to_string()))
        .with_prop("occurred_at", json!(occurred_at.to_rfc3339()));
    if let Some(t) = resolved_at {
        node = node.with_prop("resolved_at", json!(t.to_rfc3339()));
    }
    if let Some(rc) = root_cause {
        node = node.with_prop("root_cause", json!(rc));
    }
    node
}

/// Expansion direction for neighborhood queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
    Both,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GraphCounts {
    pub nodes: usize,
    pub edges: usize,
}
