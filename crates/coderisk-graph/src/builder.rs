//! Stage 2 of the ingestion pipeline: staging rows + parses → graph.
//!
//! The builder exclusively owns graph writes. Node writes precede edge
//! writes; within Layer 2, commit and MODIFIES writes precede co-change
//! materialization. Every edge batch is verified against its expected
//! count after writing.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use coderisk_core::{
    ids,
    limits::{GRAPH_BATCH_SIZE, WINDOW_DAYS},
    CodeRiskError, EdgeKind, Language, NodeLabel, Result,
};
use coderisk_parser::{ParsedFile, TestFileResolver};
use coderisk_staging::StagingStore;

use crate::backend::GraphBackend;
use crate::cochange::compute_cochange;
use crate::model::*;

pub struct BuildInput<'a> {
    pub repo_id: &'a str,
    pub branch: &'a str,
    pub clone_root: &'a Path,
    pub parsed: &'a [ParsedFile],
    pub test_resolver: &'a TestFileResolver,
}

#[derive(Debug, Default, Clone)]
pub struct BuildReport {
    pub nodes_written: usize,
    pub edges_written: usize,
    pub edges_skipped: usize,
    pub co_change_pairs: usize,
    pub incidents_linked: usize,
    pub commits_swept: usize,
    pub diagnostics: Vec<String>,
}

impl BuildReport {
    fn diagnose(&mut self, message: String) {
        warn!("{}", message);
        self.diagnostics.push(message);
    }
}

pub struct GraphBuilder {
    backend: Arc<dyn GraphBackend>,
    staging: StagingStore,
}

impl GraphBuilder {
    pub fn new(backend: Arc<dyn GraphBackend>, staging: StagingStore) -> Self {
        Self { backend, staging }
    }

    pub async fn build(&self, input: BuildInput<'_>) -> Result<BuildReport> {
        let mut report = BuildReport::default();
        let window_start = Utc::now() - Duration::days(WINDOW_DAYS);

        self.rebuild_layer1(&input, &mut report).await?;
        // Layers 2 and 3 are best-effort: the build stands if Layer 1 is
        // complete, but their counts must still be reported.
        if let Err(e) = self.build_layer2(&input, window_start, &mut report).await {
            report.diagnose(format!("temporal layer incomplete: {}", e));
        }
        if let Err(e) = self.build_layer3(&input, &mut report).await {
            report.diagnose(format!("incident layer incomplete: {}", e));
        }
        self.staging.mark_commits_processed(input.repo_id)?;

        info!(
            nodes = report.nodes_written,
            edges = report.edges_written,
            skipped = report.edges_skipped,
            pairs = report.co_change_pairs,
            "graph build complete"
        );
        Ok(report)
    }

    // ---- layer 1: structure ------------------------------------------

    async fn rebuild_layer1(&self, input: &BuildInput<'_>, report: &mut BuildReport) -> Result<()> {
        self.sweep_layer1(input.branch, input.clone_root).await?;

        let repo_node = repository_node(input.repo_id, input.branch);
        let repo_uid = repo_node.unique_id.clone();
        self.write_nodes(std::slice::from_ref(&repo_node), report).await?;

        // nodes first
        let mut nodes = Vec::new();
        for file in input.parsed {
            let mut node = file_node(&file.absolute_path, &file.language, input.branch, None);
            if let Some(err) = &file.parse_error {
                node = node.with_prop("parse_error", json!(err));
            }
            nodes.push(node);
            for f in &file.functions {
                nodes.push(function_node(
                    &file.absolute_path,
                    &f.name,
                    f.start_line,
                    f.end_line,
                    &f.signature,
                ));
            }
            for c in &file.classes {
                nodes.push(class_node(&file.absolute_path, &c.name, c.start_line, c.end_line));
            }
            for i in &file.imports {
                nodes.push(import_node(&file.absolute_path, &i.module_name, i.line));
            }
        }
        self.write_nodes(&nodes, report).await?;

        // then containment
        let mut edges = Vec::new();
        for file in input.parsed {
            let file_uid = ids::file_id(&file.absolute_path);
            edges.push(GraphEdge::new(EdgeKind::Contains, repo_uid.clone(), file_uid.clone()));
            for f in &file.functions {
                edges.push(GraphEdge::new(
                    EdgeKind::Contains,
                    file_uid.clone(),
                    ids::function_id(&file.absolute_path, &f.name, f.start_line),
                ));
            }
            for c in &file.classes {
                edges.push(GraphEdge::new(
                    EdgeKind::Contains,
                    file_uid.clone(),
                    ids::class_id(&file.absolute_path, &c.name, c.start_line),
                ));
            }
            for i in &file.imports {
                edges.push(GraphEdge::new(
                    EdgeKind::Contains,
                    file_uid.clone(),
                    ids::import_id(&file.absolute_path, i.line),
                ));
            }
        }
        self.write_edges("contains", &edges, report).await;

        self.link_imports(input, report).await;
        self.link_calls(input, report).await;
        self.link_tests(input, report).await;
        Ok(())
    }

    /// Layer-1 nodes are branch-specific and fully rebuilt per ingestion.
    async fn sweep_layer1(&self, branch: &str, clone_root: &Path) -> Result<()> {
        let root = clone_root.to_string_lossy();
        for label in [NodeLabel::File, NodeLabel::Function, NodeLabel::Class, NodeLabel::Import] {
            let stale: Vec<GraphNode> = self
                .backend
                .nodes_by_label(label)
                .await?
                .into_iter()
                .filter(|n| {
                    let same_branch = n.str_prop("branch").map(|b| b == branch).unwrap_or(true);
                    let under_root = n
                        .str_prop("file_path")
                        .map(|p| p.starts_with(root.as_ref()))
                        .unwrap_or(false);
                    same_branch && under_root
                })
                .collect();
            for node in stale {
                self.backend.delete_node(&node.unique_id).await?;
            }
        }
        Ok(())
    }

    async fn link_imports(&self, input: &BuildInput<'_>, report: &mut BuildReport) {
        let path_index = PathIndex::new(input.parsed, input.clone_root);
        let mut edges = Vec::new();
        for file in input.parsed {
            for import in &file.imports {
                let Some(target) = path_index.resolve_module(&import.module_name, &file.language)
                else {
                    continue;
                };
                if target == file.absolute_path {
                    continue;
                }
                edges.push(
                    GraphEdge::new(
                        EdgeKind::Imports,
                        ids::file_id(&file.absolute_path),
                        ids::file_id(&target),
                    )
                    .with_prop("resolved", json!(true)),
                );
            }
        }
        self.write_edges("imports", &edges, report).await;
    }

    async fn link_calls(&self, input: &BuildInput<'_>, report: &mut BuildReport) {
        // function name -> (file, start_line); unique names only, so
        // cross-file resolution never guesses between overloads
        let mut by_name: HashMap<&str, Vec<(&str, u32)>> = HashMap::new();
        for file in input.parsed {
            for f in &file.functions {
                by_name
                    .entry(f.name.as_str())
                    .or_default()
                    .push((file.absolute_path.as_str(), f.start_line));
            }
        }

        let mut edges = Vec::new();
        for file in input.parsed {
            let local: HashMap<&str, u32> = file
                .functions
                .iter()
                .map(|f| (f.name.as_str(), f.start_line))
                .collect();
            for call in &file.calls {
                if call.caller.is_empty() {
                    continue;
                }
                let Some(caller_line) = local.get(call.caller.as_str()) else {
                    continue;
                };
                let callee_name = call.callee.rsplit('.').next().unwrap_or(&call.callee);
                let target = if let Some(line) = local.get(callee_name) {
                    Some((file.absolute_path.as_str(), *line))
                } else {
                    match by_name.get(callee_name).map(|v| v.as_slice()) {
                        Some([single]) => Some(*single),
                        _ => None,
                    }
                };
                let Some((target_path, target_line)) = target else {
                    continue;
                };
                edges.push(GraphEdge::new(
                    EdgeKind::Calls,
                    ids::function_id(&file.absolute_path, &call.caller, *caller_line),
                    ids::function_id(target_path, callee_name, target_line),
                ));
            }
        }
        edges.sort_by(|a, b| (&a.from_id, &a.to_id).cmp(&(&b.from_id, &b.to_id)));
        edges.dedup_by(|a, b| a.from_id == b.from_id && a.to_id == b.to_id);
        self.write_edges("calls", &edges, report).await;
    }

    async fn link_tests(&self, input: &BuildInput<'_>, report: &mut BuildReport) {
        let known: HashMap<&str, ()> = input
            .parsed
            .iter()
            .map(|f| (f.absolute_path.as_str(), ()))
            .collect();
        let mut edges = Vec::new();
        for file in input.parsed {
            let path = Path::new(&file.absolute_path);
            if !input.test_resolver.is_test_file(path, &file.language) {
                continue;
            }
            let Some(source) = input.test_resolver.tested_source(path, &file.language) else {
                continue;
            };
            let source = source.to_string_lossy().to_string();
            if known.contains_key(source.as_str()) {
                edges.push(GraphEdge::new(
                    EdgeKind::Tests,
                    ids::file_id(&file.absolute_path),
                    ids::file_id(&source),
                ));
            }
        }
        self.write_edges("tests", &edges, report).await;
    }

    // ---- layer 2: temporal -------------------------------------------

    async fn build_layer2(
        &self,
        input: &BuildInput<'_>,
        window_start: DateTime<Utc>,
        report: &mut BuildReport,
    ) -> Result<()> {
        let commits = self.staging.commits_since(input.repo_id, window_start)?;
        let commit_files = self.staging.commit_files_since(input.repo_id, window_start)?;

        let mut nodes = Vec::new();
        for c in &commits {
            nodes.push(commit_node(&c.sha, &c.author_email, c.authored_at, &c.message));
            if !c.author_email.is_empty() {
                nodes.push(developer_node(&c.author_email, &c.author_name));
            }
        }
        self.write_nodes(&nodes, report).await?;

        let mut authored = Vec::new();
        for c in &commits {
            if c.author_email.is_empty() {
                continue;
            }
            authored.push(GraphEdge::new(
                EdgeKind::Authored,
                ids::developer_id(&c.author_email),
                ids::commit_id(&c.sha),
            ));
        }
        self.write_edges("authored", &authored, report).await;

        // Path discipline: staging holds git-relative paths; every endpoint
        // lookup below uses the absolute form under the clone root.
        let mut modifies = Vec::new();
        let mut absolute_rows: Vec<(String, String)> = Vec::new();
        for cf in &commit_files {
            let absolute = to_absolute(input.clone_root, &cf.path);
            absolute_rows.push((cf.sha.clone(), absolute.clone()));
            modifies.push(
                GraphEdge::new(EdgeKind::Modifies, ids::commit_id(&cf.sha), ids::file_id(&absolute))
                    .with_prop("status", json!(cf.status.to_string()))
                    .with_prop("additions", json!(cf.additions))
                    .with_prop("deletions", json!(cf.deletions)),
            );
        }
        self.write_edges("modifies", &modifies, report).await;

        // co-change after commit+modifies, both directions per pair
        let pairs = compute_cochange(&absolute_rows);
        report.co_change_pairs = pairs.len();
        let mut co_changed = Vec::new();
        for pair in &pairs {
            for (from, to) in [(&pair.a, &pair.b), (&pair.b, &pair.a)] {
                co_changed.push(
                    GraphEdge::new(EdgeKind::CoChanged, ids::file_id(from), ids::file_id(to))
                        .with_prop("frequency", json!(pair.frequency))
                        .with_prop("co_changes", json!(pair.co_changes))
                        .with_prop("window_days", json!(WINDOW_DAYS)),
                );
            }
        }
        self.write_edges("co_changed", &co_changed, report).await;

        self.sweep_layer2(window_start, report).await?;
        Ok(())
    }

    /// Commits that have aged out of the window are garbage-collected.
    async fn sweep_layer2(
        &self,
        window_start: DateTime<Utc>,
        report: &mut BuildReport,
    ) -> Result<()> {
        let commits = self.backend.nodes_by_label(NodeLabel::Commit).await?;
        for node in commits {
            let expired = node
                .str_prop("authored_at")
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc) < window_start)
                .unwrap_or(false);
            if expired {
                self.backend.delete_node(&node.unique_id).await?;
                report.commits_swept += 1;
            }
        }
        Ok(())
    }

    // ---- layer 3: incidents ------------------------------------------

    async fn build_layer3(&self, input: &BuildInput<'_>, report: &mut BuildReport) -> Result<()> {
        let incidents = self.staging.incidents(input.repo_id)?;
        let nodes: Vec<GraphNode> = incidents
            .iter()
            .map(|i| {
                incident_node(
                    &i.id,
                    &i.title,
                    i.severity,
                    i.occurred_at,
                    i.resolved_at,
                    i.root_cause.as_deref(),
                )
            })
            .collect();
        self.write_nodes(&nodes, report).await?;

        let links = self.staging.incident_links(input.repo_id)?;
        let mut edges = Vec::new();
        for link in &links {
            let mut edge = GraphEdge::new(
                EdgeKind::CausedBy,
                ids::incident_id(&link.incident_id),
                ids::file_id(&link.file_path),
            )
            .with_prop("confidence", json!(link.confidence));
            if let Some(line) = link.line_number {
                edge = edge.with_prop("line_number", json!(line));
            }
            if let Some(func) = &link.blamed_function {
                edge = edge.with_prop("blamed_function", json!(func));
            }
            edges.push(edge);
        }
        let before = report.edges_written;
        self.write_edges("caused_by", &edges, report).await;
        report.incidents_linked = report.edges_written - before;
        Ok(())
    }

    // ---- write helpers -----------------------------------------------

    async fn write_nodes(&self, nodes: &[GraphNode], report: &mut BuildReport) -> Result<()> {
        for chunk in nodes.chunks(GRAPH_BATCH_SIZE) {
            for node in chunk {
                self.backend.upsert_node(node).await?;
                report.nodes_written += 1;
            }
        }
        Ok(())
    }

    /// Writes a logical edge batch in chunks, verifying the written count
    /// against the expected count. Missing endpoints are diagnostics, not
    /// failures; the first missing key is named.
    async fn write_edges(&self, stage: &str, edges: &[GraphEdge], report: &mut BuildReport) {
        let expected = edges.len();
        let mut written = 0usize;
        let mut first_missing: Option<String> = None;
        for chunk in edges.chunks(GRAPH_BATCH_SIZE) {
            for edge in chunk {
                match self.backend.upsert_edge(edge).await {
                    Ok(()) => written += 1,
                    Err(CodeRiskError::EndpointMissing(key)) => {
                        report.edges_skipped += 1;
                        first_missing.get_or_insert(key);
                    }
                    Err(e) => {
                        report.diagnose(format!("{}: edge write failed: {}", stage, e));
                        report.edges_skipped += 1;
                    }
                }
            }
        }
        report.edges_written += written;
        if written != expected {
            let key = first_missing.unwrap_or_else(|| "<unknown>".into());
            report.diagnose(format!(
                "{}: wrote {} of {} edges, first unmatched endpoint: {}",
                stage, written, expected, key
            ));
        } else {
            debug!(stage, written, "edge batch verified");
        }
    }
}

fn to_absolute(clone_root: &Path, git_relative: &str) -> String {
    clone_root.join(git_relative).to_string_lossy().to_string()
}

/// Resolves import module names to files inside the repo.
struct PathIndex {
    /// clone-root-relative path (with `/` separators) -> absolute path
    by_relative: HashMap<String, String>,
}

impl PathIndex {
    fn new(parsed: &[ParsedFile], clone_root: &Path) -> Self {
        let root = clone_root.to_string_lossy().to_string();
        let mut by_relative = HashMap::new();
        for file in parsed {
            let relative = file
                .absolute_path
                .strip_prefix(&root)
                .unwrap_or(&file.absolute_path)
                .trim_start_matches('/')
                .to_string();
            by_relative.insert(relative, file.absolute_path.clone());
        }
        Self { by_relative }
    }

    /// Best-effort module -> file mapping. Unresolvable modules (stdlib,
    /// third-party) produce no edge.
    fn resolve_module(&self, module: &str, language: &Language) -> Option<String> {
        let candidates: Vec<String> = match language {
            Language::Python => {
                let path = module.replace('.', "/");
                vec![format!("{}.py", path), format!("{}/__init__.py", path)]
            }
            Language::Go => {
                // import paths end with the package directory; match any
                // file in that directory is too loose, so match the
                // directory's doc-free convention <dir>/<dir>.go first
                let tail = module.rsplit('/').next().unwrap_or(module);
                vec![format!("{}/{}.go", module, tail)]
            }
            Language::JavaScript | Language::TypeScript => {
                let trimmed = module.trim_start_matches("./").trim_start_matches('/');
                let ext = if *language == Language::TypeScript { "ts" } else { "js" };
                vec![
                    format!("{}.{}", trimmed, ext),
                    format!("{}/index.{}", trimmed, ext),
                ]
            }
            Language::Java => {
                vec![format!("{}.java", module.replace('.', "/"))]
            }
            Language::Other(_) => vec![],
        };

        for candidate in &candidates {
            if let Some(absolute) = self.by_relative.get(candidate) {
                return Some(absolute.clone());
            }
        }
        // suffix match as a fallback for nested roots (src/, app/)
        for candidate in &candidates {
            let suffix = format!("/{}", candidate);
            if let Some((_, absolute)) = self
                .by_relative
                .iter()
                .find(|(rel, _)| rel.ends_with(&suffix))
            {
                return Some(absolute.clone());
            }
        }
        None
    }
}
