//! Phase-1 baseline metrics from graph queries.

use std::path::Path;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use coderisk_core::{Language, Result, RiskClass};
use coderisk_graph::GraphReader;
use coderisk_parser::TestFileResolver;

use crate::profiles::RiskConfig;

const CACHE_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricValue {
    pub raw: f64,
    pub class: RiskClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl MetricValue {
    fn new(raw: f64, class: RiskClass) -> Self {
        Self {
            raw,
            class,
            detail: None,
        }
    }

    fn with_detail(mut self, detail: String) -> Self {
        self.detail = Some(detail);
        self
    }

    fn unknown(cause: String) -> Self {
        Self {
            raw: 0.0,
            class: RiskClass::Unknown,
            detail: Some(cause),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetrics {
    pub coupling: MetricValue,
    pub co_change: MetricValue,
    pub test_ratio: MetricValue,
    pub overall: RiskClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

struct CacheEntry {
    metrics: FileMetrics,
    inserted_at: Instant,
}

/// Computes coupling, co-change and test-ratio per file, classified
/// against the active threshold profile. Results are cached keyed by
/// `(repo_id, file_path, content_hash)` with a short TTL; races on the
/// same key are harmless because the key pins the content.
pub struct MetricsEngine {
    reader: GraphReader,
    resolver: TestFileResolver,
    cache: DashMap<(String, String, String), CacheEntry>,
}

impl MetricsEngine {
    pub fn new(reader: GraphReader, resolver: TestFileResolver) -> Self {
        Self {
            reader,
            resolver,
            cache: DashMap::new(),
        }
    }

    pub async fn compute(
        &self,
        repo_id: &str,
        absolute_path: &str,
        language: &Language,
        content_hash: &str,
        config: &RiskConfig,
    ) -> FileMetrics {
        let key = (
            repo_id.to_string(),
            absolute_path.to_string(),
            content_hash.to_string(),
        );
        if let Some(entry) = self.cache.get(&key) {
            if entry.inserted_at.elapsed() < CACHE_TTL {
                debug!(file = absolute_path, "metrics cache hit");
                return entry.metrics.clone();
            }
        }

        let coupling = self.coupling(absolute_path, config).await;
        let co_change = self.co_change(absolute_path, config).await;
        let test_ratio = self.test_ratio(absolute_path, language, config).await;

        let classes = [coupling.class, co_change.class, test_ratio.class];
        let all_unknown = classes.iter().all(|c| *c == RiskClass::Unknown);
        let overall = RiskClass::worst_of(&classes);
        let warning = if all_unknown {
            warn!(file = absolute_path, "no metric computable, degrading to MEDIUM");
            Some("no metric could be computed; risk degraded to MEDIUM".to_string())
        } else {
            None
        };

        let metrics = FileMetrics {
            coupling,
            co_change,
            test_ratio,
            overall,
            warning,
        };
        self.cache.insert(
            key,
            CacheEntry {
                metrics: metrics.clone(),
                inserted_at: Instant::now(),
            },
        );
        metrics
    }

    async fn coupling(&self, absolute_path: &str, config: &RiskConfig) -> MetricValue {
        match self.reader.structural_coupling(absolute_path).await {
            Ok(count) => MetricValue::new(count as f64, config.classify_coupling(count))
                .with_detail(format!("{} files linked by imports", count)),
            Err(e) => MetricValue::unknown(format!("coupling unavailable: {}", e)),
        }
    }

    async fn co_change(&self, absolute_path: &str, config: &RiskConfig) -> MetricValue {
        match self.reader.max_cochange(absolute_path).await {
            Ok(Some(top)) => MetricValue::new(top.frequency, config.classify_cochange(top.frequency))
                .with_detail(format!(
                    "changes with {} in {:.0}% of commits ({} co-changes)",
                    top.file_path,
                    top.frequency * 100.0,
                    top.co_changes
                )),
            Ok(None) => MetricValue::new(0.0, RiskClass::Low)
                .with_detail("no co-change partners in window".to_string()),
            Err(e) => MetricValue::unknown(format!("co-change unavailable: {}", e)),
        }
    }

    async fn test_ratio(
        &self,
        absolute_path: &str,
        language: &Language,
        config: &RiskConfig,
    ) -> MetricValue {
        let source_lines = match line_count(absolute_path) {
            Ok(n) => n,
            Err(e) => return MetricValue::unknown(format!("source unreadable: {}", e)),
        };

        // TESTS edges first, filesystem conventions second
        let mut test_lines = 0usize;
        let graph_tests = self
            .reader
            .test_files_for(absolute_path)
            .await
            .unwrap_or_default();
        let candidates: Vec<String> = if graph_tests.is_empty() {
            self.resolver
                .test_candidates(Path::new(absolute_path), language)
                .into_iter()
                .map(|p| p.to_string_lossy().to_string())
                .collect()
        } else {
            graph_tests
        };
        for candidate in &candidates {
            if let Ok(lines) = line_count(candidate) {
                test_lines += lines;
            }
        }

        let ratio = if source_lines + test_lines == 0 {
            0.0
        } else {
            test_lines as f64 / (source_lines + test_lines) as f64
        };
        MetricValue::new(ratio, config.classify_test_ratio(ratio)).with_detail(format!(
            "{} test lines against {} source lines",
            test_lines, source_lines
        ))
    }
}

fn line_count(path: &str) -> Result<usize> {
    Ok(std::fs::read_to_string(path)?.lines().count())
}

/// Content hash for the metric cache key.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use coderisk_core::{ids, EdgeKind};
    use coderisk_graph::{GraphBackend, GraphEdge, LocalGraphStore};
    use coderisk_graph::model::file_node;
    use serde_json::json;
    use std::sync::Arc;

    async fn engine_with_files() -> (tempfile::TempDir, MetricsEngine, String, String) {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        std::fs::create_dir_all(&repo).unwrap();

        let source = repo.join("server.go");
        std::fs::write(&source, "package main\nfunc main() {}\nvar x = 1\n").unwrap();
        let test = repo.join("server_test.go");
        std::fs::write(&test, "package main\nfunc TestMain(t *testing.T) {}\n").unwrap();

        let store = Arc::new(LocalGraphStore::open(&dir.path().join("graph")).unwrap());
        let source_path = source.to_string_lossy().to_string();
        store
            .upsert_node(&file_node(&source_path, &Language::Go, "main", None))
            .await
            .unwrap();

        let engine = MetricsEngine::new(
            GraphReader::new(store.clone()),
            TestFileResolver::default(),
        );
        (dir, engine, source_path, test.to_string_lossy().to_string())
    }

    #[tokio::test]
    async fn no_imports_means_low_coupling() {
        let (_dir, engine, source, _) = engine_with_files().await;
        let config = RiskConfig::default_profile();
        let metrics = engine
            .compute("acme/widget", &source, &Language::Go, "h1", &config)
            .await;
        assert_eq!(metrics.coupling.raw, 0.0);
        assert_eq!(metrics.coupling.class, RiskClass::Low);
    }

    #[tokio::test]
    async fn test_ratio_uses_conventions() {
        let (_dir, engine, source, _test) = engine_with_files().await;
        let config = RiskConfig::default_profile();
        let metrics = engine
            .compute("acme/widget", &source, &Language::Go, "h2", &config)
            .await;
        // 2 test lines vs 3 source lines -> 0.4, MEDIUM under defaults
        assert!((metrics.test_ratio.raw - 0.4).abs() < 1e-9);
        assert_eq!(metrics.test_ratio.class, RiskClass::Medium);
    }

    #[tokio::test]
    async fn missing_file_degrades_to_unknown() {
        let (_dir, engine, _, _) = engine_with_files().await;
        let config = RiskConfig::default_profile();
        let metrics = engine
            .compute("acme/widget", "/nowhere/gone.go", &Language::Go, "h3", &config)
            .await;
        assert_eq!(metrics.test_ratio.class, RiskClass::Unknown);
        // coupling still computed (file simply has no edges)
        assert_eq!(metrics.coupling.class, RiskClass::Low);
    }

    #[tokio::test]
    async fn cache_returns_same_result_for_same_hash() {
        let (_dir, engine, source, _) = engine_with_files().await;
        let config = RiskConfig::default_profile();
        let first = engine
            .compute("acme/widget", &source, &Language::Go, "same", &config)
            .await;
        let second = engine
            .compute("acme/widget", &source, &Language::Go, "same", &config)
            .await;
        assert_eq!(first.overall, second.overall);
        assert_eq!(engine.cache.len(), 1);
    }

    #[tokio::test]
    async fn high_cochange_classifies_high() {
        let (dir, engine, source, _) = engine_with_files().await;
        let other = dir.path().join("repo/handler.go");
        std::fs::write(&other, "package main\n").unwrap();
        let other_path = other.to_string_lossy().to_string();

        let store = engine.reader.backend().clone();
        store
            .upsert_node(&file_node(&other_path, &Language::Go, "main", None))
            .await
            .unwrap();
        store
            .upsert_edge(
                &GraphEdge::new(
                    EdgeKind::CoChanged,
                    ids::file_id(&source),
                    ids::file_id(&other_path),
                )
                .with_prop("frequency", json!(0.87))
                .with_prop("co_changes", json!(13)),
            )
            .await
            .unwrap();

        let config = RiskConfig::default_profile();
        let metrics = engine
            .compute("acme/widget", &source, &Language::Go, "h4", &config)
            .await;
        assert_eq!(metrics.co_change.class, RiskClass::High);
        assert_eq!(metrics.overall, RiskClass::High);
    }

    #[test]
    fn content_hash_is_stable_and_short() {
        let a = content_hash("hello");
        let b = content_hash("hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(content_hash("other"), a);
    }
}
