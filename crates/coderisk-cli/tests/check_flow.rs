//! End-to-end check scenarios against a local graph store, an in-memory
//! staging store and a scripted planner.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use coderisk_ai::{Evidence, ScriptedProvider};
use coderisk_cli::orchestrator::Orchestrator;
use coderisk_core::{ids, ChangeStatus, ChangedFile, EdgeKind, Language, RiskLevel, Severity};
use coderisk_graph::model::{file_node, incident_node};
use coderisk_graph::{GraphBackend, GraphEdge, GraphReader, LocalGraphStore};
use coderisk_metrics::MetricsEngine;
use coderisk_parser::TestFileResolver;
use coderisk_staging::StagingStore;

struct Fixture {
    _dir: tempfile::TempDir,
    clone_root: std::path::PathBuf,
    backend: Arc<LocalGraphStore>,
    staging: StagingStore,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let clone_root = dir.path().join("repo");
        std::fs::create_dir_all(&clone_root).unwrap();
        let backend = Arc::new(LocalGraphStore::open(&dir.path().join("graph")).unwrap());
        let staging = StagingStore::in_memory().unwrap();
        Self {
            _dir: dir,
            clone_root,
            backend,
            staging,
        }
    }

    /// Writes the file to disk and registers its graph node.
    async fn add_file(&self, rel: &str, content: &str, language: Language) -> String {
        let path = self.clone_root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        let absolute = path.to_string_lossy().to_string();
        self.backend
            .upsert_node(&file_node(&absolute, &language, "main", None))
            .await
            .unwrap();
        absolute
    }

    fn orchestrator(&self, llm: Option<Arc<ScriptedProvider>>) -> Orchestrator {
        let reader = GraphReader::new(self.backend.clone());
        Orchestrator {
            repo_id: "acme/widget".into(),
            branch: "main".into(),
            clone_root: self.clone_root.clone(),
            staging: self.staging.clone(),
            reader: reader.clone(),
            engine: Arc::new(MetricsEngine::new(reader, TestFileResolver::default())),
            llm: llm.map(|p| p as Arc<dyn coderisk_ai::LlmProvider>),
        }
    }

    fn changed(&self, rel: &str, diff: &str) -> ChangedFile {
        ChangedFile::new(rel, ChangeStatus::Modified).with_diff(diff)
    }
}

#[tokio::test]
async fn docs_only_change_returns_low_without_hops() {
    let fx = Fixture::new();
    fx.add_file("README.md", "# widget\n", Language::Other("markdown".into()))
        .await;

    let outcome = fx
        .orchestrator(None)
        .check(vec![fx.changed("README.md", "+hello\n")])
        .await;

    assert_eq!(outcome.overall, RiskLevel::Low);
    assert_eq!(outcome.agent_hops, 0);
    assert_eq!(outcome.files.len(), 1);
    assert_eq!(outcome.exit_code(), 0);
}

#[tokio::test]
async fn security_change_forces_escalation_and_blocks() {
    let fx = Fixture::new();
    fx.add_file(
        "src/auth/session.py",
        "def old_login(user):\n    return user\n",
        Language::Python,
    )
    .await;

    let outcome = fx
        .orchestrator(None)
        .check(vec![fx.changed(
            "src/auth/session.py",
            "+def new_login(user):\n+    return session_for(user)\n",
        )])
        .await;

    assert!(outcome.overall >= RiskLevel::High);
    assert!(outcome.verdict.should_block_commit);
    assert!(outcome.exit_code() >= 2);
    // evidence carries the security-keyword item
    let has_security_evidence = outcome
        .files
        .iter()
        .any(|f| !f.phase0.security_keywords.is_empty());
    assert!(has_security_evidence);
}

#[tokio::test]
async fn high_coupling_without_llm_reports_high_and_diagnostic() {
    let fx = Fixture::new();
    // target file: 12 import partners, decent test coverage
    let target = fx
        .add_file("src/hub.go", "package main\nfunc hub() {}\n", Language::Go)
        .await;
    fx.add_file(
        "src/hub_test.go",
        "package main\nfunc TestHub(t *testing.T) {}\nfunc TestMore(t *testing.T) {}\n",
        Language::Go,
    )
    .await;
    for i in 0..12 {
        let other = fx
            .add_file(&format!("src/dep{}.go", i), "package main\n", Language::Go)
            .await;
        fx.backend
            .upsert_edge(&GraphEdge::new(
                EdgeKind::Imports,
                ids::file_id(&target),
                ids::file_id(&other),
            ))
            .await
            .unwrap();
    }

    let outcome = fx
        .orchestrator(None) // no API key -> Phase 2 unavailable
        .check(vec![fx.changed("src/hub.go", "+func hub2() {}\n")])
        .await;

    assert_eq!(outcome.overall, RiskLevel::High);
    assert_eq!(outcome.exit_code(), 2);
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.contains("LLM unavailable")));
    let report = &outcome.files[0];
    assert_eq!(report.metrics.as_ref().unwrap().coupling.raw, 12.0);
    let investigation = report.investigation.as_ref().unwrap();
    assert!(investigation
        .evidence
        .iter()
        .any(|e| matches!(e, Evidence::LlmUnavailable { .. })));
}

#[tokio::test]
async fn temporal_pair_in_changed_set_is_reported() {
    let fx = Fixture::new();
    let a = fx
        .add_file("path/a.go", "package main\n", Language::Go)
        .await;
    let b = fx
        .add_file("path/b.go", "package main\n", Language::Go)
        .await;
    for (from, to) in [(&a, &b), (&b, &a)] {
        fx.backend
            .upsert_edge(
                &GraphEdge::new(EdgeKind::CoChanged, ids::file_id(from), ids::file_id(to))
                    .with_prop("frequency", json!(0.87))
                    .with_prop("co_changes", json!(13))
                    .with_prop("window_days", json!(90)),
            )
            .await
            .unwrap();
    }

    let outcome = fx
        .orchestrator(None)
        .check(vec![
            fx.changed("path/a.go", "+func a() {}\n"),
            fx.changed("path/b.go", "+func b() {}\n"),
        ])
        .await;

    assert_eq!(outcome.temporal_pairs.len(), 1);
    assert!((outcome.temporal_pairs[0].frequency - 0.87).abs() < 1e-9);
    // high co-change yields the integration-test recommendation
    assert!(outcome
        .verdict
        .recommendations
        .iter()
        .any(|r| r.action.contains("integration tests")));
}

#[tokio::test]
async fn incident_linked_file_is_investigated_and_cited() {
    let fx = Fixture::new();
    let target = fx
        .add_file("src/checkout.py", "def charge():\n    pass\n", Language::Python)
        .await;
    // push Phase 1 to HIGH so Phase 2 triggers
    for i in 0..12 {
        let other = fx
            .add_file(&format!("src/m{}.py", i), "x = 1\n", Language::Python)
            .await;
        fx.backend
            .upsert_edge(&GraphEdge::new(
                EdgeKind::Imports,
                ids::file_id(&target),
                ids::file_id(&other),
            ))
            .await
            .unwrap();
    }

    let incident = Uuid::new_v4();
    fx.backend
        .upsert_node(&incident_node(
            &incident,
            "checkout outage",
            Severity::Critical,
            Utc::now() - chrono::Duration::days(14),
            None,
            None,
        ))
        .await
        .unwrap();
    fx.backend
        .upsert_edge(
            &GraphEdge::new(
                EdgeKind::CausedBy,
                ids::incident_id(&incident),
                ids::file_id(&target),
            )
            .with_prop("confidence", json!(1.0)),
        )
        .await
        .unwrap();

    let llm = Arc::new(ScriptedProvider::new(vec![
        r#"{"action": "FETCH_INCIDENTS", "target": "", "reasoning": "file may have history", "confidence": 0.6}"#.into(),
        r#"{"action": "FINALIZE", "target": "", "reasoning": "incident confirms risk", "confidence": 0.9}"#.into(),
    ]));
    let outcome = fx
        .orchestrator(Some(llm))
        .check(vec![fx.changed("src/checkout.py", "+def refund():\n+    pass\n")])
        .await;

    assert!(outcome.overall >= RiskLevel::High);
    assert!(outcome.agent_hops >= 1);
    let investigation = outcome.files[0].investigation.as_ref().unwrap();
    let cited = investigation.evidence.iter().any(|e| match e {
        Evidence::LinkedIncidents { incidents } => {
            incidents.iter().any(|i| i.severity == Severity::Critical)
        }
        _ => false,
    });
    assert!(cited, "evidence must cite the critical incident");
}

#[tokio::test]
async fn unresolved_path_degrades_to_prefilter_only() {
    let fx = Fixture::new();
    // nothing ingested for this path
    let outcome = fx
        .orchestrator(None)
        .check(vec![fx.changed("ghost/missing.go", "+func g() {}\n")])
        .await;

    let report = &outcome.files[0];
    assert!(!report.resolved_in_graph);
    assert!(report.metrics.is_none());
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.contains("ghost/missing.go")));
    // risk reflects only what the pre-filter can say
    assert_eq!(outcome.exit_code(), 0);
}

#[tokio::test]
async fn ai_mode_document_matches_contract() {
    let fx = Fixture::new();
    fx.add_file("README.md", "# docs\n", Language::Other("markdown".into()))
        .await;
    let orchestrator = fx.orchestrator(None);
    let outcome = orchestrator
        .check(vec![fx.changed("README.md", "+hello\n")])
        .await;

    let reader = GraphReader::new(fx.backend.clone());
    let doc = coderisk_cli::ai_schema::build_document(&outcome, &reader).await;
    assert_eq!(doc.meta.version, "1.0");
    assert_eq!(doc.meta.files_analyzed, 1);
    assert_eq!(doc.meta.agent_hops, 0);
    assert_eq!(doc.risk.level, RiskLevel::Low);

    // re-serializing a validated document is accepted
    let text = serde_json::to_string(&doc).unwrap();
    let reparsed: coderisk_cli::ai_schema::AiDocument = serde_json::from_str(&text).unwrap();
    assert_eq!(reparsed.meta.version, doc.meta.version);
    assert!(!reparsed.should_block_commit);
}

#[tokio::test]
async fn comment_only_diff_is_low() {
    let fx = Fixture::new();
    fx.add_file("src/a.go", "package main\n", Language::Go).await;
    let outcome = fx
        .orchestrator(None)
        .check(vec![fx.changed("src/a.go", "+// one-line comment\n")])
        .await;
    assert_eq!(outcome.overall, RiskLevel::Low);
    assert_eq!(outcome.exit_code(), 0);
}
