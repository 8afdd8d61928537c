//! The `check` pipeline: path resolution, Phase 0/1/2 sequencing and
//! aggregation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use coderisk_ai::{
    Evidence, InvestigationAgent, InvestigationContext, InvestigationOutcome, LlmProvider,
    StopReason, Synthesizer, Verdict,
};
use coderisk_core::{
    limits::{AGENT_POOL, PHASE1_TIMEOUT, PHASE2_TIMEOUT},
    ChangedFile, RiskLevel,
};
use coderisk_graph::GraphReader;
use coderisk_metrics::{
    content_hash, infer_profile, select, FileMetrics, Phase0Decision, Phase0Result, PreFilter,
    Selection,
};
use coderisk_staging::StagingStore;

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub changed: ChangedFile,
    pub phase0: Phase0Result,
    pub metrics: Option<FileMetrics>,
    pub investigation: Option<InvestigationOutcome>,
    pub level: RiskLevel,
    pub resolved_in_graph: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemporalPair {
    pub a: String,
    pub b: String,
    pub frequency: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub overall: RiskLevel,
    pub files: Vec<FileReport>,
    pub verdict: Verdict,
    pub selection: Selection,
    pub temporal_pairs: Vec<TemporalPair>,
    pub diagnostics: Vec<String>,
    pub duration_ms: u64,
    pub branch: String,
    pub agent_hops: u32,
    pub llm_available: bool,
}

impl CheckOutcome {
    pub fn exit_code(&self) -> i32 {
        self.overall.exit_code()
    }
}

pub struct Orchestrator {
    pub repo_id: String,
    pub branch: String,
    pub clone_root: PathBuf,
    pub staging: StagingStore,
    pub reader: GraphReader,
    pub engine: Arc<coderisk_metrics::MetricsEngine>,
    pub llm: Option<Arc<dyn LlmProvider>>,
}

impl Orchestrator {
    pub async fn check(&self, mut changes: Vec<ChangedFile>) -> CheckOutcome {
        let started = Instant::now();
        let mut diagnostics = Vec::new();

        // Path discipline: graph lookups use absolute paths under the
        // ingested clone root, never the git-relative form.
        for file in &mut changes {
            let absolute = self
                .clone_root
                .join(&file.path)
                .to_string_lossy()
                .to_string();
            match self.reader.file_exists(&absolute).await {
                Ok(true) => file.absolute_path = Some(absolute),
                Ok(false) => {
                    diagnostics.push(format!(
                        "path not in graph, running pre-filter only: {}",
                        file.path
                    ));
                }
                Err(e) => {
                    diagnostics.push(format!("graph lookup failed for {}: {}", file.path, e));
                }
            }
        }

        let selection = self.select_config().await;
        info!(profile = %selection.config.name, "risk profile selected: {}", selection.reason);

        // Phase 0 + Phase 1 per file
        let mut reports: Vec<FileReport> = Vec::new();
        for file in changes {
            let report = self.assess_file(file, &selection).await;
            reports.push(report);
        }

        // Phase 2 for HIGH or force-escalated files, bounded concurrency
        let agent_targets: Vec<usize> = reports
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                r.resolved_in_graph
                    && (r.level >= RiskLevel::High
                        || matches!(r.phase0.decision, Phase0Decision::ForceEscalate { .. }))
            })
            .map(|(i, _)| i)
            .collect();

        let mut agent_hops = 0u32;
        if let Some(llm) = &self.llm {
            // investigations for different files run concurrently, capped
            // by the agent pool; hops within one stay strictly ordered
            let semaphore = Arc::new(Semaphore::new(AGENT_POOL));
            let outcomes: Vec<(usize, InvestigationOutcome)> =
                futures::stream::iter(agent_targets.into_iter().map(|index| {
                    let semaphore = semaphore.clone();
                    let llm = llm.clone();
                    let report = reports[index].clone();
                    async move {
                        let _permit = semaphore.acquire().await.expect("agent pool closed");
                        let outcome = self.investigate(&report, llm).await;
                        (index, outcome)
                    }
                }))
                .buffer_unordered(AGENT_POOL)
                .collect()
                .await;
            for (index, outcome) in outcomes {
                agent_hops += outcome.hops.len() as u32;
                reports[index].investigation = Some(outcome);
            }
        } else if !agent_targets.is_empty() {
            diagnostics.push("LLM unavailable; agentic investigation skipped".to_string());
            for index in agent_targets {
                let mut evidence = self.seed_evidence(&reports[index]);
                evidence.push(Evidence::LlmUnavailable {
                    reason: "no provider configured or API key missing".to_string(),
                });
                reports[index].investigation = Some(InvestigationOutcome {
                    evidence,
                    hops: Vec::new(),
                    final_confidence: 0.5,
                    tokens_used: 0,
                    stop_reason: StopReason::LlmUnavailable,
                });
            }
        }

        // Aggregate: worst file level, plus the multi-file coupling boost.
        let mut overall = reports
            .iter()
            .map(|r| r.level)
            .max()
            .unwrap_or(RiskLevel::Minimal);
        let temporal_pairs = self.changed_pair_coupling(&reports).await;
        if !temporal_pairs.is_empty() {
            let boosted = bump(overall);
            if boosted != overall {
                debug!(
                    pairs = temporal_pairs.len(),
                    "multi-file coupling boost applied"
                );
                overall = boosted;
            }
        }

        // Floors from force escalation hold regardless of later phases.
        let floor = reports
            .iter()
            .filter_map(|r| match &r.phase0.decision {
                Phase0Decision::ForceEscalate { floor, .. } => Some(*floor),
                _ => None,
            })
            .max();
        if let Some(f) = floor {
            overall = overall.max(f);
        }

        let verdict = self.synthesize(&reports, &temporal_pairs, floor, overall).await;
        overall = overall.max(verdict.risk_level);

        CheckOutcome {
            overall,
            verdict,
            selection,
            temporal_pairs,
            diagnostics,
            duration_ms: started.elapsed().as_millis() as u64,
            branch: self.branch.clone(),
            agent_hops,
            llm_available: self.llm.is_some(),
            files: reports,
        }
    }

    async fn assess_file(&self, file: ChangedFile, selection: &Selection) -> FileReport {
        let phase0 = PreFilter::classify(&file);
        let resolved_in_graph = file.absolute_path.is_some();

        // Skip: documentation-only files end here.
        if phase0.decision == Phase0Decision::SkipLow {
            return FileReport {
                changed: file,
                phase0,
                metrics: None,
                investigation: None,
                level: RiskLevel::Low,
                resolved_in_graph,
            };
        }

        // Unresolvable paths degrade to Phase-0-only.
        let Some(absolute) = file.absolute_path.clone() else {
            let level = match &phase0.decision {
                Phase0Decision::ForceEscalate { floor, .. } => *floor,
                _ => RiskLevel::Low,
            };
            return FileReport {
                changed: file,
                phase0,
                metrics: None,
                investigation: None,
                level,
                resolved_in_graph: false,
            };
        };

        // Phase 1 always runs for evidence; a force floor is never
        // overridden by it.
        let language = std::path::Path::new(&absolute)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| match e {
                "go" => coderisk_core::Language::Go,
                "py" | "pyi" => coderisk_core::Language::Python,
                "js" | "jsx" => coderisk_core::Language::JavaScript,
                "ts" | "tsx" => coderisk_core::Language::TypeScript,
                "java" => coderisk_core::Language::Java,
                other => coderisk_core::Language::Other(other.to_string()),
            })
            .unwrap_or(coderisk_core::Language::Other("unknown".into()));
        let hash = std::fs::read_to_string(&absolute)
            .map(|c| content_hash(&c))
            .unwrap_or_else(|_| content_hash(&file.diff_text));

        let metrics = match tokio::time::timeout(
            PHASE1_TIMEOUT,
            self.engine
                .compute(&self.repo_id, &absolute, &language, &hash, &selection.config),
        )
        .await
        {
            Ok(m) => Some(m),
            Err(_) => {
                warn!(file = %file.path, "phase-1 metrics timed out");
                None
            }
        };

        let metric_level = metrics
            .as_ref()
            .map(|m| m.overall.to_level())
            .unwrap_or(RiskLevel::Medium);
        let level = match &phase0.decision {
            Phase0Decision::ForceEscalate { floor, .. } => metric_level.max(*floor),
            _ => metric_level,
        };

        FileReport {
            changed: file,
            phase0,
            metrics,
            investigation: None,
            level,
            resolved_in_graph,
        }
    }

    fn seed_evidence(&self, report: &FileReport) -> Vec<Evidence> {
        let mut evidence = Vec::new();
        let forced_floor = match &report.phase0.decision {
            Phase0Decision::ForceEscalate { floor, .. } => Some(*floor),
            _ => None,
        };
        evidence.push(Evidence::PreFilter {
            result: report.phase0.clone(),
            forced_floor,
        });
        if let Some(metrics) = &report.metrics {
            evidence.push(Evidence::Baseline {
                metrics: metrics.clone(),
            });
        }
        evidence
    }

    async fn investigate(
        &self,
        report: &FileReport,
        llm: Arc<dyn LlmProvider>,
    ) -> InvestigationOutcome {
        let absolute = report
            .changed
            .absolute_path
            .clone()
            .unwrap_or_else(|| report.changed.path.clone());
        let ctx = InvestigationContext {
            repo_id: self.repo_id.clone(),
            absolute_path: absolute,
            relative_path: report.changed.path.clone(),
            diff_preview: report.changed.diff_text.chars().take(2_000).collect(),
            reader: self.reader.clone(),
            staging: self.staging.clone(),
        };
        let seed = self.seed_evidence(report);
        let agent = InvestigationAgent::new(llm);

        match tokio::time::timeout(PHASE2_TIMEOUT, agent.investigate(&ctx, seed.clone(), 0.5)).await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(file = %report.changed.path, "investigation timed out");
                let mut evidence = seed;
                evidence.push(Evidence::Diagnostic {
                    message: "investigation aborted at the 60 s wall clock".to_string(),
                });
                InvestigationOutcome {
                    evidence,
                    hops: Vec::new(),
                    final_confidence: 0.5,
                    tokens_used: 0,
                    stop_reason: StopReason::WallClock,
                }
            }
        }
    }

    /// Pairs of changed files coupled at CO_CHANGED >= 0.7.
    async fn changed_pair_coupling(&self, reports: &[FileReport]) -> Vec<TemporalPair> {
        let resolved: Vec<&str> = reports
            .iter()
            .filter_map(|r| r.changed.absolute_path.as_deref())
            .collect();
        let mut pairs = Vec::new();
        for (i, a) in resolved.iter().enumerate() {
            let Ok(neighbors) = self.reader.cochange_neighbors(a, 0.7).await else {
                continue;
            };
            for neighbor in neighbors {
                if resolved[i + 1..].contains(&neighbor.file_path.as_str()) {
                    pairs.push(TemporalPair {
                        a: a.to_string(),
                        b: neighbor.file_path.clone(),
                        frequency: neighbor.frequency,
                    });
                }
            }
        }
        pairs
    }

    async fn synthesize(
        &self,
        reports: &[FileReport],
        temporal_pairs: &[TemporalPair],
        floor: Option<RiskLevel>,
        baseline_overall: RiskLevel,
    ) -> Verdict {
        let mut evidence: Vec<Evidence> = Vec::new();
        let mut hops: Vec<coderisk_ai::HopRecord> = Vec::new();
        let mut confidence = 0.9; // metric-only verdicts are confident
        let mut stop_reason = None;

        for report in reports {
            if let Some(outcome) = &report.investigation {
                evidence.extend(outcome.evidence.iter().cloned());
                hops.extend(outcome.hops.iter().cloned());
                confidence = outcome.final_confidence;
                stop_reason = Some(outcome.stop_reason);
            } else {
                evidence.extend(self.seed_evidence(report));
            }
        }
        for pair in temporal_pairs {
            // surfaces as a temporal signal so the synthesizer produces the
            // shared-integration-test recommendation for the pair
            evidence.push(Evidence::CoChangePartners {
                neighbors: vec![coderisk_graph::CoChangeNeighbor {
                    file_path: pair.b.clone(),
                    frequency: pair.frequency,
                    co_changes: 0,
                }],
            });
        }

        let paths: Vec<String> = reports.iter().map(|r| r.changed.path.clone()).collect();
        let synthesizer = Synthesizer::new(self.llm.clone());
        let verdict = synthesizer
            .synthesize(
                &paths,
                &evidence,
                &hops,
                confidence,
                stop_reason,
                floor.or(Some(baseline_overall).filter(|l| *l >= RiskLevel::High)),
            )
            .await;
        verdict
    }

    async fn select_config(&self) -> Selection {
        let languages = self
            .staging
            .repository(&self.repo_id)
            .ok()
            .flatten()
            .map(|r| r.languages)
            .unwrap_or_default();
        let top_level: Vec<String> = std::fs::read_dir(&self.clone_root)
            .map(|entries| {
                entries
                    .flatten()
                    .filter_map(|e| e.file_name().to_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        let profile = infer_profile(&languages, &top_level, &[]);
        select(&profile)
    }
}

fn bump(level: RiskLevel) -> RiskLevel {
    match level {
        RiskLevel::Minimal => RiskLevel::Low,
        RiskLevel::Low => RiskLevel::Medium,
        RiskLevel::Medium => RiskLevel::High,
        RiskLevel::High | RiskLevel::Critical => level,
    }
}
