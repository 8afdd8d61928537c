//! Confidence-driven investigation loop.
//!
//! An explicit state machine rather than recursion: INIT seeds evidence,
//! each HOP asks the planner for one action, ASSESS updates confidence,
//! and the loop FINALIZEs on confidence ≥ 0.85, hop budget, token budget
//! or wall-clock expiry. A visited set keeps hops on fresh targets.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use coderisk_core::limits::{
    BREAKTHROUGH_DELTA, CONFIDENCE_THRESHOLD, CO_CHANGE_FLOOR, MAX_HOPS, PHASE2_TIMEOUT,
    TOKEN_BUDGET,
};
use coderisk_graph::GraphReader;
use coderisk_metrics::{incident_similarity, ownership_churn};
use coderisk_staging::StagingStore;

use crate::evidence::Evidence;
use crate::llm_provider::{GenerationConfig, LlmProvider, Message};
use crate::prompts::{
    build_hop_prompt, parse_decision, AgentActionKind, PLANNER_SYSTEM_PROMPT,
};

/// Everything an investigation needs to execute actions.
pub struct InvestigationContext {
    pub repo_id: String,
    pub absolute_path: String,
    pub relative_path: String,
    pub diff_preview: String,
    pub reader: GraphReader,
    pub staging: StagingStore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HopRecord {
    pub hop: u32,
    pub action: String,
    pub target: String,
    pub reasoning: String,
    pub tokens: u64,
    pub duration_ms: u64,
    pub confidence_before: f64,
    pub confidence_after: f64,
    /// Confidence moved by more than 0.2 on this hop.
    pub breakthrough: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    ConfidenceReached,
    PlannerFinalized,
    HopBudget,
    TokenBudget,
    WallClock,
    LlmUnavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationOutcome {
    pub evidence: Vec<Evidence>,
    pub hops: Vec<HopRecord>,
    pub final_confidence: f64,
    pub tokens_used: u64,
    pub stop_reason: StopReason,
}

pub struct InvestigationAgent {
    llm: Arc<dyn LlmProvider>,
}

impl InvestigationAgent {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Runs one investigation. `seed` carries the Phase-0 and Phase-1
    /// evidence; `initial_confidence` is the planner's starting point.
    pub async fn investigate(
        &self,
        ctx: &InvestigationContext,
        seed: Vec<Evidence>,
        initial_confidence: f64,
    ) -> InvestigationOutcome {
        let started = Instant::now();
        let mut evidence = seed;
        let mut hops: Vec<HopRecord> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut confidence = initial_confidence;
        let mut tokens_used: u64 = 0;

        let generation = GenerationConfig {
            json_output: true,
            ..GenerationConfig::default()
        };

        let stop_reason = loop {
            let hop = hops.len() as u32 + 1;
            if hop > MAX_HOPS {
                break StopReason::HopBudget;
            }
            if started.elapsed() >= PHASE2_TIMEOUT {
                warn!(file = %ctx.absolute_path, "investigation hit wall clock, finalizing");
                break StopReason::WallClock;
            }

            let visited_list: Vec<String> = visited.iter().cloned().collect();
            let prompt = build_hop_prompt(
                &ctx.absolute_path,
                &ctx.diff_preview,
                &evidence,
                &visited_list,
                hop,
                MAX_HOPS,
            );
            let messages = vec![Message::system(PLANNER_SYSTEM_PROMPT), Message::user(prompt)];

            let hop_started = Instant::now();
            let response = match self.llm.generate_chat(&messages, &generation).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "planner unavailable, finalizing with current evidence");
                    evidence.push(Evidence::LlmUnavailable {
                        reason: e.to_string(),
                    });
                    break StopReason::LlmUnavailable;
                }
            };
            tokens_used += response.token_cost();

            let Some(decision) = parse_decision(&response.content) else {
                evidence.push(Evidence::Diagnostic {
                    message: "planner returned an unparseable decision; finalizing".to_string(),
                });
                break StopReason::PlannerFinalized;
            };

            let confidence_before = confidence;
            confidence = decision.confidence;
            let breakthrough = (confidence - confidence_before).abs() > BREAKTHROUGH_DELTA;

            let record = HopRecord {
                hop,
                action: decision.action.as_str().to_string(),
                target: decision.target.clone(),
                reasoning: decision.reasoning.clone(),
                tokens: response.token_cost(),
                duration_ms: hop_started.elapsed().as_millis() as u64,
                confidence_before,
                confidence_after: confidence,
                breakthrough,
            };
            debug!(
                hop,
                action = record.action,
                target = record.target,
                confidence,
                "hop recorded"
            );
            hops.push(record);

            if decision.action == AgentActionKind::Finalize {
                break StopReason::PlannerFinalized;
            }

            let visit_key = format!("{}:{}", decision.action.as_str(), decision.target);
            if !visited.insert(visit_key) {
                // planner repeated itself; one wasted hop, no re-execution
                evidence.push(Evidence::Diagnostic {
                    message: format!("planner revisited {}, skipping", decision.target),
                });
            } else if let Some(item) = self.execute(ctx, &decision.action, &decision.target).await {
                evidence.push(item);
            }

            if confidence >= CONFIDENCE_THRESHOLD {
                break StopReason::ConfidenceReached;
            }
            if tokens_used >= TOKEN_BUDGET {
                info!(tokens_used, "token budget exhausted, finalizing");
                break StopReason::TokenBudget;
            }
        };

        InvestigationOutcome {
            evidence,
            hops,
            final_confidence: confidence,
            tokens_used,
            stop_reason,
        }
    }

    async fn execute(
        &self,
        ctx: &InvestigationContext,
        action: &AgentActionKind,
        target: &str,
    ) -> Option<Evidence> {
        match action {
            AgentActionKind::ExpandGraph => {
                if target.eq_ignore_ascii_case("IMPORTS") {
                    match ctx.reader.blast_radius(&ctx.absolute_path, 1).await {
                        Ok(files) => Some(Evidence::BlastRadius { files, hops: 1 }),
                        Err(e) => Some(Evidence::Diagnostic {
                            message: format!("graph expansion failed: {}", e),
                        }),
                    }
                } else {
                    match ctx
                        .reader
                        .cochange_neighbors(&ctx.absolute_path, CO_CHANGE_FLOOR)
                        .await
                    {
                        Ok(neighbors) => Some(Evidence::CoChangePartners { neighbors }),
                        Err(e) => Some(Evidence::Diagnostic {
                            message: format!("co-change expansion failed: {}", e),
                        }),
                    }
                }
            }
            AgentActionKind::ComputeMetric => {
                if target.eq_ignore_ascii_case("incident_similarity") {
                    let query = similarity_query(&ctx.relative_path, &ctx.diff_preview);
                    match incident_similarity(&ctx.staging, &query, 5) {
                        Ok(similarity) => Some(Evidence::SimilarReports { similarity }),
                        Err(e) => Some(Evidence::Diagnostic {
                            message: format!("incident similarity failed: {}", e),
                        }),
                    }
                } else {
                    match ownership_churn(&ctx.staging, &ctx.repo_id, &ctx.relative_path) {
                        Ok(churn) => Some(Evidence::Ownership { churn }),
                        Err(e) => Some(Evidence::Diagnostic {
                            message: format!("ownership churn failed: {}", e),
                        }),
                    }
                }
            }
            AgentActionKind::FetchIncidents => {
                match ctx.reader.incidents_for(&ctx.absolute_path).await {
                    Ok(incidents) => Some(Evidence::LinkedIncidents { incidents }),
                    Err(e) => Some(Evidence::Diagnostic {
                        message: format!("incident fetch failed: {}", e),
                    }),
                }
            }
            AgentActionKind::Finalize => None,
        }
    }
}

/// Search terms for the incident-similarity metric: the file stem plus
/// identifier-looking tokens from the diff.
fn similarity_query(relative_path: &str, diff: &str) -> String {
    let stem = relative_path
        .rsplit('/')
        .next()
        .unwrap_or(relative_path)
        .split('.')
        .next()
        .unwrap_or(relative_path);
    let mut terms = vec![stem.to_string()];
    for line in diff.lines().filter(|l| l.starts_with('+')).take(20) {
        for token in line.split(|c: char| !c.is_ascii_alphanumeric() && c != '_') {
            if token.len() >= 5 && token.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
                terms.push(token.to_string());
            }
        }
    }
    terms.sort();
    terms.dedup();
    terms.truncate(8);
    terms.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedProvider;
    use coderisk_graph::{GraphBackend, LocalGraphStore};
    use coderisk_graph::model::file_node;
    use coderisk_core::Language;

    async fn context(dir: &tempfile::TempDir) -> InvestigationContext {
        let store = Arc::new(LocalGraphStore::open(&dir.path().join("graph")).unwrap());
        store
            .upsert_node(&file_node("/r/src/a.py", &Language::Python, "main", None))
            .await
            .unwrap();
        InvestigationContext {
            repo_id: "acme/widget".into(),
            absolute_path: "/r/src/a.py".into(),
            relative_path: "src/a.py".into(),
            diff_preview: "+def handler():\n".into(),
            reader: GraphReader::new(store),
            staging: StagingStore::in_memory().unwrap(),
        }
    }

    #[tokio::test]
    async fn stops_when_confidence_reached() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir).await;
        let llm = Arc::new(ScriptedProvider::new(vec![
            r#"{"action": "FETCH_INCIDENTS", "target": "", "reasoning": "check history", "confidence": 0.9}"#.into(),
        ]));
        let agent = InvestigationAgent::new(llm);
        let outcome = agent.investigate(&ctx, vec![], 0.5).await;

        assert_eq!(outcome.stop_reason, StopReason::ConfidenceReached);
        assert_eq!(outcome.hops.len(), 1);
        assert!(outcome.hops[0].breakthrough);
        // P7: the trace contains the crossing hop
        assert!(outcome
            .hops
            .iter()
            .any(|h| h.confidence_before < CONFIDENCE_THRESHOLD
                && h.confidence_after >= CONFIDENCE_THRESHOLD));
    }

    #[tokio::test]
    async fn hop_budget_caps_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir).await;
        // planner never converges: 0.84 forever, alternating targets
        let responses: Vec<String> = (0..10)
            .map(|i| {
                format!(
                    r#"{{"action": "EXPAND_GRAPH", "target": "t{}", "reasoning": "more", "confidence": 0.84}}"#,
                    i
                )
            })
            .collect();
        let agent = InvestigationAgent::new(Arc::new(ScriptedProvider::new(responses)));
        let outcome = agent.investigate(&ctx, vec![], 0.5).await;

        assert_eq!(outcome.stop_reason, StopReason::HopBudget);
        assert_eq!(outcome.hops.len() as u32, MAX_HOPS);
        assert!(outcome.final_confidence < CONFIDENCE_THRESHOLD);
    }

    #[tokio::test]
    async fn llm_failure_finalizes_with_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir).await;
        let agent = InvestigationAgent::new(Arc::new(ScriptedProvider::failing()));
        let outcome = agent.investigate(&ctx, vec![], 0.5).await;

        assert_eq!(outcome.stop_reason, StopReason::LlmUnavailable);
        assert!(outcome
            .evidence
            .iter()
            .any(|e| matches!(e, Evidence::LlmUnavailable { .. })));
        // the failure itself must not raise risk
        assert_eq!(outcome.final_confidence, 0.5);
    }

    #[tokio::test]
    async fn revisited_targets_are_not_reexecuted() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir).await;
        let same = r#"{"action": "FETCH_INCIDENTS", "target": "", "reasoning": "again", "confidence": 0.6}"#;
        let responses = vec![same.to_string(), same.to_string(),
            r#"{"action": "FINALIZE", "target": "", "reasoning": "done", "confidence": 0.8}"#.to_string()];
        let agent = InvestigationAgent::new(Arc::new(ScriptedProvider::new(responses)));
        let outcome = agent.investigate(&ctx, vec![], 0.5).await;

        let incident_items = outcome
            .evidence
            .iter()
            .filter(|e| matches!(e, Evidence::LinkedIncidents { .. }))
            .count();
        assert_eq!(incident_items, 1);
        assert!(outcome
            .evidence
            .iter()
            .any(|e| matches!(e, Evidence::Diagnostic { .. })));
    }

    #[test]
    fn similarity_query_picks_identifiers() {
        let q = similarity_query("src/session.py", "+def refresh_token(user):\n+    return x\n");
        assert!(q.contains("session"));
        assert!(q.contains("refresh_token"));
    }
}
