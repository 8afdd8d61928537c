//! Evidence synthesis: weighted scoring, verdict, narrative and
//! recommendations.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use coderisk_core::limits::CONFIDENCE_THRESHOLD;
use coderisk_core::RiskLevel;

use crate::agent::{HopRecord, StopReason};
use crate::evidence::{Evidence, EvidenceSource};
use crate::llm_provider::{GenerationConfig, LlmProvider, Message};
use crate::prompts::build_summary_prompt;

/// Group weights for the overall score. Structural coupling is already
/// folded into the Phase-1 baseline item.
const WEIGHT_INCIDENTS: f64 = 0.5;
const WEIGHT_TEMPORAL: f64 = 0.3;
const WEIGHT_OWNERSHIP: f64 = 0.2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: u32,
    pub action: String,
    pub target: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub risk_level: RiskLevel,
    pub score: f64,
    pub confidence: f64,
    pub summary: String,
    pub recommendations: Vec<Recommendation>,
    pub should_block_commit: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub notes: Vec<String>,
}

pub struct Synthesizer {
    llm: Option<Arc<dyn LlmProvider>>,
}

impl Synthesizer {
    pub fn new(llm: Option<Arc<dyn LlmProvider>>) -> Self {
        Self { llm }
    }

    pub async fn synthesize(
        &self,
        file_paths: &[String],
        evidence: &[Evidence],
        hops: &[HopRecord],
        final_confidence: f64,
        stop_reason: Option<StopReason>,
        floor: Option<RiskLevel>,
    ) -> Verdict {
        let score = weighted_score(evidence);
        let mut risk_level = RiskLevel::from_score(score);
        if let Some(floor) = floor {
            risk_level = risk_level.max(floor);
        }

        let mut notes = Vec::new();
        if matches!(stop_reason, Some(StopReason::HopBudget | StopReason::TokenBudget))
            && final_confidence < CONFIDENCE_THRESHOLD
        {
            notes.push(format!(
                "confidence below threshold ({:.2} < {:.2}), best-effort verdict",
                final_confidence, CONFIDENCE_THRESHOLD
            ));
        }
        if let Some(StopReason::LlmUnavailable) = stop_reason {
            notes.push("investigation ran without LLM assistance".to_string());
        }

        let recommendations = recommendations_from(evidence, file_paths);
        let summary = self
            .narrative(file_paths, evidence)
            .await
            .unwrap_or_else(|| fallback_summary(risk_level, evidence, hops));

        debug!(score, %risk_level, "verdict synthesized");
        Verdict {
            risk_level,
            score,
            confidence: final_confidence,
            summary,
            recommendations,
            should_block_commit: risk_level.blocks_commit(),
            notes,
        }
    }

    async fn narrative(&self, file_paths: &[String], evidence: &[Evidence]) -> Option<String> {
        let llm = self.llm.as_ref()?;
        let prompt = build_summary_prompt(file_paths, evidence);
        let config = GenerationConfig {
            max_tokens: 256,
            ..GenerationConfig::default()
        };
        match llm.generate_chat(&[Message::user(prompt)], &config).await {
            Ok(response) if !response.content.trim().is_empty() => {
                Some(response.content.trim().to_string())
            }
            _ => None,
        }
    }
}

/// Highest severity per group, combined by fixed weights. The baseline
/// item acts as a floor so a HIGH Phase-1 result cannot be averaged away.
fn weighted_score(evidence: &[Evidence]) -> f64 {
    let mut group_max: HashMap<EvidenceSource, f64> = HashMap::new();
    for item in evidence {
        let entry = group_max.entry(item.source()).or_insert(0.0);
        *entry = entry.max(item.severity());
    }

    let incidents = group_max.get(&EvidenceSource::Incidents).copied().unwrap_or(0.0);
    let temporal = group_max.get(&EvidenceSource::Temporal).copied().unwrap_or(0.0);
    let ownership = group_max.get(&EvidenceSource::Ownership).copied().unwrap_or(0.0);
    let baseline = group_max.get(&EvidenceSource::Structure).copied().unwrap_or(0.0);
    let prefilter = group_max.get(&EvidenceSource::System).copied().unwrap_or(0.0);

    let weighted = incidents * WEIGHT_INCIDENTS
        + temporal * WEIGHT_TEMPORAL
        + ownership * WEIGHT_OWNERSHIP;
    weighted.max(baseline).max(prefilter).min(1.0)
}

fn recommendations_from(evidence: &[Evidence], file_paths: &[String]) -> Vec<Recommendation> {
    let mut out = Vec::new();
    let primary = file_paths.first().cloned().unwrap_or_default();

    for item in evidence {
        match item {
            Evidence::CoChangePartners { neighbors } => {
                if let Some(top) = neighbors.first() {
                    if top.frequency >= 0.7 {
                        out.push(Recommendation {
                            priority: 1,
                            action: format!(
                                "Add integration tests for {} + {}",
                                short_name(&primary),
                                short_name(&top.file_path)
                            ),
                            target: top.file_path.clone(),
                            reason: format!(
                                "{} has {:.2} co-change with {}",
                                short_name(&top.file_path),
                                top.frequency,
                                short_name(&primary)
                            ),
                        });
                    } else {
                        out.push(Recommendation {
                            priority: 2,
                            action: format!("Review {} together with this change", short_name(&top.file_path)),
                            target: top.file_path.clone(),
                            reason: format!("co-change frequency {:.2} in 90 days", top.frequency),
                        });
                    }
                }
            }
            Evidence::LinkedIncidents { incidents } => {
                if let Some(worst) = incidents.first() {
                    out.push(Recommendation {
                        priority: 1,
                        action: format!("Re-test the scenario from incident \"{}\"", worst.title),
                        target: primary.clone(),
                        reason: format!(
                            "file previously caused a {}-severity incident",
                            worst.severity
                        ),
                    });
                }
            }
            Evidence::Baseline { metrics } => {
                if metrics.test_ratio.class == coderisk_core::RiskClass::High {
                    out.push(Recommendation {
                        priority: 2,
                        action: format!("Add unit tests for {}", short_name(&primary)),
                        target: primary.clone(),
                        reason: format!(
                            "test ratio {:.2} is below the profile floor",
                            metrics.test_ratio.raw
                        ),
                    });
                }
            }
            Evidence::Ownership { churn } => {
                if churn.distinct_authors > 3 {
                    out.push(Recommendation {
                        priority: 3,
                        action: "Request review from a recent owner of this file".to_string(),
                        target: primary.clone(),
                        reason: format!("{} authors touched it in 90 days", churn.distinct_authors),
                    });
                }
            }
            _ => {}
        }
    }

    out.sort_by_key(|r| r.priority);
    out.dedup_by(|a, b| a.action == b.action);
    out
}

fn fallback_summary(risk_level: RiskLevel, evidence: &[Evidence], hops: &[HopRecord]) -> String {
    let strongest = evidence
        .iter()
        .max_by(|a, b| {
            a.severity()
                .partial_cmp(&b.severity())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|e| e.describe())
        .unwrap_or_else(|| "no evidence collected".to_string());
    format!(
        "{} risk after {} investigation hops. Strongest signal: {}",
        risk_level,
        hops.len(),
        strongest
    )
}

fn short_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coderisk_core::Severity;
    use coderisk_graph::{CoChangeNeighbor, IncidentLink};

    fn cochange(freq: f64) -> Evidence {
        Evidence::CoChangePartners {
            neighbors: vec![CoChangeNeighbor {
                file_path: "/r/b.go".into(),
                frequency: freq,
                co_changes: 9,
            }],
        }
    }

    #[tokio::test]
    async fn critical_incident_pushes_score_up() {
        let synthesizer = Synthesizer::new(None);
        let evidence = vec![
            Evidence::LinkedIncidents {
                incidents: vec![IncidentLink {
                    incident_id: "i".into(),
                    title: "outage".into(),
                    severity: Severity::Critical,
                    occurred_at: None,
                    confidence: 1.0,
                }],
            },
            cochange(0.87),
        ];
        let verdict = synthesizer
            .synthesize(&["/r/a.go".into()], &evidence, &[], 0.9, None, None)
            .await;
        // 0.5*1.0 + 0.3*0.87 = 0.761 -> HIGH
        assert_eq!(verdict.risk_level, RiskLevel::High);
        assert!(verdict.should_block_commit);
    }

    #[tokio::test]
    async fn floor_from_force_escalation_holds() {
        let synthesizer = Synthesizer::new(None);
        let verdict = synthesizer
            .synthesize(&["/r/a.go".into()], &[], &[], 0.5, None, Some(RiskLevel::High))
            .await;
        assert_eq!(verdict.risk_level, RiskLevel::High);
    }

    #[tokio::test]
    async fn budget_exhaustion_is_noted() {
        let synthesizer = Synthesizer::new(None);
        let verdict = synthesizer
            .synthesize(
                &["/r/a.go".into()],
                &[],
                &[],
                0.84,
                Some(StopReason::HopBudget),
                None,
            )
            .await;
        assert!(verdict
            .notes
            .iter()
            .any(|n| n.contains("best-effort")));
    }

    #[tokio::test]
    async fn strong_cochange_yields_integration_test_recommendation() {
        let synthesizer = Synthesizer::new(None);
        let verdict = synthesizer
            .synthesize(&["/r/a.go".into()], &[cochange(0.87)], &[], 0.9, None, None)
            .await;
        let rec = &verdict.recommendations[0];
        assert!(rec.action.contains("integration tests"));
        assert!(rec.reason.contains("0.87"));
    }

    #[tokio::test]
    async fn llm_failure_keeps_fallback_summary() {
        let synthesizer = Synthesizer::new(Some(Arc::new(crate::scripted::ScriptedProvider::failing())));
        let verdict = synthesizer
            .synthesize(&["/r/a.go".into()], &[cochange(0.5)], &[], 0.6, None, None)
            .await;
        assert!(verdict.summary.contains("risk after"));
    }
}
