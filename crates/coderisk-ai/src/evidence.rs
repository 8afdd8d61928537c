//! Structured evidence accumulated during an investigation.
//!
//! Evidence is a closed set of tagged variants, one per signal kind, so
//! the agent loop pattern-matches instead of poking at property bags and
//! the output schema stays enforceable at the boundary.

use serde::{Deserialize, Serialize};

use coderisk_core::{RiskClass, RiskLevel};
use coderisk_graph::{CoChangeNeighbor, IncidentLink};
use coderisk_metrics::{FileMetrics, IncidentSimilarity, OwnershipChurn, Phase0Result};

/// Which scoring group an evidence item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceSource {
    Structure,
    Temporal,
    Incidents,
    Ownership,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    /// Phase-0 classification and any forced floor.
    PreFilter {
        result: Phase0Result,
        forced_floor: Option<RiskLevel>,
    },
    /// Phase-1 baseline for the file under investigation.
    Baseline { metrics: FileMetrics },
    /// Temporal partners surfaced by an EXPAND_GRAPH hop.
    CoChangePartners { neighbors: Vec<CoChangeNeighbor> },
    /// Structural neighborhood (imports both ways) within N hops.
    BlastRadius { files: Vec<String>, hops: usize },
    /// CAUSED_BY incidents on the file.
    LinkedIncidents { incidents: Vec<IncidentLink> },
    /// Distinct-author churn within the window.
    Ownership { churn: OwnershipChurn },
    /// Full-text matches in staged issues/incidents.
    SimilarReports { similarity: IncidentSimilarity },
    /// The investigation could not use the LLM; risk must not rise
    /// because of this item.
    LlmUnavailable { reason: String },
    /// Any recoverable oddity worth surfacing to the user.
    Diagnostic { message: String },
}

impl Evidence {
    pub fn source(&self) -> EvidenceSource {
        match self {
            Evidence::PreFilter { .. } => EvidenceSource::System,
            Evidence::Baseline { .. } => EvidenceSource::Structure,
            Evidence::CoChangePartners { .. } => EvidenceSource::Temporal,
            Evidence::BlastRadius { .. } => EvidenceSource::Structure,
            Evidence::LinkedIncidents { .. } => EvidenceSource::Incidents,
            Evidence::Ownership { .. } => EvidenceSource::Ownership,
            Evidence::SimilarReports { .. } => EvidenceSource::Incidents,
            Evidence::LlmUnavailable { .. } => EvidenceSource::System,
            Evidence::Diagnostic { .. } => EvidenceSource::System,
        }
    }

    /// Severity in [0, 1] for weighted scoring. Incident severity scales
    /// by link confidence so inferred links weigh less than manual ones.
    pub fn severity(&self) -> f64 {
        match self {
            Evidence::PreFilter { forced_floor, result } => forced_floor
                .map(|f| match f {
                    RiskLevel::Critical => 1.0,
                    RiskLevel::High => 0.8,
                    _ => 0.4,
                })
                .unwrap_or(result.type_risk * 0.5),
            Evidence::Baseline { metrics } => match metrics.overall {
                RiskClass::High => 0.8,
                RiskClass::Medium | RiskClass::Unknown => 0.5,
                RiskClass::Low => 0.2,
            },
            Evidence::CoChangePartners { neighbors } => neighbors
                .first()
                .map(|n| n.frequency)
                .unwrap_or(0.0),
            Evidence::BlastRadius { files, .. } => {
                (files.len() as f64 / 20.0).min(1.0) * 0.6
            }
            Evidence::LinkedIncidents { incidents } => incidents
                .iter()
                .map(|i| {
                    let base = match i.severity {
                        coderisk_core::Severity::Critical => 1.0,
                        coderisk_core::Severity::High => 0.8,
                        coderisk_core::Severity::Medium => 0.5,
                        coderisk_core::Severity::Low => 0.3,
                    };
                    base * i.confidence
                })
                .fold(0.0, f64::max),
            Evidence::Ownership { churn } => match churn.class {
                RiskClass::High => 0.7,
                RiskClass::Medium => 0.45,
                _ => 0.15,
            },
            Evidence::SimilarReports { similarity } => match similarity.class {
                RiskClass::High => 0.6,
                RiskClass::Medium => 0.4,
                _ => 0.1,
            },
            Evidence::LlmUnavailable { .. } => 0.0,
            Evidence::Diagnostic { .. } => 0.0,
        }
    }

    /// One-line rendering for prompts and human output.
    pub fn describe(&self) -> String {
        match self {
            Evidence::PreFilter { result, forced_floor } => {
                let types: Vec<String> = result.types.iter().map(|t| t.to_string()).collect();
                match forced_floor {
                    Some(floor) => format!(
                        "[prefilter] {} classified {} - escalation floor {}",
                        result.path,
                        types.join("+"),
                        floor
                    ),
                    None => format!("[prefilter] {} classified {}", result.path, types.join("+")),
                }
            }
            Evidence::Baseline { metrics } => format!(
                "[baseline] coupling={:.0} ({}), co-change={:.2} ({}), test-ratio={:.2} ({})",
                metrics.coupling.raw,
                metrics.coupling.class,
                metrics.co_change.raw,
                metrics.co_change.class,
                metrics.test_ratio.raw,
                metrics.test_ratio.class
            ),
            Evidence::CoChangePartners { neighbors } => {
                let top: Vec<String> = neighbors
                    .iter()
                    .take(3)
                    .map(|n| format!("{} ({:.2})", n.file_path, n.frequency))
                    .collect();
                format!("[temporal] co-changes with {}", top.join(", "))
            }
            Evidence::BlastRadius { files, hops } => {
                format!("[structure] {} files within {} hops", files.len(), hops)
            }
            Evidence::LinkedIncidents { incidents } => {
                let items: Vec<String> = incidents
                    .iter()
                    .take(3)
                    .map(|i| format!("{} (severity {})", i.title, i.severity))
                    .collect();
                format!("[incident] {}", items.join("; "))
            }
            Evidence::Ownership { churn } => format!(
                "[ownership] {} distinct authors in window ({})",
                churn.distinct_authors, churn.class
            ),
            Evidence::SimilarReports { similarity } => format!(
                "[incident] {} similar reports in issue history",
                similarity.hits.len()
            ),
            Evidence::LlmUnavailable { reason } => format!("[system] LLM unavailable: {}", reason),
            Evidence::Diagnostic { message } => format!("[system] {}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coderisk_core::Severity;

    #[test]
    fn incident_severity_scales_by_confidence() {
        let manual = Evidence::LinkedIncidents {
            incidents: vec![IncidentLink {
                incident_id: "i1".into(),
                title: "outage".into(),
                severity: Severity::Critical,
                occurred_at: None,
                confidence: 1.0,
            }],
        };
        let inferred = Evidence::LinkedIncidents {
            incidents: vec![IncidentLink {
                incident_id: "i2".into(),
                title: "maybe related".into(),
                severity: Severity::Critical,
                occurred_at: None,
                confidence: 0.4,
            }],
        };
        assert!(manual.severity() > inferred.severity());
    }

    #[test]
    fn llm_unavailable_is_weightless() {
        let e = Evidence::LlmUnavailable {
            reason: "no API key".into(),
        };
        assert_eq!(e.severity(), 0.0);
    }

    #[test]
    fn evidence_serializes_with_kind_tag() {
        let e = Evidence::BlastRadius {
            files: vec!["/r/a.go".into()],
            hops: 2,
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"], "blast_radius");
    }
}
