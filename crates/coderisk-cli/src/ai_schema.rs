//! AI-mode output contract, v1.0.
//!
//! One JSON document per invocation with a stable schema so downstream AI
//! assistants can consume check results without scraping human output.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use coderisk_core::{limits::CONFIDENCE_THRESHOLD, RiskLevel};

use crate::orchestrator::{CheckOutcome, FileReport};

pub const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AiDocument {
    pub meta: Meta,
    pub risk: Risk,
    pub files: Vec<FileEntry>,
    pub graph_analysis: GraphAnalysis,
    pub investigation_trace: Vec<TraceEntry>,
    pub recommendations: RecommendationBuckets,
    pub ai_assistant_actions: Vec<AssistantAction>,
    pub should_block_commit: bool,
    pub block_reason: String,
    pub override_allowed: bool,
    pub override_requires_justification: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Meta {
    pub version: String,
    /// RFC3339.
    pub timestamp: String,
    pub duration_ms: u64,
    pub branch: String,
    pub files_analyzed: usize,
    pub agent_hops: u32,
    pub cache_hit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Risk {
    pub level: RiskLevel,
    /// [0, 1]
    pub score: f64,
    /// [0, 1]
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FileEntry {
    pub path: String,
    pub language: String,
    pub lines_changed: u32,
    pub risk_score: f64,
    pub metrics: FileMetricsEntry,
    pub issues: Vec<String>,
    pub dependencies: Vec<String>,
    pub history: Vec<String>,
    pub incidents: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FileMetricsEntry {
    pub coupling: f64,
    pub co_change: f64,
    pub test_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GraphAnalysis {
    /// Files reachable from the changed set over IMPORTS/CO_CHANGED.
    pub blast_radius: Vec<String>,
    pub temporal_coupling: Vec<TemporalCouplingEntry>,
    pub hotspots: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TemporalCouplingEntry {
    pub a: String,
    pub b: String,
    pub frequency: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TraceEntry {
    pub hop: u32,
    pub action: String,
    pub target: String,
    pub metrics_calculated: Vec<String>,
    pub decision: String,
    pub reasoning: String,
    pub confidence: f64,
    pub duration_ms: u64,
    pub tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RecommendationBuckets {
    pub critical: Vec<RecommendationEntry>,
    pub high: Vec<RecommendationEntry>,
    pub medium: Vec<RecommendationEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RecommendationEntry {
    pub priority: u32,
    pub action: String,
    pub target: String,
    pub reason: String,
    pub estimated_time_min: u32,
    pub auto_fixable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AssistantAction {
    pub action_type: String,
    pub confidence: f64,
    /// True iff confidence > 0.85.
    pub ready_to_execute: bool,
    pub prompt: String,
    pub expected_files: Vec<String>,
    pub estimated_lines: u32,
}

/// Assembles the document from a check outcome.
pub async fn build_document(
    outcome: &CheckOutcome,
    reader: &coderisk_graph::GraphReader,
) -> AiDocument {
    let mut blast_radius: Vec<String> = Vec::new();
    for report in &outcome.files {
        if let Some(absolute) = &report.changed.absolute_path {
            if let Ok(paths) = reader.blast_radius(absolute, 2).await {
                blast_radius.extend(paths);
            }
        }
    }
    blast_radius.sort();
    blast_radius.dedup();

    let hotspots: Vec<String> = outcome
        .files
        .iter()
        .filter(|r| r.level >= RiskLevel::High)
        .map(|r| r.changed.path.clone())
        .collect();

    let trace: Vec<TraceEntry> = outcome
        .files
        .iter()
        .filter_map(|r| r.investigation.as_ref())
        .flat_map(|inv| inv.hops.iter())
        .map(|h| TraceEntry {
            hop: h.hop,
            action: h.action.clone(),
            target: h.target.clone(),
            metrics_calculated: if h.action == "COMPUTE_METRIC" {
                vec![h.target.clone()]
            } else {
                Vec::new()
            },
            decision: h.action.clone(),
            reasoning: h.reasoning.clone(),
            confidence: h.confidence_after,
            duration_ms: h.duration_ms,
            tokens: h.tokens,
        })
        .collect();

    let mut buckets = RecommendationBuckets {
        critical: Vec::new(),
        high: Vec::new(),
        medium: Vec::new(),
    };
    for rec in &outcome.verdict.recommendations {
        let entry = RecommendationEntry {
            priority: rec.priority,
            action: rec.action.clone(),
            target: rec.target.clone(),
            reason: rec.reason.clone(),
            estimated_time_min: match rec.priority {
                1 => 30,
                2 => 15,
                _ => 5,
            },
            auto_fixable: false,
        };
        match rec.priority {
            1 => buckets.critical.push(entry),
            2 => buckets.high.push(entry),
            _ => buckets.medium.push(entry),
        }
    }

    let assistant_actions: Vec<AssistantAction> = outcome
        .verdict
        .recommendations
        .iter()
        .filter(|r| r.action.to_lowercase().contains("test"))
        .map(|r| AssistantAction {
            action_type: "write_tests".to_string(),
            confidence: outcome.verdict.confidence,
            ready_to_execute: outcome.verdict.confidence > CONFIDENCE_THRESHOLD,
            prompt: format!("{} - {}", r.action, r.reason),
            expected_files: vec![r.target.clone()],
            estimated_lines: 80,
        })
        .collect();

    let block_reason = if outcome.verdict.should_block_commit {
        outcome.verdict.summary.clone()
    } else {
        String::new()
    };

    AiDocument {
        meta: Meta {
            version: SCHEMA_VERSION.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            duration_ms: outcome.duration_ms,
            branch: outcome.branch.clone(),
            files_analyzed: outcome.files.len(),
            agent_hops: outcome.agent_hops,
            cache_hit: false,
        },
        risk: Risk {
            level: outcome.overall,
            score: outcome.verdict.score,
            confidence: outcome.verdict.confidence,
        },
        files: outcome.files.iter().map(file_entry).collect(),
        graph_analysis: GraphAnalysis {
            blast_radius,
            temporal_coupling: outcome
                .temporal_pairs
                .iter()
                .map(|p| TemporalCouplingEntry {
                    a: p.a.clone(),
                    b: p.b.clone(),
                    frequency: p.frequency,
                })
                .collect(),
            hotspots,
        },
        investigation_trace: trace,
        recommendations: buckets,
        ai_assistant_actions: assistant_actions,
        should_block_commit: outcome.verdict.should_block_commit,
        block_reason,
        override_allowed: outcome.overall < RiskLevel::Critical,
        override_requires_justification: outcome.overall >= RiskLevel::High,
    }
}

fn file_entry(report: &FileReport) -> FileEntry {
    let metrics = report.metrics.as_ref();
    let investigation_reasons: Vec<String> = report
        .investigation
        .iter()
        .flat_map(|inv| inv.evidence.iter())
        .filter_map(|e| match e {
            coderisk_ai::Evidence::LinkedIncidents { incidents } => Some(
                incidents
                    .iter()
                    .map(|i| format!("{} ({})", i.title, i.severity))
                    .collect::<Vec<_>>(),
            ),
            _ => None,
        })
        .flatten()
        .collect();

    FileEntry {
        path: report.changed.path.clone(),
        language: report
            .changed
            .path
            .rsplit('.')
            .next()
            .unwrap_or("unknown")
            .to_string(),
        lines_changed: report.changed.lines_changed(),
        risk_score: match report.level {
            RiskLevel::Critical => 0.9,
            RiskLevel::High => 0.7,
            RiskLevel::Medium => 0.5,
            RiskLevel::Low => 0.3,
            RiskLevel::Minimal => 0.1,
        },
        metrics: FileMetricsEntry {
            coupling: metrics.map(|m| m.coupling.raw).unwrap_or(0.0),
            co_change: metrics.map(|m| m.co_change.raw).unwrap_or(0.0),
            test_ratio: metrics.map(|m| m.test_ratio.raw).unwrap_or(0.0),
        },
        issues: report
            .phase0
            .security_keywords
            .iter()
            .map(|k| format!("security keyword: {}", k))
            .collect(),
        dependencies: Vec::new(),
        history: Vec::new(),
        incidents: investigation_reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_generatable() {
        // the contract must stay derivable; failures here mean a type
        // stopped being schema-representable
        let schema = schemars::schema_for!(AiDocument);
        let json = serde_json::to_value(&schema).unwrap();
        assert!(json["properties"]["meta"].is_object());
        assert!(json["properties"]["risk"].is_object());
    }

    #[test]
    fn document_round_trips_through_serde() {
        let doc = AiDocument {
            meta: Meta {
                version: SCHEMA_VERSION.into(),
                timestamp: Utc::now().to_rfc3339(),
                duration_ms: 12,
                branch: "main".into(),
                files_analyzed: 1,
                agent_hops: 0,
                cache_hit: false,
            },
            risk: Risk {
                level: RiskLevel::Low,
                score: 0.2,
                confidence: 0.9,
            },
            files: Vec::new(),
            graph_analysis: GraphAnalysis {
                blast_radius: Vec::new(),
                temporal_coupling: Vec::new(),
                hotspots: Vec::new(),
            },
            investigation_trace: Vec::new(),
            recommendations: RecommendationBuckets {
                critical: Vec::new(),
                high: Vec::new(),
                medium: Vec::new(),
            },
            ai_assistant_actions: Vec::new(),
            should_block_commit: false,
            block_reason: String::new(),
            override_allowed: true,
            override_requires_justification: false,
        };
        let json = serde_json::to_string(&doc).unwrap();
        let reparsed: AiDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(reparsed.meta.version, "1.0");
        assert_eq!(reparsed.risk.level, RiskLevel::Low);
    }
}
