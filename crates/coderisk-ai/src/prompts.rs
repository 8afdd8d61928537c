//! Prompt assembly and decision parsing for the investigation loop.

use serde::{Deserialize, Serialize};

use crate::evidence::Evidence;

pub const PLANNER_SYSTEM_PROMPT: &str = "You are a code-change risk investigator. \
You navigate a code knowledge graph one action at a time, accumulating evidence \
about a changed file. Respond with a single JSON object and nothing else:\n\
{\"action\": \"EXPAND_GRAPH\" | \"COMPUTE_METRIC\" | \"FETCH_INCIDENTS\" | \"FINALIZE\",\n\
 \"target\": \"CO_CHANGED\" | \"IMPORTS\" | \"ownership_churn\" | \"incident_similarity\" | \"\",\n\
 \"reasoning\": \"one sentence\",\n\
 \"confidence\": 0.0-1.0}\n\
Confidence expresses how sure you are of the final risk verdict given the \
evidence so far. Prefer actions whose targets you have not visited. FINALIZE \
when more evidence would not change the verdict.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentActionKind {
    #[serde(rename = "EXPAND_GRAPH")]
    ExpandGraph,
    #[serde(rename = "COMPUTE_METRIC")]
    ComputeMetric,
    #[serde(rename = "FETCH_INCIDENTS")]
    FetchIncidents,
    #[serde(rename = "FINALIZE")]
    Finalize,
}

impl AgentActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentActionKind::ExpandGraph => "EXPAND_GRAPH",
            AgentActionKind::ComputeMetric => "COMPUTE_METRIC",
            AgentActionKind::FetchIncidents => "FETCH_INCIDENTS",
            AgentActionKind::Finalize => "FINALIZE",
        }
    }
}

/// One structured planner decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDecision {
    pub action: AgentActionKind,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub reasoning: String,
    pub confidence: f64,
}

/// Extracts the decision JSON from a model reply that may carry prose or
/// code fences around it.
pub fn parse_decision(text: &str) -> Option<AgentDecision> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let mut decision: AgentDecision = serde_json::from_str(&text[start..=end]).ok()?;
    decision.confidence = decision.confidence.clamp(0.0, 1.0);
    Some(decision)
}

pub fn build_hop_prompt(
    file_path: &str,
    diff_preview: &str,
    evidence: &[Evidence],
    visited: &[String],
    hop: u32,
    max_hops: u32,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "Changed file: {}\nHop {} of {}.\n\n",
        file_path, hop, max_hops
    ));
    if !diff_preview.is_empty() {
        prompt.push_str("Diff preview:\n");
        for line in diff_preview.lines().take(40) {
            prompt.push_str(line);
            prompt.push('\n');
        }
        prompt.push('\n');
    }
    prompt.push_str("Evidence so far:\n");
    for item in evidence {
        prompt.push_str("- ");
        prompt.push_str(&item.describe());
        prompt.push('\n');
    }
    if !visited.is_empty() {
        prompt.push_str(&format!("\nAlready visited: {}\n", visited.join(", ")));
    }
    prompt.push_str("\nChoose the next action.");
    prompt
}

pub fn build_summary_prompt(file_paths: &[String], evidence: &[Evidence]) -> String {
    let mut prompt = String::from(
        "Write a 2-3 sentence actionable summary of the risk of this change for a \
         commit-time warning. Be specific: name files and numbers from the evidence. \
         No preamble.\n\nChanged files:\n",
    );
    for path in file_paths {
        prompt.push_str(&format!("- {}\n", path));
    }
    prompt.push_str("\nEvidence:\n");
    for item in evidence {
        prompt.push_str("- ");
        prompt.push_str(&item.describe());
        prompt.push('\n');
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_json() {
        let decision = parse_decision(
            r#"{"action": "EXPAND_GRAPH", "target": "CO_CHANGED", "reasoning": "high temporal signal", "confidence": 0.6}"#,
        )
        .unwrap();
        assert_eq!(decision.action, AgentActionKind::ExpandGraph);
        assert_eq!(decision.target, "CO_CHANGED");
        assert!((decision.confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn parses_fenced_json_with_prose() {
        let text = "Here is my decision:\n```json\n{\"action\": \"FINALIZE\", \"confidence\": 0.9}\n```";
        let decision = parse_decision(text).unwrap();
        assert_eq!(decision.action, AgentActionKind::Finalize);
    }

    #[test]
    fn clamps_out_of_range_confidence() {
        let decision =
            parse_decision(r#"{"action": "FINALIZE", "confidence": 1.7}"#).unwrap();
        assert_eq!(decision.confidence, 1.0);
    }

    #[test]
    fn garbage_returns_none() {
        assert!(parse_decision("no json here").is_none());
        assert!(parse_decision("{not valid json}").is_none());
    }
}
