//! Adaptive output: four verbosity levels over one check outcome.

use colored::Colorize;

use coderisk_core::RiskLevel;
use coderisk_graph::GraphReader;

use crate::ai_schema;
use crate::orchestrator::CheckOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// One line; used by the pre-commit hook.
    Quiet,
    /// Header, issues, recommendations.
    Standard,
    /// Standard plus the hop-by-hop investigation trace.
    Explain,
    /// Single JSON document with the stable v1.0 schema.
    AiMode,
}

/// Environment detection when no flag forces a level: hook → quiet,
/// CI → standard, interactive → standard.
pub fn detect_verbosity() -> Verbosity {
    let env_set =
        |name: &str| std::env::var(name).map(|v| !v.is_empty() && v != "0").unwrap_or(false);
    if env_set("PRE_COMMIT") || env_set("CODERISK_HOOK") {
        return Verbosity::Quiet;
    }
    Verbosity::Standard
}

pub async fn render(outcome: &CheckOutcome, verbosity: Verbosity, reader: &GraphReader) -> String {
    match verbosity {
        Verbosity::Quiet => render_quiet(outcome),
        Verbosity::Standard => render_standard(outcome, false),
        Verbosity::Explain => render_standard(outcome, true),
        Verbosity::AiMode => {
            let doc = ai_schema::build_document(outcome, reader).await;
            serde_json::to_string_pretty(&doc).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
        }
    }
}

fn render_quiet(outcome: &CheckOutcome) -> String {
    let issues = outcome
        .files
        .iter()
        .filter(|f| f.level >= RiskLevel::Medium)
        .count();
    if outcome.overall <= RiskLevel::Low {
        format!("✅ {} risk", outcome.overall)
    } else {
        format!("⚠️ {} risk: {} issues", outcome.overall, issues)
    }
}

fn render_standard(outcome: &CheckOutcome, explain: bool) -> String {
    let mut out = String::new();
    let header = format!(
        "{} risk - {} file(s) checked in {} ms",
        outcome.overall, outcome.files.len(), outcome.duration_ms
    );
    out.push_str(&match outcome.overall {
        RiskLevel::Critical | RiskLevel::High => header.red().bold().to_string(),
        RiskLevel::Medium => header.yellow().bold().to_string(),
        _ => header.green().to_string(),
    });
    out.push('\n');
    out.push_str(&format!("profile: {}\n", outcome.selection.reason));
    out.push('\n');

    for file in &outcome.files {
        let marker = match file.level {
            RiskLevel::Critical | RiskLevel::High => "✗".red().to_string(),
            RiskLevel::Medium => "!".yellow().to_string(),
            _ => "✓".green().to_string(),
        };
        out.push_str(&format!("  {} {} [{}]\n", marker, file.changed.path, file.level));
        if let Some(metrics) = &file.metrics {
            out.push_str(&format!(
                "      coupling {:.0} ({}), co-change {:.2} ({}), test ratio {:.2} ({})\n",
                metrics.coupling.raw,
                metrics.coupling.class,
                metrics.co_change.raw,
                metrics.co_change.class,
                metrics.test_ratio.raw,
                metrics.test_ratio.class
            ));
        }
    }

    if !outcome.temporal_pairs.is_empty() {
        out.push('\n');
        out.push_str("multi-file coupling:\n");
        for pair in &outcome.temporal_pairs {
            out.push_str(&format!(
                "  {} <-> {} at {:.2}\n",
                short(&pair.a),
                short(&pair.b),
                pair.frequency
            ));
        }
    }

    out.push('\n');
    out.push_str(&outcome.verdict.summary);
    out.push('\n');

    if !outcome.verdict.recommendations.is_empty() {
        out.push('\n');
        out.push_str("recommendations:\n");
        for rec in &outcome.verdict.recommendations {
            out.push_str(&format!("  {}. {} - {}\n", rec.priority, rec.action, rec.reason));
        }
    }

    for note in &outcome.verdict.notes {
        out.push_str(&format!("note: {}\n", note));
    }
    for diagnostic in &outcome.diagnostics {
        out.push_str(&format!("diagnostic: {}\n", diagnostic));
    }

    if explain {
        out.push('\n');
        out.push_str("investigation trace:\n");
        let mut any = false;
        for file in &outcome.files {
            let Some(investigation) = &file.investigation else {
                continue;
            };
            any = true;
            out.push_str(&format!(
                "  {} (stop: {:?}, {} tokens)\n",
                file.changed.path, investigation.stop_reason, investigation.tokens_used
            ));
            for hop in &investigation.hops {
                out.push_str(&format!(
                    "    hop {}: {} {} - {} (confidence {:.2} -> {:.2}{}, {} ms, {} tokens)\n",
                    hop.hop,
                    hop.action,
                    hop.target,
                    hop.reasoning,
                    hop.confidence_before,
                    hop.confidence_after,
                    if hop.breakthrough { ", breakthrough" } else { "" },
                    hop.duration_ms,
                    hop.tokens
                ));
            }
            for item in &investigation.evidence {
                out.push_str(&format!("    evidence: {}\n", item.describe()));
            }
        }
        if !any {
            out.push_str("  (no agentic investigation ran)\n");
        }
    }

    out
}

fn short(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_env_selects_quiet() {
        std::env::set_var("CODERISK_HOOK", "1");
        assert_eq!(detect_verbosity(), Verbosity::Quiet);
        std::env::remove_var("CODERISK_HOOK");
    }
}
