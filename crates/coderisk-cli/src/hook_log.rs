//! Override audit log: one JSON line per hook override event.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use coderisk_core::{RiskLevel, Result};

pub const HOOK_LOG_FILE: &str = "hook_log.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideEvent {
    pub timestamp: String,
    pub user: String,
    pub files: Vec<String>,
    pub risk_level: RiskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
}

pub fn log_path(repo_root: &Path) -> PathBuf {
    repo_root
        .join(coderisk_core::config::REPO_CONFIG_DIR)
        .join(HOOK_LOG_FILE)
}

pub fn append_override(
    repo_root: &Path,
    files: Vec<String>,
    risk_level: RiskLevel,
    justification: Option<String>,
) -> Result<()> {
    let path = log_path(repo_root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let event = OverrideEvent {
        timestamp: Utc::now().to_rfc3339(),
        user: std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string()),
        files,
        risk_level,
        justification,
    };
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    writeln!(file, "{}", serde_json::to_string(&event)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_append_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        append_override(
            dir.path(),
            vec!["src/auth.py".into()],
            RiskLevel::High,
            Some("hotfix, approved by on-call".into()),
        )
        .unwrap();
        append_override(dir.path(), vec!["src/b.py".into()], RiskLevel::Medium, None).unwrap();

        let content = std::fs::read_to_string(log_path(dir.path())).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: OverrideEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.risk_level, RiskLevel::High);
        assert_eq!(first.justification.as_deref(), Some("hotfix, approved by on-call"));
    }
}
