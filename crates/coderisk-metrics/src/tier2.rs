//! Tier-2 metrics computed on demand during Phase-2 investigation.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use coderisk_core::{limits::WINDOW_DAYS, Result, RiskClass};
use coderisk_staging::{SearchHit, StagingStore};

/// Distinct authors touching a file within the window. Many hands on one
/// file within 90 days reads as ownership churn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnershipChurn {
    pub distinct_authors: u32,
    pub class: RiskClass,
}

pub fn ownership_churn(
    staging: &StagingStore,
    repo_id: &str,
    git_relative_path: &str,
) -> Result<OwnershipChurn> {
    let since = Utc::now() - Duration::days(WINDOW_DAYS);
    let distinct_authors = staging.distinct_authors(repo_id, git_relative_path, since)?;
    let class = match distinct_authors {
        0 | 1 => RiskClass::Low,
        2 | 3 => RiskClass::Medium,
        _ => RiskClass::High,
    };
    Ok(OwnershipChurn {
        distinct_authors,
        class,
    })
}

/// Full-text search over staged issues for text related to the change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentSimilarity {
    pub hits: Vec<SearchHit>,
    pub class: RiskClass,
}

pub fn incident_similarity(
    staging: &StagingStore,
    query: &str,
    limit: usize,
) -> Result<IncidentSimilarity> {
    let mut hits = staging.search_issues(query, limit)?;
    hits.extend(staging.search_incidents(query, limit)?);
    let class = match hits.len() {
        0 => RiskClass::Low,
        1 | 2 => RiskClass::Medium,
        _ => RiskClass::High,
    };
    Ok(IncidentSimilarity { hits, class })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coderisk_core::ChangeStatus;
    use coderisk_staging::{CommitFileRow, CommitRow};

    #[test]
    fn churn_classes_scale_with_authors() {
        let staging = StagingStore::in_memory().unwrap();
        let commits: Vec<CommitRow> = (0..5)
            .map(|i| CommitRow {
                sha: format!("c{}", i),
                author_name: format!("Dev {}", i),
                author_email: format!("dev{}@x.io", i),
                authored_at: Utc::now() - Duration::days(i),
                message: "touch".into(),
                parents: vec![],
            })
            .collect();
        let files: Vec<CommitFileRow> = commits
            .iter()
            .map(|c| CommitFileRow {
                sha: c.sha.clone(),
                path: "src/hot.py".into(),
                status: ChangeStatus::Modified,
                additions: 1,
                deletions: 0,
                previous_path: None,
            })
            .collect();
        staging.upsert_commits("acme/widget", &commits, &files).unwrap();

        let churn = ownership_churn(&staging, "acme/widget", "src/hot.py").unwrap();
        assert_eq!(churn.distinct_authors, 5);
        assert_eq!(churn.class, RiskClass::High);

        let quiet = ownership_churn(&staging, "acme/widget", "src/cold.py").unwrap();
        assert_eq!(quiet.class, RiskClass::Low);
    }
}
