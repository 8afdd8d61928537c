use chrono::{DateTime, Utc};
use coderisk_core::{ChangeStatus, Severity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryRow {
    /// `owner/name`.
    pub repo_id: String,
    pub default_branch: String,
    /// Language name -> bytes of code, as reported by the forge.
    pub languages: HashMap<String, u64>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRow {
    pub sha: String,
    pub author_name: String,
    pub author_email: String,
    pub authored_at: DateTime<Utc>,
    pub message: String,
    pub parents: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitFileRow {
    pub sha: String,
    pub path: String,
    pub status: ChangeStatus,
    pub additions: u32,
    pub deletions: u32,
    pub previous_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRow {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub state: String,
    pub labels: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestRow {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub state: String,
    pub merged_at: Option<DateTime<Utc>>,
    pub base_sha: String,
    pub head_sha: String,
    /// Issue numbers referenced from the PR body ("fixes #123" and friends).
    pub issue_refs: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEntryRow {
    pub sha: String,
    pub path: String,
    /// "blob" or "tree".
    pub entry_type: String,
    pub size: Option<u64>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentRow {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub occurred_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub root_cause: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentFileRow {
    pub incident_id: Uuid,
    /// Absolute path under the ingested clone root.
    pub file_path: String,
    pub confidence: f64,
    pub line_number: Option<u32>,
    pub blamed_function: Option<String>,
}

/// One full-text hit, best first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub snippet: String,
    pub rank: f64,
}

/// Everything the graph builder needs from one fetch run.
///
/// The delta is the only coupling between stage 1 (fetch) and stage 2
/// (build): the builder reads these rows and nothing else from the fetcher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StagingDelta {
    pub repo_id: String,
    pub commits: usize,
    pub commit_files: usize,
    pub issues: usize,
    pub pull_requests: usize,
    pub tree_entries: usize,
}

impl StagingDelta {
    pub fn is_empty(&self) -> bool {
        self.commits == 0
            && self.commit_files == 0
            && self.issues == 0
            && self.pull_requests == 0
            && self.tree_entries == 0
    }
}
