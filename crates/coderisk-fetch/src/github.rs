//! GitHub REST client with pagination, retry and quota awareness.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{header, Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, warn};

use coderisk_core::{ChangeStatus, CodeRiskError, Result};
use coderisk_staging::{
    CommitFileRow, CommitRow, IssueRow, PullRequestRow, RepositoryRow, TreeEntryRow,
};

use crate::rate_limit::{acquire, backoff, ForgeLimiter};

const PER_PAGE: u32 = 100;
const MAX_ATTEMPTS: u32 = 4;

static ISSUE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:close[sd]?|fix(?:es|ed)?|resolve[sd]?)\s+#(\d+)").expect("issue ref regex")
});

pub struct ForgeClient {
    http: Client,
    api_base: String,
    token: Option<SecretString>,
    limiter: ForgeLimiter,
}

impl ForgeClient {
    pub fn new(api_base: &str, token: Option<SecretString>, limiter: ForgeLimiter) -> Result<Self> {
        let http = Client::builder()
            .user_agent("coderisk")
            .build()
            .map_err(|e| CodeRiskError::Fetch {
                stage: "client".into(),
                cause: e.to_string(),
            })?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
            limiter,
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Response> {
        let url = format!("{}{}", self.api_base, path);
        for attempt in 0..MAX_ATTEMPTS {
            acquire(&self.limiter).await;
            let mut req = self
                .http
                .get(&url)
                .query(query)
                .header(header::ACCEPT, "application/vnd.github+json");
            if let Some(token) = &self.token {
                req = req.bearer_auth(token.expose_secret());
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp);
                    }
                    if status == StatusCode::UNAUTHORIZED {
                        return Err(CodeRiskError::Auth(format!("{} returned 401", path)));
                    }
                    if status == StatusCode::FORBIDDEN {
                        // Secondary rate limits come back as 403 with a
                        // retry hint; credential failures must not retry.
                        let body = resp.text().await.unwrap_or_default();
                        if body.contains("rate limit") || body.contains("secondary") {
                            backoff(attempt, "secondary rate limit").await;
                            continue;
                        }
                        return Err(CodeRiskError::Auth(format!("{}: {}", path, body)));
                    }
                    if status.is_server_error() && attempt + 1 < MAX_ATTEMPTS {
                        backoff(attempt, "server error").await;
                        continue;
                    }
                    return Err(CodeRiskError::Fetch {
                        stage: path.to_string(),
                        cause: format!("HTTP {}", status),
                    });
                }
                Err(e) if attempt + 1 < MAX_ATTEMPTS => {
                    warn!(path, error = %e, "request failed, retrying");
                    backoff(attempt, "network error").await;
                }
                Err(e) => {
                    return Err(CodeRiskError::Fetch {
                        stage: path.to_string(),
                        cause: e.to_string(),
                    })
                }
            }
        }
        Err(CodeRiskError::Fetch {
            stage: path.to_string(),
            cause: "retries exhausted".into(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let resp = self.get(path, query).await?;
        resp.json::<T>().await.map_err(|e| CodeRiskError::Fetch {
            stage: path.to_string(),
            cause: format!("decode: {}", e),
        })
    }

    /// Repository metadata (default branch, creation time, languages).
    pub async fn repository(&self, repo_id: &str) -> Result<RepositoryRow> {
        let info: ApiRepo = self.get_json(&format!("/repos/{}", repo_id), &[]).await?;
        let languages: HashMap<String, u64> = self
            .get_json(&format!("/repos/{}/languages", repo_id), &[])
            .await
            .unwrap_or_default();
        Ok(RepositoryRow {
            repo_id: repo_id.to_string(),
            default_branch: info.default_branch,
            languages,
            created_at: info.created_at,
        })
    }

    /// All commits on the default branch authored since `since`.
    pub async fn commits_since(&self, repo_id: &str, since: DateTime<Utc>) -> Result<Vec<CommitRow>> {
        let path = format!("/repos/{}/commits", repo_id);
        let mut out = Vec::new();
        for page in 1.. {
            let batch: Vec<ApiCommit> = self
                .get_json(
                    &path,
                    &[
                        ("since", since.to_rfc3339()),
                        ("per_page", PER_PAGE.to_string()),
                        ("page", page.to_string()),
                    ],
                )
                .await?;
            let len = batch.len();
            out.extend(batch.into_iter().map(ApiCommit::into_row));
            if (len as u32) < PER_PAGE {
                break;
            }
        }
        debug!(repo_id, commits = out.len(), "commit listing fetched");
        Ok(out)
    }

    /// Per-file stats for one commit.
    pub async fn commit_files(&self, repo_id: &str, sha: &str) -> Result<Vec<CommitFileRow>> {
        let detail: ApiCommitDetail = self
            .get_json(&format!("/repos/{}/commits/{}", repo_id, sha), &[])
            .await?;
        Ok(detail
            .files
            .unwrap_or_default()
            .into_iter()
            .map(|f| CommitFileRow {
                sha: sha.to_string(),
                path: f.filename,
                status: ChangeStatus::from_str(&f.status).unwrap_or(ChangeStatus::Modified),
                additions: f.additions,
                deletions: f.deletions,
                previous_path: f.previous_filename,
            })
            .collect())
    }

    /// Issues that are open, or closed no earlier than `window_start`.
    /// The issues endpoint interleaves pull requests; those are dropped.
    pub async fn issues(&self, repo_id: &str, window_start: DateTime<Utc>) -> Result<Vec<IssueRow>> {
        let path = format!("/repos/{}/issues", repo_id);
        let mut out = Vec::new();
        for page in 1.. {
            let batch: Vec<ApiIssue> = self
                .get_json(
                    &path,
                    &[
                        ("state", "all".to_string()),
                        ("since", window_start.to_rfc3339()),
                        ("per_page", PER_PAGE.to_string()),
                        ("page", page.to_string()),
                    ],
                )
                .await?;
            let len = batch.len();
            for issue in batch {
                if issue.pull_request.is_some() {
                    continue;
                }
                let keep = issue.state == "open"
                    || issue.closed_at.map(|t| t >= window_start).unwrap_or(false);
                if keep {
                    out.push(issue.into_row());
                }
            }
            if (len as u32) < PER_PAGE {
                break;
            }
        }
        Ok(out)
    }

    pub async fn pull_requests(
        &self,
        repo_id: &str,
        window_start: DateTime<Utc>,
    ) -> Result<Vec<PullRequestRow>> {
        let path = format!("/repos/{}/pulls", repo_id);
        let mut out = Vec::new();
        for page in 1.. {
            let batch: Vec<ApiPull> = self
                .get_json(
                    &path,
                    &[
                        ("state", "all".to_string()),
                        ("sort", "updated".to_string()),
                        ("direction", "desc".to_string()),
                        ("per_page", PER_PAGE.to_string()),
                        ("page", page.to_string()),
                    ],
                )
                .await?;
            let len = batch.len();
            let mut past_window = false;
            for pr in batch {
                let in_window = pr.state == "open"
                    || pr.merged_at.map(|t| t >= window_start).unwrap_or(false)
                    || pr.updated_at.map(|t| t >= window_start).unwrap_or(false);
                if in_window {
                    out.push(pr.into_row());
                } else {
                    past_window = true;
                }
            }
            if (len as u32) < PER_PAGE || past_window {
                break;
            }
        }
        Ok(out)
    }

    /// Full recursive tree at `tree_ref`.
    pub async fn tree(&self, repo_id: &str, tree_ref: &str) -> Result<Vec<TreeEntryRow>> {
        let listing: ApiTree = self
            .get_json(
                &format!("/repos/{}/git/trees/{}", repo_id, tree_ref),
                &[("recursive", "1".to_string())],
            )
            .await?;
        if listing.truncated {
            warn!(repo_id, "tree listing truncated by forge");
        }
        Ok(listing
            .tree
            .into_iter()
            .map(|e| TreeEntryRow {
                sha: e.sha,
                path: e.path,
                entry_type: e.entry_type,
                size: e.size,
                language: None,
            })
            .collect())
    }
}

/// Extracts `fixes #N`-style references from free text.
pub fn issue_refs(text: &str) -> Vec<u64> {
    let mut refs: Vec<u64> = ISSUE_REF
        .captures_iter(text)
        .filter_map(|c| c[1].parse().ok())
        .collect();
    refs.sort_unstable();
    refs.dedup();
    refs
}

// ---- wire types -------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiRepo {
    default_branch: String,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ApiCommit {
    sha: String,
    commit: ApiCommitInner,
    parents: Vec<ApiParent>,
}

#[derive(Debug, Deserialize)]
struct ApiCommitInner {
    author: Option<ApiGitActor>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiGitActor {
    name: Option<String>,
    email: Option<String>,
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ApiParent {
    sha: String,
}

impl ApiCommit {
    fn into_row(self) -> CommitRow {
        let author = self.commit.author.unwrap_or(ApiGitActor {
            name: None,
            email: None,
            date: None,
        });
        CommitRow {
            sha: self.sha,
            author_name: author.name.unwrap_or_default(),
            author_email: author.email.unwrap_or_default(),
            authored_at: author.date.unwrap_or_else(Utc::now),
            message: self.commit.message,
            parents: self.parents.into_iter().map(|p| p.sha).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiCommitDetail {
    files: Option<Vec<ApiCommitFile>>,
}

#[derive(Debug, Deserialize)]
struct ApiCommitFile {
    filename: String,
    status: String,
    additions: u32,
    deletions: u32,
    previous_filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    state: String,
    #[serde(default)]
    labels: Vec<ApiLabel>,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiLabel {
    name: String,
}

impl ApiIssue {
    fn into_row(self) -> IssueRow {
        IssueRow {
            number: self.number,
            title: self.title,
            body: self.body.unwrap_or_default(),
            state: self.state,
            labels: self.labels.into_iter().map(|l| l.name).collect(),
            created_at: self.created_at,
            closed_at: self.closed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiPull {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    state: String,
    merged_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    base: ApiPullRef,
    head: ApiPullRef,
}

#[derive(Debug, Deserialize)]
struct ApiPullRef {
    sha: String,
}

impl ApiPull {
    fn into_row(self) -> PullRequestRow {
        let body = self.body.unwrap_or_default();
        let refs = issue_refs(&body);
        PullRequestRow {
            number: self.number,
            title: self.title,
            body,
            state: self.state,
            merged_at: self.merged_at,
            base_sha: self.base.sha,
            head_sha: self.head.sha,
            issue_refs: refs,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiTree {
    #[serde(default)]
    truncated: bool,
    tree: Vec<ApiTreeEntry>,
}

#[derive(Debug, Deserialize)]
struct ApiTreeEntry {
    path: String,
    #[serde(rename = "type")]
    entry_type: String,
    sha: String,
    size: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_refs_parse_common_forms() {
        let body = "Fixes #12, closes #7 and resolves #12. Unrelated #99 mention.";
        assert_eq!(issue_refs(body), vec![7, 12]);
    }

    #[test]
    fn commit_wire_format_decodes() {
        let json = r#"{
            "sha": "abc123",
            "commit": {
                "author": {"name": "Dev", "email": "dev@x.io", "date": "2026-06-01T10:00:00Z"},
                "message": "fix race"
            },
            "parents": [{"sha": "def456"}]
        }"#;
        let api: ApiCommit = serde_json::from_str(json).unwrap();
        let row = api.into_row();
        assert_eq!(row.sha, "abc123");
        assert_eq!(row.author_email, "dev@x.io");
        assert_eq!(row.parents, vec!["def456".to_string()]);
    }

    #[test]
    fn pull_requests_carry_issue_refs() {
        let json = r#"{
            "number": 5,
            "title": "Fix login",
            "body": "fixes #3",
            "state": "closed",
            "merged_at": "2026-06-01T10:00:00Z",
            "updated_at": "2026-06-01T10:00:00Z",
            "base": {"sha": "b"},
            "head": {"sha": "h"}
        }"#;
        let api: ApiPull = serde_json::from_str(json).unwrap();
        let row = api.into_row();
        assert_eq!(row.issue_refs, vec![3]);
    }
}
