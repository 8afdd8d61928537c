//! Stage 1 of the ingestion pipeline: forge + git → staging rows.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{Duration, Utc};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use coderisk_core::{limits::WINDOW_DAYS, repo_hash, CodeRiskConfig, CodeRiskError, Result};
use coderisk_staging::{RepositoryRow, StagingDelta, StagingStore, TreeEntryRow};

use crate::clone::ClonedRepo;
use crate::github::ForgeClient;

/// Concurrent per-commit detail requests. The token bucket still governs
/// the aggregate rate; this just bounds in-flight futures.
const DETAIL_CONCURRENCY: usize = 8;

pub struct FetchOutcome {
    pub repo_id: String,
    pub clone_root: PathBuf,
    pub default_branch: String,
    pub delta: StagingDelta,
}

/// Fetches and normalizes repository data into the staging store.
///
/// With a `ForgeClient` the fetcher pulls commits, issues, PRs and the tree
/// from the forge API; without one it degrades to local-only mode and
/// derives the temporal layer from the clone's own log.
pub struct SourceFetcher {
    store: StagingStore,
    client: Option<ForgeClient>,
    config: CodeRiskConfig,
}

impl SourceFetcher {
    pub fn new(store: StagingStore, client: Option<ForgeClient>, config: CodeRiskConfig) -> Self {
        Self {
            store,
            client,
            config,
        }
    }

    pub async fn fetch(&self, repo_url: &str) -> Result<FetchOutcome> {
        let hash = repo_hash(repo_url);
        let repo_id = repo_id_from_url(repo_url)?;
        let clone_root = self.config.clone_root(&hash);
        let clone = ClonedRepo::open_or_clone(repo_url, &clone_root)?;
        let window_start = Utc::now() - Duration::days(WINDOW_DAYS);

        let mut delta = StagingDelta {
            repo_id: repo_id.clone(),
            ..Default::default()
        };

        let default_branch = match &self.client {
            Some(client) => {
                self.fetch_remote(client, &repo_id, window_start, &mut delta)
                    .await?
            }
            None => {
                self.fetch_local(&clone, &repo_id, window_start, &mut delta)?;
                clone.default_branch()?
            }
        };

        info!(
            repo_id,
            commits = delta.commits,
            files = delta.commit_files,
            issues = delta.issues,
            prs = delta.pull_requests,
            "fetch complete"
        );
        Ok(FetchOutcome {
            repo_id,
            clone_root,
            default_branch,
            delta,
        })
    }

    async fn fetch_remote(
        &self,
        client: &ForgeClient,
        repo_id: &str,
        window_start: chrono::DateTime<Utc>,
        delta: &mut StagingDelta,
    ) -> Result<String> {
        let repo_row = client.repository(repo_id).await?;
        let default_branch = repo_row.default_branch.clone();
        self.store.upsert_repository(&repo_row)?;

        // Shas already staged need no detail call; the checkpoint keeps
        // re-fetches cheap.
        let known: HashSet<String> = self
            .store
            .commits_since(repo_id, window_start)?
            .into_iter()
            .map(|c| c.sha)
            .collect();
        if let Some(checkpoint) = self.store.latest_fetched_at("commits", repo_id)? {
            info!(repo_id, %checkpoint, "resuming from staged checkpoint");
        }

        let commits = client.commits_since(repo_id, window_start).await?;
        let fresh: Vec<_> = commits
            .into_iter()
            .filter(|c| !known.contains(&c.sha))
            .collect();

        let mut files = Vec::new();
        let mut detail_results = stream::iter(fresh.iter().map(|c| {
            let sha = c.sha.clone();
            async move { client.commit_files(repo_id, &sha).await }
        }))
        .buffer_unordered(DETAIL_CONCURRENCY);
        while let Some(result) = detail_results.next().await {
            match result {
                Ok(batch) => files.extend(batch),
                Err(e) if matches!(e, CodeRiskError::Auth(_)) => return Err(e),
                Err(e) => warn!(error = %e, "commit detail failed, continuing"),
            }
        }
        drop(detail_results);

        delta.commits = self.store.upsert_commits(repo_id, &fresh, &files)?;
        delta.commit_files = files.len();

        let issues = client.issues(repo_id, window_start).await?;
        delta.issues = self.store.upsert_issues(repo_id, &issues)?;

        let prs = client.pull_requests(repo_id, window_start).await?;
        delta.pull_requests = self.store.upsert_pull_requests(repo_id, &prs)?;

        let tree = client.tree(repo_id, &default_branch).await?;
        delta.tree_entries = self.store.upsert_tree_entries(repo_id, &tree)?;

        Ok(default_branch)
    }

    fn fetch_local(
        &self,
        clone: &ClonedRepo,
        repo_id: &str,
        window_start: chrono::DateTime<Utc>,
        delta: &mut StagingDelta,
    ) -> Result<()> {
        let default_branch = clone.default_branch()?;
        self.store.upsert_repository(&RepositoryRow {
            repo_id: repo_id.to_string(),
            default_branch,
            languages: Default::default(),
            created_at: None,
        })?;

        let (commits, files) = clone.log_since(window_start)?;
        delta.commits = self.store.upsert_commits(repo_id, &commits, &files)?;
        delta.commit_files = files.len();

        let tree = local_tree_entries(clone)?;
        delta.tree_entries = self.store.upsert_tree_entries(repo_id, &tree)?;
        Ok(())
    }
}

/// Tree entries from the clone's HEAD tree, for local-only mode.
fn local_tree_entries(clone: &ClonedRepo) -> Result<Vec<TreeEntryRow>> {
    let repo = clone.repository();
    let head = repo
        .head()
        .and_then(|h| h.peel_to_tree())
        .map_err(|e| CodeRiskError::Fetch {
            stage: "tree".into(),
            cause: e.message().to_string(),
        })?;

    let mut entries = Vec::new();
    head.walk(git2::TreeWalkMode::PreOrder, |dir, entry| {
        let Some(name) = entry.name() else {
            return git2::TreeWalkResult::Ok;
        };
        let path = if dir.is_empty() {
            name.to_string()
        } else {
            format!("{}{}", dir, name)
        };
        let (entry_type, size) = match entry.kind() {
            Some(git2::ObjectType::Blob) => {
                let size = entry
                    .to_object(repo)
                    .ok()
                    .and_then(|o| o.as_blob().map(|b| b.size() as u64));
                ("blob", size)
            }
            Some(git2::ObjectType::Tree) => ("tree", None),
            _ => return git2::TreeWalkResult::Ok,
        };
        entries.push(TreeEntryRow {
            sha: entry.id().to_string(),
            path,
            entry_type: entry_type.to_string(),
            size,
            language: None,
        });
        git2::TreeWalkResult::Ok
    })
    .map_err(|e| CodeRiskError::Fetch {
        stage: "tree".into(),
        cause: e.message().to_string(),
    })?;
    Ok(entries)
}

/// `owner/name` from any remote URL spelling.
pub fn repo_id_from_url(url: &str) -> Result<String> {
    let normalized = coderisk_core::normalize_remote_url(url);
    match normalized.split_once('/') {
        Some((_host, path)) if !path.is_empty() => Ok(path.to_string()),
        _ => Err(CodeRiskError::Input(format!(
            "cannot derive owner/name from remote URL: {}",
            url
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_id_extraction() {
        assert_eq!(
            repo_id_from_url("https://github.com/acme/widget.git").unwrap(),
            "acme/widget"
        );
        assert_eq!(
            repo_id_from_url("git@github.com:acme/widget").unwrap(),
            "acme/widget"
        );
        assert!(repo_id_from_url("notaurl").is_err());
    }
}
