//! Shallow clones and local git access.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use git2::{build::RepoBuilder, FetchOptions, Repository};
use tracing::{debug, info};

use coderisk_core::{ChangeStatus, CodeRiskError, Result};
use coderisk_staging::{CommitFileRow, CommitRow};

/// A repository clone rooted at `<data-dir>/repos/<repo-hash>/`.
pub struct ClonedRepo {
    pub root: PathBuf,
    repo: Repository,
}

impl ClonedRepo {
    /// Opens the clone if it already exists, otherwise shallow-clones
    /// (depth 1, default branch) into `root`.
    pub fn open_or_clone(url: &str, root: &Path) -> Result<Self> {
        if root.join(".git").exists() {
            let repo = Repository::open(root).map_err(git_err)?;
            debug!(root = %root.display(), "reusing existing clone");
            return Ok(Self {
                root: root.to_path_buf(),
                repo,
            });
        }

        std::fs::create_dir_all(root)?;
        let mut fetch = FetchOptions::new();
        fetch.depth(1);
        let repo = RepoBuilder::new()
            .fetch_options(fetch)
            .clone(url, root)
            .map_err(git_err)?;
        info!(url, root = %root.display(), "shallow clone complete");
        Ok(Self {
            root: root.to_path_buf(),
            repo,
        })
    }

    pub fn open(root: &Path) -> Result<Self> {
        let repo = Repository::open(root).map_err(git_err)?;
        Ok(Self {
            root: root.to_path_buf(),
            repo,
        })
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn default_branch(&self) -> Result<String> {
        let head = self.repo.head().map_err(git_err)?;
        Ok(head.shorthand().unwrap_or("main").to_string())
    }

    /// Walks the local log and produces staging rows for commits within the
    /// window. Used by `init --local` when no forge API is reachable; file
    /// stats come from the diff against the first parent.
    pub fn log_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<(Vec<CommitRow>, Vec<CommitFileRow>)> {
        let mut walk = self.repo.revwalk().map_err(git_err)?;
        walk.push_head().map_err(git_err)?;

        let mut commits = Vec::new();
        let mut files = Vec::new();
        for oid in walk {
            let oid = oid.map_err(git_err)?;
            let commit = self.repo.find_commit(oid).map_err(git_err)?;
            let authored_at = Utc
                .timestamp_opt(commit.author().when().seconds(), 0)
                .single()
                .unwrap_or_else(Utc::now);
            if authored_at < since {
                break;
            }

            let sha = oid.to_string();
            commits.push(CommitRow {
                sha: sha.clone(),
                author_name: commit.author().name().unwrap_or("").to_string(),
                author_email: commit.author().email().unwrap_or("").to_string(),
                authored_at,
                message: commit.message().unwrap_or("").to_string(),
                parents: commit.parent_ids().map(|p| p.to_string()).collect(),
            });

            let parent_tree = commit.parent(0).ok().and_then(|p| p.tree().ok());
            let tree = commit.tree().map_err(git_err)?;
            let diff = self
                .repo
                .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)
                .map_err(git_err)?;
            let stats = diff.stats().map_err(git_err)?;
            let per_file = if stats.files_changed() > 0 {
                (stats.insertions() / stats.files_changed()) as u32
            } else {
                0
            };
            for delta in diff.deltas() {
                let path = delta
                    .new_file()
                    .path()
                    .or_else(|| delta.old_file().path())
                    .map(|p| p.to_string_lossy().to_string());
                let Some(path) = path else { continue };
                let status = match delta.status() {
                    git2::Delta::Added => ChangeStatus::Added,
                    git2::Delta::Deleted => ChangeStatus::Deleted,
                    git2::Delta::Renamed => ChangeStatus::Renamed,
                    _ => ChangeStatus::Modified,
                };
                let previous_path = (status == ChangeStatus::Renamed)
                    .then(|| delta.old_file().path())
                    .flatten()
                    .map(|p| p.to_string_lossy().to_string());
                files.push(CommitFileRow {
                    sha: sha.clone(),
                    path,
                    status,
                    additions: per_file,
                    deletions: 0,
                    previous_path,
                });
            }
        }
        Ok((commits, files))
    }
}

/// Remote URL of the repository at `path`, preferring `origin`.
pub fn discover_remote_url(path: &Path) -> Result<String> {
    let repo = Repository::discover(path).map_err(git_err)?;
    let remote = repo
        .find_remote("origin")
        .or_else(|_| {
            let names = repo.remotes()?;
            let first = names
                .get(0)
                .ok_or_else(|| git2::Error::from_str("no remotes configured"))?;
            repo.find_remote(first)
        })
        .map_err(|_| CodeRiskError::Input(format!("no git remote found under {}", path.display())))?;
    remote
        .url()
        .map(|u| u.to_string())
        .ok_or_else(|| CodeRiskError::Input("remote URL is not valid UTF-8".into()))
}

/// Root of the working tree containing `path`.
pub fn discover_worktree_root(path: &Path) -> Result<PathBuf> {
    let repo = Repository::discover(path).map_err(git_err)?;
    repo.workdir()
        .map(|p| p.to_path_buf())
        .ok_or_else(|| CodeRiskError::Input("repository has no working tree".into()))
}

fn git_err(e: git2::Error) -> CodeRiskError {
    CodeRiskError::Fetch {
        stage: "git".into(),
        cause: e.message().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn init_repo(dir: &Path) {
        let run = |args: &[&str]| {
            Command::new("git")
                .args(args)
                .current_dir(dir)
                .env("GIT_AUTHOR_NAME", "Test")
                .env("GIT_AUTHOR_EMAIL", "test@example.com")
                .env("GIT_COMMITTER_NAME", "Test")
                .env("GIT_COMMITTER_EMAIL", "test@example.com")
                .output()
                .expect("git invocation failed");
        };
        run(&["init", "-b", "main"]);
        std::fs::write(dir.join("a.go"), "package main\n").unwrap();
        run(&["add", "."]);
        run(&["commit", "-m", "first"]);
        std::fs::write(dir.join("b.go"), "package main\n").unwrap();
        run(&["add", "."]);
        run(&["commit", "-m", "second"]);
    }

    #[test]
    fn log_since_reads_local_history() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());

        let clone = ClonedRepo::open(dir.path()).unwrap();
        let since = Utc::now() - chrono::Duration::days(90);
        let (commits, files) = clone.log_since(since).unwrap();
        assert_eq!(commits.len(), 2);
        assert!(!files.is_empty());
        // newest first from revwalk
        assert!(commits[0].message.contains("second"));
    }

    #[test]
    fn worktree_root_is_discovered_from_subdir() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let sub = dir.path().join("nested");
        std::fs::create_dir_all(&sub).unwrap();

        let root = discover_worktree_root(&sub).unwrap();
        assert_eq!(
            root.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }
}
