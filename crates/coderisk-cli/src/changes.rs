//! Changed-set resolution: working tree, explicit paths, or a commit ref.

use std::path::Path;

use git2::{Delta, DiffFormat, DiffOptions, Repository};

use coderisk_core::{ChangeStatus, ChangedFile, CodeRiskError, Result};

/// What the user asked `check` to look at.
#[derive(Debug, Clone)]
pub enum CheckTarget {
    /// Staged + unstaged modifications in the working tree.
    WorkingTree,
    /// Explicit paths (git-relative).
    Paths(Vec<String>),
    /// A single rev or an `A..B` range.
    Ref(String),
}

impl CheckTarget {
    /// Args that name an existing path are paths; a lone non-path arg is
    /// treated as a rev.
    pub fn from_args(args: &[String], worktree_root: &Path) -> Self {
        if args.is_empty() {
            return CheckTarget::WorkingTree;
        }
        let all_paths = args.iter().all(|a| worktree_root.join(a).exists());
        if all_paths {
            CheckTarget::Paths(args.to_vec())
        } else if args.len() == 1 {
            CheckTarget::Ref(args[0].clone())
        } else {
            CheckTarget::Paths(args.to_vec())
        }
    }
}

/// Expands the target into changed files with per-file diff text.
pub fn resolve_changes(repo_root: &Path, target: &CheckTarget) -> Result<Vec<ChangedFile>> {
    let repo = Repository::discover(repo_root)
        .map_err(|e| CodeRiskError::Input(format!("not a git repository: {}", e.message())))?;

    match target {
        CheckTarget::WorkingTree => working_tree_changes(&repo, None),
        CheckTarget::Paths(paths) => working_tree_changes(&repo, Some(paths)),
        CheckTarget::Ref(rev) => ref_changes(&repo, rev),
    }
}

fn working_tree_changes(
    repo: &Repository,
    only_paths: Option<&Vec<String>>,
) -> Result<Vec<ChangedFile>> {
    let mut opts = DiffOptions::new();
    opts.include_untracked(true).recurse_untracked_dirs(true);
    if let Some(paths) = only_paths {
        for p in paths {
            opts.pathspec(p);
        }
    }
    let head_tree = repo
        .head()
        .ok()
        .and_then(|h| h.peel_to_tree().ok());
    let diff = repo
        .diff_tree_to_workdir_with_index(head_tree.as_ref(), Some(&mut opts))
        .map_err(git_err)?;
    collect(diff)
}

fn ref_changes(repo: &Repository, rev: &str) -> Result<Vec<ChangedFile>> {
    let (old_tree, new_tree) = if let Some((base, target)) = rev.split_once("..") {
        let base = repo
            .revparse_single(base.trim_end_matches('.'))
            .map_err(|_| CodeRiskError::Input(format!("unrecognized ref: {}", rev)))?
            .peel_to_commit()
            .map_err(git_err)?;
        let target = repo
            .revparse_single(target)
            .map_err(|_| CodeRiskError::Input(format!("unrecognized ref: {}", rev)))?
            .peel_to_commit()
            .map_err(git_err)?;
        (base.tree().map_err(git_err)?, target.tree().map_err(git_err)?)
    } else {
        let commit = repo
            .revparse_single(rev)
            .map_err(|_| CodeRiskError::Input(format!("unrecognized ref: {}", rev)))?
            .peel_to_commit()
            .map_err(git_err)?;
        let parent_tree = commit
            .parent(0)
            .ok()
            .and_then(|p| p.tree().ok())
            .unwrap_or_else(|| commit.tree().expect("commit tree"));
        (parent_tree, commit.tree().map_err(git_err)?)
    };

    let diff = repo
        .diff_tree_to_tree(Some(&old_tree), Some(&new_tree), None)
        .map_err(git_err)?;
    collect(diff)
}

fn collect(diff: git2::Diff<'_>) -> Result<Vec<ChangedFile>> {
    let mut files: Vec<ChangedFile> = Vec::new();

    for delta in diff.deltas() {
        let path = delta
            .new_file()
            .path()
            .or_else(|| delta.old_file().path())
            .map(|p| p.to_string_lossy().to_string());
        let Some(path) = path else { continue };
        let status = match delta.status() {
            Delta::Added | Delta::Untracked => ChangeStatus::Added,
            Delta::Deleted => ChangeStatus::Deleted,
            Delta::Renamed => ChangeStatus::Renamed,
            _ => ChangeStatus::Modified,
        };
        files.push(ChangedFile::new(path, status));
    }

    // patch text + line stats per file
    let mut patches: Vec<(String, String, u32, u32)> = files
        .iter()
        .map(|f| (f.path.clone(), String::new(), 0u32, 0u32))
        .collect();
    diff.print(DiffFormat::Patch, |delta, _hunk, line| {
        let Some(path) = delta
            .new_file()
            .path()
            .or_else(|| delta.old_file().path())
            .map(|p| p.to_string_lossy().to_string())
        else {
            return true;
        };
        if let Some(entry) = patches.iter_mut().find(|(p, _, _, _)| *p == path) {
            let content = String::from_utf8_lossy(line.content());
            match line.origin() {
                '+' => {
                    entry.2 += 1;
                    entry.1.push('+');
                    entry.1.push_str(&content);
                }
                '-' => {
                    entry.3 += 1;
                    entry.1.push('-');
                    entry.1.push_str(&content);
                }
                _ => {
                    entry.1.push_str(&content);
                }
            }
        }
        true
    })
    .map_err(git_err)?;

    for file in &mut files {
        if let Some((_, text, additions, deletions)) =
            patches.iter().find(|(p, _, _, _)| *p == file.path)
        {
            file.diff_text = text.clone();
            file.additions = *additions;
            file.deletions = *deletions;
        }
    }
    Ok(files)
}

fn git_err(e: git2::Error) -> CodeRiskError {
    CodeRiskError::Input(e.message().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn git(dir: &Path, args: &[&str]) {
        Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_NAME", "Test")
            .env("GIT_AUTHOR_EMAIL", "test@example.com")
            .env("GIT_COMMITTER_NAME", "Test")
            .env("GIT_COMMITTER_EMAIL", "test@example.com")
            .output()
            .expect("git invocation failed");
    }

    fn setup(dir: &Path) {
        git(dir, &["init", "-b", "main"]);
        std::fs::write(dir.join("a.go"), "package main\n").unwrap();
        git(dir, &["add", "."]);
        git(dir, &["commit", "-m", "first"]);
    }

    #[test]
    fn working_tree_modifications_are_detected() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());
        std::fs::write(dir.path().join("a.go"), "package main\nfunc f() {}\n").unwrap();

        let changes = resolve_changes(dir.path(), &CheckTarget::WorkingTree).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "a.go");
        assert!(changes[0].diff_text.contains("func f()"));
        assert!(changes[0].additions >= 1);
    }

    #[test]
    fn ref_target_expands_to_commit_files() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());
        std::fs::write(dir.path().join("b.go"), "package main\n").unwrap();
        git(dir.path(), &["add", "."]);
        git(dir.path(), &["commit", "-m", "second"]);

        let changes = resolve_changes(dir.path(), &CheckTarget::Ref("HEAD".into())).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "b.go");
        assert_eq!(changes[0].status, ChangeStatus::Added);
    }

    #[test]
    fn path_args_are_recognized() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());
        let target = CheckTarget::from_args(&["a.go".to_string()], dir.path());
        assert!(matches!(target, CheckTarget::Paths(_)));

        let target = CheckTarget::from_args(&["HEAD".to_string()], dir.path());
        assert!(matches!(target, CheckTarget::Ref(_)));
    }
}
