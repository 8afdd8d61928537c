use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use coderisk_core::{ChangeStatus, CodeRiskError, Result, Severity};

use crate::models::*;
use crate::schema::init_schema;

pub(crate) fn map_sqlite_err(e: rusqlite::Error) -> CodeRiskError {
    CodeRiskError::Staging(e.to_string())
}

/// Relational store of normalized forge/git data.
///
/// One database per repository; the connection mutex serializes writers so
/// transactions per repo are sequential while separate repos stay
/// independent. All upserts are idempotent on the natural key.
#[derive(Clone)]
pub struct StagingStore {
    conn: Arc<Mutex<Connection>>,
}

impl StagingStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(map_sqlite_err)?;
        init_schema(&conn)?;
        info!(path = %path.display(), "staging store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(map_sqlite_err)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ---- repositories -------------------------------------------------

    pub fn upsert_repository(&self, row: &RepositoryRow) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO repositories (repo_id, default_branch, languages, created_at, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (repo_id) DO UPDATE SET
                 default_branch = excluded.default_branch,
                 languages = excluded.languages,
                 created_at = excluded.created_at,
                 fetched_at = excluded.fetched_at",
            params![
                row.repo_id,
                row.default_branch,
                serde_json::to_string(&row.languages)?,
                row.created_at.map(|t| t.to_rfc3339()),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(map_sqlite_err)?;
        Ok(())
    }

    pub fn repository(&self, repo_id: &str) -> Result<Option<RepositoryRow>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT repo_id, default_branch, languages, created_at
             FROM repositories WHERE repo_id = ?1",
            [repo_id],
            |r| {
                Ok(RepositoryRow {
                    repo_id: r.get(0)?,
                    default_branch: r.get(1)?,
                    languages: serde_json::from_str::<HashMap<String, u64>>(
                        &r.get::<_, String>(2)?,
                    )
                    .unwrap_or_default(),
                    created_at: parse_ts_opt(r.get::<_, Option<String>>(3)?),
                })
            },
        )
        .optional()
        .map_err(map_sqlite_err)
    }

    // ---- commits ------------------------------------------------------

    /// Inserts commits with their file rows in one transaction per batch.
    /// A commit row and its commit_files are never visible separately.
    pub fn upsert_commits(
        &self,
        repo_id: &str,
        commits: &[CommitRow],
        files: &[CommitFileRow],
    ) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(map_sqlite_err)?;
        let now = Utc::now().to_rfc3339();
        let mut fresh = 0usize;
        {
            let mut commit_stmt = tx
                .prepare(
                    "INSERT INTO commits
                         (repo_id, sha, author_name, author_email, authored_at, message, parents, fetched_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT (repo_id, sha) DO NOTHING",
                )
                .map_err(map_sqlite_err)?;
            for c in commits {
                fresh += commit_stmt
                    .execute(params![
                        repo_id,
                        c.sha,
                        c.author_name,
                        c.author_email,
                        c.authored_at.to_rfc3339(),
                        c.message,
                        serde_json::to_string(&c.parents)?,
                        now,
                    ])
                    .map_err(map_sqlite_err)?;
            }

            let mut file_stmt = tx
                .prepare(
                    "INSERT INTO commit_files
                         (repo_id, sha, path, status, additions, deletions, previous_path)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT (repo_id, sha, path) DO UPDATE SET
                         status = excluded.status,
                         additions = excluded.additions,
                         deletions = excluded.deletions,
                         previous_path = excluded.previous_path",
                )
                .map_err(map_sqlite_err)?;
            for f in files {
                file_stmt
                    .execute(params![
                        repo_id,
                        f.sha,
                        f.path,
                        f.status.to_string(),
                        f.additions,
                        f.deletions,
                        f.previous_path,
                    ])
                    .map_err(map_sqlite_err)?;
            }
        }
        tx.commit().map_err(map_sqlite_err)?;
        debug!(repo_id, fresh, total = commits.len(), "commit batch staged");
        Ok(fresh)
    }

    pub fn commits_since(&self, repo_id: &str, since: DateTime<Utc>) -> Result<Vec<CommitRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT sha, author_name, author_email, authored_at, message, parents
                 FROM commits
                 WHERE repo_id = ?1 AND authored_at >= ?2
                 ORDER BY authored_at",
            )
            .map_err(map_sqlite_err)?;
        let rows = stmt
            .query_map(params![repo_id, since.to_rfc3339()], |r| {
                Ok(CommitRow {
                    sha: r.get(0)?,
                    author_name: r.get(1)?,
                    author_email: r.get(2)?,
                    authored_at: parse_ts(r.get::<_, String>(3)?),
                    message: r.get(4)?,
                    parents: serde_json::from_str(&r.get::<_, String>(5)?).unwrap_or_default(),
                })
            })
            .map_err(map_sqlite_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(map_sqlite_err)?;
        Ok(rows)
    }

    /// commit_files joined onto in-window commits, for Layer-2 construction.
    pub fn commit_files_since(
        &self,
        repo_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<CommitFileRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT cf.sha, cf.path, cf.status, cf.additions, cf.deletions, cf.previous_path
                 FROM commit_files cf
                 JOIN commits c ON c.repo_id = cf.repo_id AND c.sha = cf.sha
                 WHERE cf.repo_id = ?1 AND c.authored_at >= ?2",
            )
            .map_err(map_sqlite_err)?;
        let rows = stmt
            .query_map(params![repo_id, since.to_rfc3339()], |r| {
                Ok(CommitFileRow {
                    sha: r.get(0)?,
                    path: r.get(1)?,
                    status: ChangeStatus::from_str(&r.get::<_, String>(2)?)
                        .unwrap_or(ChangeStatus::Modified),
                    additions: r.get(3)?,
                    deletions: r.get(4)?,
                    previous_path: r.get(5)?,
                })
            })
            .map_err(map_sqlite_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(map_sqlite_err)?;
        Ok(rows)
    }

    /// Distinct authors touching `path` since `since` (ownership churn).
    pub fn distinct_authors(
        &self,
        repo_id: &str,
        path: &str,
        since: DateTime<Utc>,
    ) -> Result<u32> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(DISTINCT c.author_email)
             FROM commit_files cf
             JOIN commits c ON c.repo_id = cf.repo_id AND c.sha = cf.sha
             WHERE cf.repo_id = ?1 AND cf.path = ?2 AND c.authored_at >= ?3",
            params![repo_id, path, since.to_rfc3339()],
            |r| r.get(0),
        )
        .map_err(map_sqlite_err)
    }

    /// Marks commits consumed by the graph builder.
    pub fn mark_commits_processed(&self, repo_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE commits SET processed_at = ?1 WHERE repo_id = ?2 AND processed_at IS NULL",
            params![Utc::now().to_rfc3339(), repo_id],
        )
        .map_err(map_sqlite_err)?;
        Ok(())
    }

    // ---- issues / pull requests --------------------------------------

    pub fn upsert_issues(&self, repo_id: &str, issues: &[IssueRow]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(map_sqlite_err)?;
        let now = Utc::now().to_rfc3339();
        let mut fresh = 0usize;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO issues
                         (repo_id, number, title, body, state, labels, created_at, closed_at, fetched_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT (repo_id, number) DO UPDATE SET
                         title = excluded.title,
                         body = excluded.body,
                         state = excluded.state,
                         labels = excluded.labels,
                         closed_at = excluded.closed_at,
                         fetched_at = excluded.fetched_at",
                )
                .map_err(map_sqlite_err)?;
            let mut fts_del = tx
                .prepare("DELETE FROM issues_fts WHERE number = ?1")
                .map_err(map_sqlite_err)?;
            let mut fts_ins = tx
                .prepare("INSERT INTO issues_fts (number, title, body) VALUES (?1, ?2, ?3)")
                .map_err(map_sqlite_err)?;
            for i in issues {
                let changed = stmt
                    .execute(params![
                        repo_id,
                        i.number,
                        i.title,
                        i.body,
                        i.state,
                        serde_json::to_string(&i.labels)?,
                        i.created_at.to_rfc3339(),
                        i.closed_at.map(|t| t.to_rfc3339()),
                        now,
                    ])
                    .map_err(map_sqlite_err)?;
                fresh += changed;
                fts_del.execute(params![i.number]).map_err(map_sqlite_err)?;
                fts_ins
                    .execute(params![i.number, i.title, i.body])
                    .map_err(map_sqlite_err)?;
            }
        }
        tx.commit().map_err(map_sqlite_err)?;
        Ok(fresh)
    }

    pub fn upsert_pull_requests(&self, repo_id: &str, prs: &[PullRequestRow]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(map_sqlite_err)?;
        let now = Utc::now().to_rfc3339();
        let mut fresh = 0usize;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO pull_requests
                         (repo_id, number, title, body, state, merged_at, base_sha, head_sha, issue_refs, fetched_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                     ON CONFLICT (repo_id, number) DO UPDATE SET
                         title = excluded.title,
                         body = excluded.body,
                         state = excluded.state,
                         merged_at = excluded.merged_at,
                         base_sha = excluded.base_sha,
                         head_sha = excluded.head_sha,
                         issue_refs = excluded.issue_refs,
                         fetched_at = excluded.fetched_at",
                )
                .map_err(map_sqlite_err)?;
            for p in prs {
                fresh += stmt
                    .execute(params![
                        repo_id,
                        p.number,
                        p.title,
                        p.body,
                        p.state,
                        p.merged_at.map(|t| t.to_rfc3339()),
                        p.base_sha,
                        p.head_sha,
                        serde_json::to_string(&p.issue_refs)?,
                        now,
                    ])
                    .map_err(map_sqlite_err)?;
            }
        }
        tx.commit().map_err(map_sqlite_err)?;
        Ok(fresh)
    }

    pub fn upsert_tree_entries(&self, repo_id: &str, entries: &[TreeEntryRow]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(map_sqlite_err)?;
        let now = Utc::now().to_rfc3339();
        let mut fresh = 0usize;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO tree_entries
                         (repo_id, sha, path, entry_type, size, language, fetched_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT (repo_id, sha, path) DO UPDATE SET
                         entry_type = excluded.entry_type,
                         size = excluded.size,
                         language = excluded.language,
                         fetched_at = excluded.fetched_at",
                )
                .map_err(map_sqlite_err)?;
            for e in entries {
                fresh += stmt
                    .execute(params![
                        repo_id,
                        e.sha,
                        e.path,
                        e.entry_type,
                        e.size,
                        e.language,
                        now,
                    ])
                    .map_err(map_sqlite_err)?;
            }
        }
        tx.commit().map_err(map_sqlite_err)?;
        Ok(fresh)
    }

    // ---- checkpoints --------------------------------------------------

    /// Highest `fetched_at` in a table, the fetcher's resume point.
    pub fn latest_fetched_at(&self, table: &str, repo_id: &str) -> Result<Option<DateTime<Utc>>> {
        const ALLOWED: &[&str] = &[
            "repositories",
            "commits",
            "issues",
            "pull_requests",
            "tree_entries",
        ];
        if !ALLOWED.contains(&table) {
            return Err(CodeRiskError::Staging(format!(
                "unknown checkpoint table: {}",
                table
            )));
        }
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT MAX(fetched_at) FROM {} WHERE repo_id = ?1",
            table
        );
        let value: Option<String> = conn
            .query_row(&sql, [repo_id], |r| r.get(0))
            .map_err(map_sqlite_err)?;
        Ok(value.and_then(|s| DateTime::parse_from_rfc3339(&s).ok().map(|t| t.with_timezone(&Utc))))
    }

    // ---- incidents ----------------------------------------------------

    pub fn create_incident(&self, repo_id: &str, row: &IncidentRow) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(map_sqlite_err)?;
        tx.execute(
            "INSERT INTO incidents
                 (repo_id, id, title, description, severity, occurred_at, resolved_at, root_cause, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (repo_id, id) DO UPDATE SET
                 title = excluded.title,
                 description = excluded.description,
                 severity = excluded.severity,
                 occurred_at = excluded.occurred_at,
                 resolved_at = excluded.resolved_at,
                 root_cause = excluded.root_cause",
            params![
                repo_id,
                row.id.to_string(),
                row.title,
                row.description,
                row.severity.to_string(),
                row.occurred_at.to_rfc3339(),
                row.resolved_at.map(|t| t.to_rfc3339()),
                row.root_cause,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(map_sqlite_err)?;
        tx.execute(
            "DELETE FROM incidents_fts WHERE id = ?1",
            [row.id.to_string()],
        )
        .map_err(map_sqlite_err)?;
        tx.execute(
            "INSERT INTO incidents_fts (id, title, description, root_cause)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                row.id.to_string(),
                row.title,
                row.description,
                row.root_cause.clone().unwrap_or_default(),
            ],
        )
        .map_err(map_sqlite_err)?;
        tx.commit().map_err(map_sqlite_err)?;
        Ok(())
    }

    pub fn incident(&self, repo_id: &str, id: &Uuid) -> Result<Option<IncidentRow>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, title, description, severity, occurred_at, resolved_at, root_cause
             FROM incidents WHERE repo_id = ?1 AND id = ?2",
            params![repo_id, id.to_string()],
            |r| {
                Ok(IncidentRow {
                    id: Uuid::parse_str(&r.get::<_, String>(0)?).unwrap_or_default(),
                    title: r.get(1)?,
                    description: r.get(2)?,
                    severity: Severity::from_str(&r.get::<_, String>(3)?)
                        .unwrap_or(Severity::Medium),
                    occurred_at: parse_ts(r.get::<_, String>(4)?),
                    resolved_at: parse_ts_opt(r.get::<_, Option<String>>(5)?),
                    root_cause: r.get(6)?,
                })
            },
        )
        .optional()
        .map_err(map_sqlite_err)
    }

    pub fn link_incident(&self, repo_id: &str, link: &IncidentFileRow) -> Result<()> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "INSERT INTO incident_files
                     (repo_id, incident_id, file_path, confidence, line_number, blamed_function)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (repo_id, incident_id, file_path) DO UPDATE SET
                     confidence = excluded.confidence,
                     line_number = excluded.line_number,
                     blamed_function = excluded.blamed_function",
                params![
                    repo_id,
                    link.incident_id.to_string(),
                    link.file_path,
                    link.confidence,
                    link.line_number,
                    link.blamed_function,
                ],
            )
            .map_err(map_sqlite_err)?;
        debug!(repo_id, incident = %link.incident_id, changed, "incident link staged");
        Ok(())
    }

    pub fn incident_links(&self, repo_id: &str) -> Result<Vec<IncidentFileRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT incident_id, file_path, confidence, line_number, blamed_function
                 FROM incident_files WHERE repo_id = ?1",
            )
            .map_err(map_sqlite_err)?;
        let rows = stmt
            .query_map([repo_id], |r| {
                Ok(IncidentFileRow {
                    incident_id: Uuid::parse_str(&r.get::<_, String>(0)?).unwrap_or_default(),
                    file_path: r.get(1)?,
                    confidence: r.get(2)?,
                    line_number: r.get(3)?,
                    blamed_function: r.get(4)?,
                })
            })
            .map_err(map_sqlite_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(map_sqlite_err)?;
        Ok(rows)
    }

    pub fn incidents(&self, repo_id: &str) -> Result<Vec<IncidentRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, title, description, severity, occurred_at, resolved_at, root_cause
                 FROM incidents WHERE repo_id = ?1 ORDER BY occurred_at DESC",
            )
            .map_err(map_sqlite_err)?;
        let rows = stmt
            .query_map([repo_id], |r| {
                Ok(IncidentRow {
                    id: Uuid::parse_str(&r.get::<_, String>(0)?).unwrap_or_default(),
                    title: r.get(1)?,
                    description: r.get(2)?,
                    severity: Severity::from_str(&r.get::<_, String>(3)?)
                        .unwrap_or(Severity::Medium),
                    occurred_at: parse_ts(r.get::<_, String>(4)?),
                    resolved_at: parse_ts_opt(r.get::<_, Option<String>>(5)?),
                    root_cause: r.get(6)?,
                })
            })
            .map_err(map_sqlite_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(map_sqlite_err)?;
        Ok(rows)
    }

    /// Full-text incident search, best match first.
    pub fn search_incidents(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, title, snippet(incidents_fts, 2, '[', ']', '…', 12), rank
                 FROM incidents_fts
                 WHERE incidents_fts MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
            )
            .map_err(map_sqlite_err)?;
        let rows = stmt
            .query_map(params![fts_escape(query), limit], |r| {
                Ok(SearchHit {
                    id: r.get(0)?,
                    title: r.get(1)?,
                    snippet: r.get(2)?,
                    rank: r.get(3)?,
                })
            })
            .map_err(map_sqlite_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(map_sqlite_err)?;
        Ok(rows)
    }

    /// Full-text issue search used by the incident-similarity metric.
    pub fn search_issues(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT number, title, snippet(issues_fts, 2, '[', ']', '…', 12), rank
                 FROM issues_fts
                 WHERE issues_fts MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
            )
            .map_err(map_sqlite_err)?;
        let rows = stmt
            .query_map(params![fts_escape(query), limit], |r| {
                Ok(SearchHit {
                    id: r.get::<_, i64>(0)?.to_string(),
                    title: r.get(1)?,
                    snippet: r.get(2)?,
                    rank: r.get(3)?,
                })
            })
            .map_err(map_sqlite_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(map_sqlite_err)?;
        Ok(rows)
    }

    pub fn row_count(&self, table: &str) -> Result<usize> {
        const ALLOWED: &[&str] = &[
            "repositories",
            "commits",
            "commit_files",
            "issues",
            "pull_requests",
            "tree_entries",
            "incidents",
            "incident_files",
        ];
        if !ALLOWED.contains(&table) {
            return Err(CodeRiskError::Staging(format!("unknown table: {}", table)));
        }
        let conn = self.conn.lock();
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        conn.query_row(&sql, [], |r| r.get::<_, i64>(0))
            .map(|n| n as usize)
            .map_err(map_sqlite_err)
    }
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}

fn parse_ts_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok().map(|t| t.with_timezone(&Utc)))
}

/// Quotes each term so user input cannot hit FTS5 query syntax.
fn fts_escape(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn commit(sha: &str, email: &str, days_ago: i64) -> CommitRow {
        CommitRow {
            sha: sha.into(),
            author_name: "Dev".into(),
            author_email: email.into(),
            authored_at: Utc::now() - Duration::days(days_ago),
            message: format!("commit {}", sha),
            parents: vec![],
        }
    }

    fn file(sha: &str, path: &str) -> CommitFileRow {
        CommitFileRow {
            sha: sha.into(),
            path: path.into(),
            status: ChangeStatus::Modified,
            additions: 3,
            deletions: 1,
            previous_path: None,
        }
    }

    #[test]
    fn upserts_are_idempotent() {
        let store = StagingStore::in_memory().unwrap();
        let commits = vec![commit("aaa", "a@x.io", 1), commit("bbb", "b@x.io", 2)];
        let files = vec![file("aaa", "src/a.go"), file("bbb", "src/b.go")];

        let fresh = store.upsert_commits("acme/widget", &commits, &files).unwrap();
        assert_eq!(fresh, 2);
        // second application writes no new rows
        let fresh = store.upsert_commits("acme/widget", &commits, &files).unwrap();
        assert_eq!(fresh, 0);
        assert_eq!(store.row_count("commits").unwrap(), 2);
        assert_eq!(store.row_count("commit_files").unwrap(), 2);
    }

    #[test]
    fn window_query_excludes_old_commits() {
        let store = StagingStore::in_memory().unwrap();
        let commits = vec![commit("new", "a@x.io", 10), commit("old", "a@x.io", 120)];
        let files = vec![file("new", "src/a.go"), file("old", "src/a.go")];
        store.upsert_commits("acme/widget", &commits, &files).unwrap();

        let since = Utc::now() - Duration::days(90);
        let recent = store.commits_since("acme/widget", since).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].sha, "new");

        let recent_files = store.commit_files_since("acme/widget", since).unwrap();
        assert_eq!(recent_files.len(), 1);
        assert_eq!(recent_files[0].sha, "new");
    }

    #[test]
    fn ownership_counts_distinct_authors() {
        let store = StagingStore::in_memory().unwrap();
        let commits = vec![
            commit("c1", "a@x.io", 1),
            commit("c2", "b@x.io", 2),
            commit("c3", "a@x.io", 3),
        ];
        let files = vec![
            file("c1", "src/hot.py"),
            file("c2", "src/hot.py"),
            file("c3", "src/hot.py"),
        ];
        store.upsert_commits("acme/widget", &commits, &files).unwrap();

        let since = Utc::now() - Duration::days(90);
        let authors = store.distinct_authors("acme/widget", "src/hot.py", since).unwrap();
        assert_eq!(authors, 2);
    }

    #[test]
    fn incident_search_ranks_matches() {
        let store = StagingStore::in_memory().unwrap();
        let id = Uuid::new_v4();
        store
            .create_incident(
                "acme/widget",
                &IncidentRow {
                    id,
                    title: "Login outage after session refactor".into(),
                    description: "Session tokens invalidated on deploy".into(),
                    severity: Severity::Critical,
                    occurred_at: Utc::now(),
                    resolved_at: None,
                    root_cause: Some("session cache key collision".into()),
                },
            )
            .unwrap();

        let hits = store.search_incidents("session tokens", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id.to_string());

        assert!(store.search_incidents("unrelated gadgets", 5).unwrap().is_empty());
    }

    #[test]
    fn fts_queries_tolerate_operators() {
        let store = StagingStore::in_memory().unwrap();
        // must not error even with FTS5 syntax characters in the query
        let hits = store.search_incidents("AND \"OR( NEAR", 5).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn checkpoint_advances_with_fetch() {
        let store = StagingStore::in_memory().unwrap();
        assert!(store
            .latest_fetched_at("commits", "acme/widget")
            .unwrap()
            .is_none());

        store
            .upsert_commits("acme/widget", &[commit("aaa", "a@x.io", 1)], &[])
            .unwrap();
        let first = store.latest_fetched_at("commits", "acme/widget").unwrap();
        assert!(first.is_some());
    }

    #[test]
    fn incident_links_round_trip() {
        let store = StagingStore::in_memory().unwrap();
        let id = Uuid::new_v4();
        store
            .create_incident(
                "acme/widget",
                &IncidentRow {
                    id,
                    title: "Checkout 500s".into(),
                    description: String::new(),
                    severity: Severity::High,
                    occurred_at: Utc::now(),
                    resolved_at: None,
                    root_cause: None,
                },
            )
            .unwrap();
        store
            .link_incident(
                "acme/widget",
                &IncidentFileRow {
                    incident_id: id,
                    file_path: "/data/repos/ab/src/checkout.py".into(),
                    confidence: 0.9,
                    line_number: Some(42),
                    blamed_function: Some("charge".into()),
                },
            )
            .unwrap();

        let links = store.incident_links("acme/widget").unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].line_number, Some(42));
    }
}
