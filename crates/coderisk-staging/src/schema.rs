//! Staging schema.
//!
//! Every table is keyed by `(repo_id, natural_id)` and carries `fetched_at`
//! plus, where stage 2 consumes it, `processed_at`, so fetch and build can
//! resume independently. Rows are never hard-deleted; the 90-day window is
//! applied at read time.

use rusqlite::Connection;

use coderisk_core::Result;

use crate::store::map_sqlite_err;

pub const SCHEMA_VERSION: i64 = 2;

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS repositories (
    repo_id        TEXT PRIMARY KEY,
    default_branch TEXT NOT NULL,
    languages      TEXT NOT NULL DEFAULT '{}',
    created_at     TEXT,
    fetched_at     TEXT NOT NULL,
    processed_at   TEXT
);

CREATE TABLE IF NOT EXISTS commits (
    repo_id      TEXT NOT NULL,
    sha          TEXT NOT NULL,
    author_name  TEXT NOT NULL DEFAULT '',
    author_email TEXT NOT NULL DEFAULT '',
    authored_at  TEXT NOT NULL,
    message      TEXT NOT NULL DEFAULT '',
    parents      TEXT NOT NULL DEFAULT '[]',
    fetched_at   TEXT NOT NULL,
    processed_at TEXT,
    PRIMARY KEY (repo_id, sha)
);
CREATE INDEX IF NOT EXISTS idx_commits_authored ON commits (repo_id, authored_at);
CREATE INDEX IF NOT EXISTS idx_commits_fetched ON commits (repo_id, fetched_at);

CREATE TABLE IF NOT EXISTS commit_files (
    repo_id       TEXT NOT NULL,
    sha           TEXT NOT NULL,
    path          TEXT NOT NULL,
    status        TEXT NOT NULL,
    additions     INTEGER NOT NULL DEFAULT 0,
    deletions     INTEGER NOT NULL DEFAULT 0,
    previous_path TEXT,
    PRIMARY KEY (repo_id, sha, path),
    FOREIGN KEY (repo_id, sha) REFERENCES commits (repo_id, sha)
);
CREATE INDEX IF NOT EXISTS idx_commit_files_path ON commit_files (repo_id, path);

CREATE TABLE IF NOT EXISTS issues (
    repo_id    TEXT NOT NULL,
    number     INTEGER NOT NULL,
    title      TEXT NOT NULL DEFAULT '',
    body       TEXT NOT NULL DEFAULT '',
    state      TEXT NOT NULL,
    labels     TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    closed_at  TEXT,
    fetched_at TEXT NOT NULL,
    PRIMARY KEY (repo_id, number)
);
CREATE INDEX IF NOT EXISTS idx_issues_fetched ON issues (repo_id, fetched_at);

CREATE TABLE IF NOT EXISTS pull_requests (
    repo_id    TEXT NOT NULL,
    number     INTEGER NOT NULL,
    title      TEXT NOT NULL DEFAULT '',
    body       TEXT NOT NULL DEFAULT '',
    state      TEXT NOT NULL,
    merged_at  TEXT,
    base_sha   TEXT NOT NULL DEFAULT '',
    head_sha   TEXT NOT NULL DEFAULT '',
    issue_refs TEXT NOT NULL DEFAULT '[]',
    fetched_at TEXT NOT NULL,
    PRIMARY KEY (repo_id, number)
);

CREATE TABLE IF NOT EXISTS tree_entries (
    repo_id    TEXT NOT NULL,
    sha        TEXT NOT NULL,
    path       TEXT NOT NULL,
    entry_type TEXT NOT NULL,
    size       INTEGER,
    language   TEXT,
    fetched_at TEXT NOT NULL,
    PRIMARY KEY (repo_id, sha, path)
);

CREATE TABLE IF NOT EXISTS incidents (
    repo_id     TEXT NOT NULL,
    id          TEXT NOT NULL,
    title       TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    severity    TEXT NOT NULL,
    occurred_at TEXT NOT NULL,
    resolved_at TEXT,
    root_cause  TEXT,
    created_at  TEXT NOT NULL,
    PRIMARY KEY (repo_id, id)
);

CREATE TABLE IF NOT EXISTS incident_files (
    repo_id         TEXT NOT NULL,
    incident_id     TEXT NOT NULL,
    file_path       TEXT NOT NULL,
    confidence      REAL NOT NULL DEFAULT 1.0,
    line_number     INTEGER,
    blamed_function TEXT,
    PRIMARY KEY (repo_id, incident_id, file_path),
    FOREIGN KEY (repo_id, incident_id) REFERENCES incidents (repo_id, id)
);
CREATE INDEX IF NOT EXISTS idx_incident_files_path ON incident_files (repo_id, file_path);

CREATE VIRTUAL TABLE IF NOT EXISTS incidents_fts USING fts5(
    id UNINDEXED,
    title,
    description,
    root_cause,
    tokenize='porter unicode61'
);

CREATE VIRTUAL TABLE IF NOT EXISTS issues_fts USING fts5(
    number UNINDEXED,
    title,
    body,
    tokenize='porter unicode61'
);
"#;

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
        .map_err(map_sqlite_err)?;
    conn.execute_batch(DDL).map_err(map_sqlite_err)?;
    conn.execute(
        "INSERT INTO meta (key, value) VALUES ('schema_version', ?1)
         ON CONFLICT (key) DO UPDATE SET value = excluded.value",
        [SCHEMA_VERSION.to_string()],
    )
    .map_err(map_sqlite_err)?;
    Ok(())
}
