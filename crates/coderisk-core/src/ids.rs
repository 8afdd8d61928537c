//! Identity discipline for graph nodes.
//!
//! Every node carries a `unique_id` string; upserts match on it and edges
//! are created by matching both endpoints' ids. Files use the absolute
//! canonicalized path under the ingested clone root, so the same source file
//! always maps to the same node across builds.

use uuid::Uuid;

pub fn repo_id(owner_name: &str) -> String {
    format!("repo:{}", owner_name)
}

pub fn file_id(absolute_path: &str) -> String {
    format!("file:{}", absolute_path)
}

/// `start_line` disambiguates overloads and re-definitions of the same name.
pub fn function_id(absolute_path: &str, name: &str, start_line: u32) -> String {
    format!("func:{}:{}:{}", absolute_path, name, start_line)
}

pub fn class_id(absolute_path: &str, name: &str, start_line: u32) -> String {
    format!("class:{}:{}:{}", absolute_path, name, start_line)
}

pub fn import_id(absolute_path: &str, line: u32) -> String {
    format!("import:{}:{}", absolute_path, line)
}

pub fn commit_id(sha: &str) -> String {
    format!("commit:{}", sha)
}

pub fn developer_id(email: &str) -> String {
    format!("dev:{}", email)
}

pub fn incident_id(id: &Uuid) -> String {
    format!("incident:{}", id)
}

/// Strips the `file:` prefix back off a unique id, if present.
pub fn file_path_of(unique_id: &str) -> Option<&str> {
    unique_id.strip_prefix("file:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_ids_are_prefixed_paths() {
        let id = file_id("/data/repos/ab12/src/main.go");
        assert_eq!(id, "file:/data/repos/ab12/src/main.go");
        assert_eq!(file_path_of(&id), Some("/data/repos/ab12/src/main.go"));
    }

    #[test]
    fn function_ids_disambiguate_by_line() {
        let a = function_id("/r/a.py", "handler", 10);
        let b = function_id("/r/a.py", "handler", 42);
        assert_ne!(a, b);
    }
}
