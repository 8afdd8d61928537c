//! Co-change materialization math.
//!
//! `frequency = commits_changing_both / max(commits_touching_a,
//! commits_touching_b)` over the window; only pairs at or above the 0.3
//! floor are materialized, and always in both directions with identical
//! properties.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::warn;

use coderisk_core::limits::CO_CHANGE_FLOOR;

/// Commits touching more files than this are skipped for pairing; mass
/// refactors would otherwise produce quadratic noise pairs.
const MAX_COMMIT_FILES: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct CoChangePair {
    pub a: String,
    pub b: String,
    pub frequency: f64,
    pub co_changes: u32,
}

/// `commit_files` is (sha, file_path); paths must already be in their final
/// (absolute) form so the resulting pairs can be used as edge endpoints.
pub fn compute_cochange(commit_files: &[(String, String)]) -> Vec<CoChangePair> {
    let mut by_commit: BTreeMap<&str, HashSet<&str>> = BTreeMap::new();
    for (sha, path) in commit_files {
        by_commit.entry(sha).or_default().insert(path);
    }

    let mut touches: HashMap<&str, u32> = HashMap::new();
    let mut pair_counts: HashMap<(String, String), u32> = HashMap::new();

    for (sha, files) in &by_commit {
        if files.len() > MAX_COMMIT_FILES {
            warn!(sha, files = files.len(), "skipping bulk commit for co-change pairing");
            continue;
        }
        let mut files: Vec<&str> = files.iter().copied().collect();
        files.sort_unstable();
        for file in &files {
            *touches.entry(file).or_default() += 1;
        }
        for i in 0..files.len() {
            for j in (i + 1)..files.len() {
                let key = (files[i].to_string(), files[j].to_string());
                *pair_counts.entry(key).or_default() += 1;
            }
        }
    }

    let mut pairs = Vec::new();
    for ((a, b), both) in pair_counts {
        let touch_a = touches.get(a.as_str()).copied().unwrap_or(0);
        let touch_b = touches.get(b.as_str()).copied().unwrap_or(0);
        let denom = touch_a.max(touch_b);
        if denom == 0 {
            continue;
        }
        let frequency = both as f64 / denom as f64;
        if frequency >= CO_CHANGE_FLOOR {
            pairs.push(CoChangePair {
                a,
                b,
                frequency,
                co_changes: both,
            });
        }
    }
    pairs.sort_by(|x, y| (&x.a, &x.b).cmp(&(&y.a, &y.b)));
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cf(sha: &str, path: &str) -> (String, String) {
        (sha.to_string(), path.to_string())
    }

    #[test]
    fn frequency_uses_max_touch_count() {
        // a touched 4 times, b twice, together twice -> 2/4 = 0.5
        let rows = vec![
            cf("c1", "/r/a.go"),
            cf("c1", "/r/b.go"),
            cf("c2", "/r/a.go"),
            cf("c2", "/r/b.go"),
            cf("c3", "/r/a.go"),
            cf("c4", "/r/a.go"),
        ];
        let pairs = compute_cochange(&rows);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].co_changes, 2);
        assert!((pairs[0].frequency - 0.5).abs() < 1e-9);
    }

    #[test]
    fn floor_is_strict() {
        // together 299 of 1000 -> 0.299, below the floor
        let mut rows = Vec::new();
        for i in 0..1000 {
            rows.push(cf(&format!("c{}", i), "/r/a.go"));
            if i < 299 {
                rows.push(cf(&format!("c{}", i), "/r/b.go"));
            }
        }
        assert!(compute_cochange(&rows).is_empty());

        // exactly 300 of 1000 -> 0.3, materialized
        rows.push(cf("c299", "/r/b.go"));
        let pairs = compute_cochange(&rows);
        assert_eq!(pairs.len(), 1);
        assert!((pairs[0].frequency - 0.3).abs() < 1e-9);
    }

    #[test]
    fn duplicate_rows_within_commit_count_once() {
        let rows = vec![
            cf("c1", "/r/a.go"),
            cf("c1", "/r/a.go"),
            cf("c1", "/r/b.go"),
        ];
        let pairs = compute_cochange(&rows);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].co_changes, 1);
        assert!((pairs[0].frequency - 1.0).abs() < 1e-9);
    }

    #[test]
    fn bulk_commits_are_ignored() {
        let mut rows = Vec::new();
        for i in 0..150 {
            rows.push(cf("bulk", &format!("/r/f{}.go", i)));
        }
        assert!(compute_cochange(&rows).is_empty());
    }
}
