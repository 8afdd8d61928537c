//! Deterministic per-repository identifier.
//!
//! The hash locates the ingested clone at `<data-dir>/repos/<hash>/` and is
//! the bridge between git-relative paths and the absolute paths stored in
//! Layer 1. The recipe is fixed: normalize the remote URL, SHA-256 it, keep
//! the leading 16 hex characters.

use sha2::{Digest, Sha256};

/// Normalize a remote URL so that the common spellings of the same repo
/// hash identically: strip scheme and credentials, lowercase the host,
/// convert scp-like syntax, drop a trailing `.git` and trailing slashes.
pub fn normalize_remote_url(url: &str) -> String {
    let mut rest = url.trim();

    for scheme in ["https://", "http://", "ssh://", "git://"] {
        if let Some(stripped) = rest.strip_prefix(scheme) {
            rest = stripped;
            break;
        }
    }

    // user@host:owner/repo -> host/owner/repo
    if let Some(at) = rest.find('@') {
        rest = &rest[at + 1..];
    }
    let rest = rest.replacen(':', "/", 1);

    let rest = rest.trim_end_matches('/');
    let rest = rest.strip_suffix(".git").unwrap_or(rest);

    match rest.split_once('/') {
        Some((host, path)) => format!("{}/{}", host.to_lowercase(), path),
        None => rest.to_lowercase(),
    }
}

/// 16-hex-digit repo identifier. Unique per user's set of ingested repos;
/// global uniqueness is not claimed.
pub fn repo_hash(remote_url: &str) -> String {
    let normalized = normalize_remote_url(remote_url);
    let digest = Sha256::digest(normalized.as_bytes());
    let hex = digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>();
    hex[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_unifies_url_spellings() {
        let a = normalize_remote_url("https://GitHub.com/acme/widget.git");
        let b = normalize_remote_url("git@github.com:acme/widget");
        let c = normalize_remote_url("ssh://git@github.com/acme/widget.git/");
        assert_eq!(a, "github.com/acme/widget");
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn path_case_is_preserved() {
        let n = normalize_remote_url("https://github.com/Acme/Widget");
        assert_eq!(n, "github.com/Acme/Widget");
    }

    #[test]
    fn hash_is_16_hex_digits_and_stable() {
        let h1 = repo_hash("https://github.com/acme/widget.git");
        let h2 = repo_hash("git@github.com:acme/widget");
        assert_eq!(h1.len(), 16);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(h1, h2);
    }

    #[test]
    fn different_repos_hash_differently() {
        assert_ne!(
            repo_hash("https://github.com/acme/widget"),
            repo_hash("https://github.com/acme/gadget")
        );
    }
}
