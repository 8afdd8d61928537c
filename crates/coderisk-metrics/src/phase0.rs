//! Phase-0 pre-filter.
//!
//! Pure regex/path matching over the changed set and its diff text; no
//! I/O, so a whole changed set classifies well inside the 50 ms budget.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use coderisk_core::{ChangedFile, ModificationType, RiskLevel};

const DOC_EXTENSIONS: &[&str] = &["md", "rst", "txt", "adoc"];

const SECURITY_KEYWORDS: &[&str] = &[
    "auth", "login", "password", "session", "token", "jwt", "crypto", "encrypt", "decrypt",
    "hash", "salt", "permission", "role", "admin",
];

static PROD_CONFIG: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\.env\.production$",
        r"(^|/)config/prod(uction)?/",
        r"(^|/)production\.(ya?ml|toml|json)$",
        r"(^|/)prod\.(ya?ml|toml|json)$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("prod config pattern"))
    .collect()
});

static DEPENDENCY_FILES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(^|/)(go\.mod|go\.sum|requirements.*\.txt|Pipfile|pyproject\.toml|package\.json|package-lock\.json|yarn\.lock|pom\.xml|build\.gradle|Cargo\.toml|Cargo\.lock)$",
    )
    .expect("dependency file pattern")
});

static TOOLING_FILES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|/)(\.github/|Makefile|Dockerfile|docker-compose|\.gitlab-ci|Jenkinsfile|\.pre-commit)")
        .expect("tooling pattern")
});

/// What Phase 0 decides for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Phase0Decision {
    /// Documentation-only; the check returns LOW without graph work.
    SkipLow,
    /// Security or production-config change; the final level has a floor.
    ForceEscalate { floor: RiskLevel, reason: String },
    /// Hand off to Phase 1.
    Continue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase0Result {
    pub path: String,
    pub types: Vec<ModificationType>,
    pub decision: Phase0Decision,
    /// Aggregated modification-type risk in [0, 1].
    pub type_risk: f64,
    pub security_keywords: Vec<String>,
}

pub struct PreFilter;

impl PreFilter {
    /// Classifies one changed file. Diff text is already in memory; no
    /// further I/O happens here.
    pub fn classify(file: &ChangedFile) -> Phase0Result {
        let path = file.path.as_str();
        let mut types = Vec::new();

        let extension = path.rsplit('.').next().unwrap_or("").to_lowercase();
        let is_doc_ext = DOC_EXTENSIONS.contains(&extension.as_str());
        if is_doc_ext {
            types.push(ModificationType::Documentation);
        }
        if DEPENDENCY_FILES.is_match(path) {
            types.push(ModificationType::Dependency);
        }
        if TOOLING_FILES.is_match(path) {
            types.push(ModificationType::Tooling);
        }
        let is_prod_config = PROD_CONFIG.iter().any(|re| re.is_match(path));
        if is_prod_config
            || extension == "yaml"
            || extension == "yml"
            || extension == "toml"
            || extension == "ini"
            || extension == "env"
        {
            types.push(ModificationType::Configuration);
        }
        if is_test_path(path) {
            types.push(ModificationType::Test);
        }

        let security_keywords = security_hits(path, &file.diff_text);
        let code_change = !non_comment_added_lines(&file.diff_text).is_empty();
        if !security_keywords.is_empty() && code_change {
            types.push(ModificationType::Security);
        }

        // source files with a real diff are behavioral by default
        if types.is_empty() || (code_change && !is_doc_ext && !is_test_path(path)) {
            if !types.contains(&ModificationType::Behavioral) {
                types.push(ModificationType::Behavioral);
            }
        }

        let type_risk = aggregate_type_risk(&types);
        let decision = Self::decide(path, &types, &security_keywords, is_prod_config, file);

        Phase0Result {
            path: path.to_string(),
            types,
            decision,
            type_risk,
            security_keywords,
        }
    }

    fn decide(
        path: &str,
        types: &[ModificationType],
        security_keywords: &[String],
        is_prod_config: bool,
        file: &ChangedFile,
    ) -> Phase0Decision {
        // documentation-only files (or comment-only diffs) skip analysis
        let doc_only = (types.len() == 1 && types[0] == ModificationType::Documentation)
            || (!file.diff_text.is_empty() && non_comment_added_lines(&file.diff_text).is_empty());
        if doc_only {
            return Phase0Decision::SkipLow;
        }

        if is_prod_config {
            return Phase0Decision::ForceEscalate {
                floor: RiskLevel::Critical,
                reason: format!("production configuration change: {}", path),
            };
        }

        if !security_keywords.is_empty()
            && !non_comment_added_lines(&file.diff_text).is_empty()
        {
            return Phase0Decision::ForceEscalate {
                floor: RiskLevel::High,
                reason: format!(
                    "security-sensitive change ({}): {}",
                    security_keywords.join(", "),
                    path
                ),
            };
        }

        Phase0Decision::Continue
    }
}

/// `max(type_risks) + Σ(other_types × 0.3)`, clamped to 1.0.
fn aggregate_type_risk(types: &[ModificationType]) -> f64 {
    let base = |t: &ModificationType| -> f64 {
        match t {
            ModificationType::Security => 0.9,
            ModificationType::Behavioral => 0.5,
            ModificationType::Interface => 0.5,
            ModificationType::Structural => 0.4,
            ModificationType::Dependency => 0.4,
            ModificationType::Configuration => 0.4,
            ModificationType::Performance => 0.4,
            ModificationType::Tooling => 0.2,
            ModificationType::Test => 0.1,
            ModificationType::Documentation => 0.0,
        }
    };
    let mut risks: Vec<f64> = types.iter().map(base).collect();
    risks.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let Some((max, rest)) = risks.split_first() else {
        return 0.0;
    };
    (max + rest.iter().map(|r| r * 0.3).sum::<f64>()).min(1.0)
}

fn is_test_path(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.contains("_test.")
        || name.starts_with("test_")
        || name.contains(".test.")
        || name.contains(".spec.")
        || name.ends_with("Test.java")
        || path.contains("/tests/")
        || path.contains("/__tests__/")
}

fn security_hits(path: &str, diff: &str) -> Vec<String> {
    let path_lower = path.to_lowercase();
    let added: String = non_comment_added_lines(diff).join("\n").to_lowercase();
    SECURITY_KEYWORDS
        .iter()
        .filter(|kw| {
            contains_word(&path_lower, kw) || contains_word(&added, kw)
        })
        .map(|kw| kw.to_string())
        .collect()
}

/// Keyword match on token boundaries, so "role" does not fire on
/// "controller".
fn contains_word(haystack: &str, word: &str) -> bool {
    let bytes = haystack.as_bytes();
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(word) {
        let at = start + pos;
        let before_ok = at == 0 || !bytes[at - 1].is_ascii_alphanumeric();
        let end = at + word.len();
        let after_ok = end >= bytes.len() || !bytes[end].is_ascii_alphanumeric();
        if before_ok && after_ok {
            return true;
        }
        start = at + 1;
    }
    false
}

/// Added lines from a unified diff that are not comments or blanks. An
/// empty result for a non-empty diff means a comment-only change.
fn non_comment_added_lines(diff: &str) -> Vec<&str> {
    diff.lines()
        .filter_map(|line| {
            let added = line.strip_prefix('+')?;
            if added.starts_with("++") {
                return None; // diff header
            }
            let trimmed = added.trim();
            if trimmed.is_empty()
                || trimmed.starts_with("//")
                || trimmed.starts_with('#')
                || trimmed.starts_with("/*")
                || trimmed.starts_with('*')
                || trimmed.starts_with("--")
            {
                return None;
            }
            Some(trimmed)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use coderisk_core::ChangeStatus;

    fn changed(path: &str, diff: &str) -> ChangedFile {
        ChangedFile::new(path, ChangeStatus::Modified).with_diff(diff)
    }

    #[test]
    fn docs_only_skips() {
        let file = changed("README.md", "+hello\n");
        let result = PreFilter::classify(&file);
        assert_eq!(result.decision, Phase0Decision::SkipLow);
        assert!(result.types.contains(&ModificationType::Documentation));
    }

    #[test]
    fn comment_only_diff_skips() {
        let file = changed("src/a.go", "+// one-line comment\n");
        let result = PreFilter::classify(&file);
        assert_eq!(result.decision, Phase0Decision::SkipLow);
    }

    #[test]
    fn security_diff_forces_high() {
        let file = changed("src/auth/session.py", "+def new_login(user):\n+    return ok\n");
        let result = PreFilter::classify(&file);
        match &result.decision {
            Phase0Decision::ForceEscalate { floor, .. } => {
                assert!(*floor >= RiskLevel::High)
            }
            other => panic!("expected escalation, got {:?}", other),
        }
        assert!(result.types.contains(&ModificationType::Security));
        assert!(result.security_keywords.contains(&"auth".to_string()));
    }

    #[test]
    fn security_keyword_in_comment_does_not_escalate() {
        let file = changed("src/server.go", "+// improve token docs later\n");
        let result = PreFilter::classify(&file);
        assert_eq!(result.decision, Phase0Decision::SkipLow);
    }

    #[test]
    fn production_config_forces_critical() {
        let file = changed("config/prod/database.yaml", "+pool_size: 50\n");
        let result = PreFilter::classify(&file);
        match &result.decision {
            Phase0Decision::ForceEscalate { floor, .. } => {
                assert_eq!(*floor, RiskLevel::Critical)
            }
            other => panic!("expected escalation, got {:?}", other),
        }
    }

    #[test]
    fn keyword_matching_respects_word_boundaries() {
        // "controller" must not fire the "role" keyword
        let file = changed("src/controller.ts", "+export function render() {}\n");
        let result = PreFilter::classify(&file);
        assert_eq!(result.decision, Phase0Decision::Continue);
        assert!(result.security_keywords.is_empty());
    }

    #[test]
    fn ordinary_code_continues() {
        let file = changed("src/parser.go", "+func parse(s string) error {\n+return nil\n+}\n");
        let result = PreFilter::classify(&file);
        assert_eq!(result.decision, Phase0Decision::Continue);
        assert!(result.types.contains(&ModificationType::Behavioral));
    }

    #[test]
    fn multi_type_risk_aggregates() {
        let solo = aggregate_type_risk(&[ModificationType::Behavioral]);
        let multi = aggregate_type_risk(&[
            ModificationType::Behavioral,
            ModificationType::Configuration,
        ]);
        assert!(multi > solo);
        assert!(multi <= 1.0);
        // max(0.5, 0.4) + 0.3*0.4 = 0.62
        assert!((multi - 0.62).abs() < 1e-9);
    }

    #[test]
    fn dependency_manifests_are_typed() {
        let file = changed("go.mod", "+require x v1.2.3\n");
        let result = PreFilter::classify(&file);
        assert!(result.types.contains(&ModificationType::Dependency));
    }
}
