//! Adaptive configuration: repository profile inference and risk-threshold
//! profiles.
//!
//! Selection is deterministic and explainable: exact language×domain match
//! first, then language-only fallback, then the default profile. The
//! reason string travels with the selection.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use coderisk_core::{Language, RiskClass};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Web,
    Backend,
    Frontend,
    Ml,
    Cli,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoProfile {
    pub primary_language: Language,
    pub domain: Domain,
    pub frameworks: Vec<String>,
}

/// Thresholds for the three Phase-1 metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub name: String,
    /// coupling: LOW <= low_max, HIGH > high_min
    pub coupling_low_max: usize,
    pub coupling_high_min: usize,
    /// co-change: MEDIUM >= medium_min, HIGH > high_min
    pub cochange_medium_min: f64,
    pub cochange_high_min: f64,
    /// test ratio: HIGH < high_below, LOW >= low_min
    pub test_ratio_high_below: f64,
    pub test_ratio_low_min: f64,
}

impl RiskConfig {
    fn new(
        name: &str,
        coupling: (usize, usize),
        cochange: (f64, f64),
        test_ratio: (f64, f64),
    ) -> Self {
        Self {
            name: name.to_string(),
            coupling_low_max: coupling.0,
            coupling_high_min: coupling.1,
            cochange_medium_min: cochange.0,
            cochange_high_min: cochange.1,
            test_ratio_high_below: test_ratio.0,
            test_ratio_low_min: test_ratio.1,
        }
    }

    pub fn default_profile() -> Self {
        Self::new("default", (5, 10), (0.3, 0.7), (0.2, 0.5))
    }

    pub fn classify_coupling(&self, raw: usize) -> RiskClass {
        if raw <= self.coupling_low_max {
            RiskClass::Low
        } else if raw > self.coupling_high_min {
            RiskClass::High
        } else {
            RiskClass::Medium
        }
    }

    pub fn classify_cochange(&self, frequency: f64) -> RiskClass {
        if frequency > self.cochange_high_min {
            RiskClass::High
        } else if frequency >= self.cochange_medium_min {
            RiskClass::Medium
        } else {
            RiskClass::Low
        }
    }

    pub fn classify_test_ratio(&self, ratio: f64) -> RiskClass {
        if ratio < self.test_ratio_high_below {
            RiskClass::High
        } else if ratio >= self.test_ratio_low_min {
            RiskClass::Low
        } else {
            RiskClass::Medium
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub config: RiskConfig,
    pub reason: String,
}

fn known_profiles() -> Vec<RiskConfig> {
    vec![
        // web apps tolerate higher coupling; templates and views import wide
        RiskConfig::new("python_web", (8, 15), (0.3, 0.7), (0.15, 0.4)),
        RiskConfig::new("python_backend", (6, 12), (0.3, 0.7), (0.2, 0.5)),
        // Go backends run stricter coupling baselines
        RiskConfig::new("go_backend", (4, 8), (0.3, 0.65), (0.25, 0.5)),
        RiskConfig::new("typescript_frontend", (8, 16), (0.35, 0.75), (0.15, 0.4)),
        RiskConfig::new("cli_tool", (5, 10), (0.3, 0.7), (0.2, 0.45)),
        RiskConfig::default_profile(),
    ]
}

/// Infers the repository profile from the language mix and the top-level
/// tree. Runs once per repo; the result is cached by the orchestrator.
pub fn infer_profile(
    languages: &HashMap<String, u64>,
    top_level_paths: &[String],
    import_samples: &[String],
) -> RepoProfile {
    let primary_language = languages
        .iter()
        .max_by_key(|(_, bytes)| **bytes)
        .map(|(name, _)| name.parse().unwrap_or(Language::Other(name.clone())))
        .unwrap_or(Language::Other("unknown".into()));

    let mut frameworks = Vec::new();
    for marker in [
        "flask", "django", "fastapi", "react", "vue", "angular", "gin", "echo", "express",
        "spring",
    ] {
        if import_samples.iter().any(|i| i.to_lowercase().contains(marker)) {
            frameworks.push(marker.to_string());
        }
    }

    let has_dir = |name: &str| {
        top_level_paths
            .iter()
            .any(|p| p == name || p.starts_with(&format!("{}/", name)))
    };

    let web_framework = frameworks
        .iter()
        .any(|f| matches!(f.as_str(), "flask" | "django" | "fastapi"));
    let frontend_framework = frameworks
        .iter()
        .any(|f| matches!(f.as_str(), "react" | "vue" | "angular"));

    let domain = if frontend_framework || has_dir("components") || has_dir("pages") {
        Domain::Frontend
    } else if web_framework || has_dir("templates") || has_dir("views") {
        Domain::Web
    } else if has_dir("cmd") && matches!(primary_language, Language::Go) {
        Domain::Cli
    } else if has_dir("models") && has_dir("notebooks") {
        Domain::Ml
    } else if has_dir("api") || has_dir("server") || has_dir("internal") || has_dir("handlers") {
        Domain::Backend
    } else if has_dir("cli") || has_dir("bin") {
        Domain::Cli
    } else {
        Domain::Other
    };

    RepoProfile {
        primary_language,
        domain,
        frameworks,
    }
}

/// Deterministic selection: exact match, language fallback, default.
pub fn select(profile: &RepoProfile) -> Selection {
    let exact = match (&profile.primary_language, profile.domain) {
        (Language::Python, Domain::Web) => Some("python_web"),
        (Language::Python, Domain::Backend) => Some("python_backend"),
        (Language::Go, Domain::Backend) => Some("go_backend"),
        (Language::Go, Domain::Cli) => Some("cli_tool"),
        (Language::TypeScript, Domain::Frontend) => Some("typescript_frontend"),
        (Language::JavaScript, Domain::Frontend) => Some("typescript_frontend"),
        (_, Domain::Cli) => Some("cli_tool"),
        _ => None,
    };

    let language_fallback = match profile.primary_language {
        Language::Python => Some("python_backend"),
        Language::Go => Some("go_backend"),
        Language::TypeScript | Language::JavaScript => Some("typescript_frontend"),
        _ => None,
    };

    let profiles = known_profiles();
    let lookup = |name: &str| profiles.iter().find(|p| p.name == name).cloned();

    if let Some(config) = exact.and_then(lookup) {
        let reason = format!(
            "matched {} × {:?} profile '{}'",
            profile.primary_language, profile.domain, config.name
        );
        return Selection { config, reason };
    }
    if let Some(config) = language_fallback.and_then(lookup) {
        let reason = format!(
            "no {:?}-domain profile for {}; language fallback '{}'",
            profile.domain, profile.primary_language, config.name
        );
        return Selection { config, reason };
    }
    Selection {
        config: RiskConfig::default_profile(),
        reason: format!(
            "no profile for {} × {:?}; using defaults",
            profile.primary_language, profile.domain
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn langs(pairs: &[(&str, u64)]) -> HashMap<String, u64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn flask_repo_selects_python_web() {
        let profile = infer_profile(
            &langs(&[("python", 10_000), ("javascript", 500)]),
            &["app".into(), "templates".into(), "tests".into()],
            &["flask".into(), "os".into()],
        );
        assert_eq!(profile.primary_language, Language::Python);
        assert_eq!(profile.domain, Domain::Web);

        let selection = select(&profile);
        assert_eq!(selection.config.name, "python_web");
        assert!(selection.reason.contains("python_web"));
    }

    #[test]
    fn go_service_selects_go_backend() {
        let profile = infer_profile(
            &langs(&[("go", 50_000)]),
            &["internal".into(), "api".into()],
            &["gin".into()],
        );
        let selection = select(&profile);
        assert_eq!(selection.config.name, "go_backend");
        // stricter than default
        assert!(selection.config.coupling_high_min < RiskConfig::default_profile().coupling_high_min);
    }

    #[test]
    fn unknown_mix_falls_back_to_default() {
        let profile = infer_profile(&langs(&[("haskell", 1_000)]), &[], &[]);
        let selection = select(&profile);
        assert_eq!(selection.config.name, "default");
        assert!(selection.reason.contains("defaults"));
    }

    #[test]
    fn selection_is_deterministic() {
        let profile = infer_profile(
            &langs(&[("typescript", 9_000)]),
            &["components".into()],
            &["react".into()],
        );
        let a = select(&profile);
        let b = select(&profile);
        assert_eq!(a.config.name, b.config.name);
        assert_eq!(a.reason, b.reason);
    }

    #[test]
    fn default_thresholds_match_contract() {
        let config = RiskConfig::default_profile();
        assert_eq!(config.classify_coupling(5), RiskClass::Low);
        assert_eq!(config.classify_coupling(6), RiskClass::Medium);
        assert_eq!(config.classify_coupling(10), RiskClass::Medium);
        assert_eq!(config.classify_coupling(11), RiskClass::High);

        assert_eq!(config.classify_cochange(0.1), RiskClass::Low);
        assert_eq!(config.classify_cochange(0.3), RiskClass::Medium);
        assert_eq!(config.classify_cochange(0.71), RiskClass::High);

        assert_eq!(config.classify_test_ratio(0.1), RiskClass::High);
        assert_eq!(config.classify_test_ratio(0.3), RiskClass::Medium);
        assert_eq!(config.classify_test_ratio(0.6), RiskClass::Low);
    }
}
