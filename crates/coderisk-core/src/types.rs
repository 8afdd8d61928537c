use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    Go,
    Python,
    JavaScript,
    TypeScript,
    Java,
    Other(String),
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Language::Go => "go",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Java => "java",
            Language::Other(s) => s.as_str(),
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "go" => Ok(Language::Go),
            "python" => Ok(Language::Python),
            "javascript" => Ok(Language::JavaScript),
            "typescript" => Ok(Language::TypeScript),
            "java" => Ok(Language::Java),
            other => Ok(Language::Other(other.to_string())),
        }
    }
}

/// Final risk verdict for a file or a whole check run.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    schemars::JsonSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Minimal,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn exit_code(&self) -> i32 {
        match self {
            RiskLevel::Minimal | RiskLevel::Low => 0,
            RiskLevel::Medium => 1,
            RiskLevel::High => 2,
            RiskLevel::Critical => 3,
        }
    }

    pub fn from_score(score: f64) -> Self {
        if score > 0.8 {
            RiskLevel::Critical
        } else if score > 0.6 {
            RiskLevel::High
        } else if score > 0.4 {
            RiskLevel::Medium
        } else if score > 0.2 {
            RiskLevel::Low
        } else {
            RiskLevel::Minimal
        }
    }

    pub fn blocks_commit(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Minimal => "MINIMAL",
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        };
        write!(f, "{}", s)
    }
}

/// Classification of a single Phase-1 metric against its thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskClass {
    Low,
    Medium,
    High,
    /// The metric could not be computed; treated as MEDIUM when combining.
    Unknown,
}

impl RiskClass {
    fn rank(&self) -> u8 {
        match self {
            RiskClass::Low => 0,
            RiskClass::Unknown => 1,
            RiskClass::Medium => 1,
            RiskClass::High => 2,
        }
    }

    /// Conservative combination: any HIGH wins, UNKNOWN counts as MEDIUM.
    pub fn worst_of(classes: &[RiskClass]) -> RiskClass {
        classes
            .iter()
            .copied()
            .max_by_key(|c| c.rank())
            .unwrap_or(RiskClass::Low)
    }

    pub fn to_level(&self) -> RiskLevel {
        match self {
            RiskClass::Low => RiskLevel::Low,
            RiskClass::Medium | RiskClass::Unknown => RiskLevel::Medium,
            RiskClass::High => RiskLevel::High,
        }
    }
}

impl fmt::Display for RiskClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskClass::Low => "LOW",
            RiskClass::Medium => "MEDIUM",
            RiskClass::High => "HIGH",
            RiskClass::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

/// Incident severity, highest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeLabel {
    Repository,
    File,
    Function,
    Class,
    Import,
    Commit,
    Developer,
    Incident,
}

impl NodeLabel {
    /// Which of the three graph layers the label belongs to.
    pub fn layer(&self) -> GraphLayer {
        match self {
            NodeLabel::Repository
            | NodeLabel::File
            | NodeLabel::Function
            | NodeLabel::Class
            | NodeLabel::Import => GraphLayer::Structure,
            NodeLabel::Commit | NodeLabel::Developer => GraphLayer::Temporal,
            NodeLabel::Incident => GraphLayer::Incidents,
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeLabel::Repository => "Repository",
            NodeLabel::File => "File",
            NodeLabel::Function => "Function",
            NodeLabel::Class => "Class",
            NodeLabel::Import => "Import",
            NodeLabel::Commit => "Commit",
            NodeLabel::Developer => "Developer",
            NodeLabel::Incident => "Incident",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GraphLayer {
    Structure,
    Temporal,
    Incidents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    Contains,
    Imports,
    Calls,
    Tests,
    Authored,
    Modifies,
    CoChanged,
    CausedBy,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeKind::Contains => "CONTAINS",
            EdgeKind::Imports => "IMPORTS",
            EdgeKind::Calls => "CALLS",
            EdgeKind::Tests => "TESTS",
            EdgeKind::Authored => "AUTHORED",
            EdgeKind::Modifies => "MODIFIES",
            EdgeKind::CoChanged => "CO_CHANGED",
            EdgeKind::CausedBy => "CAUSED_BY",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for EdgeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONTAINS" => Ok(EdgeKind::Contains),
            "IMPORTS" => Ok(EdgeKind::Imports),
            "CALLS" => Ok(EdgeKind::Calls),
            "TESTS" => Ok(EdgeKind::Tests),
            "AUTHORED" => Ok(EdgeKind::Authored),
            "MODIFIES" => Ok(EdgeKind::Modifies),
            "CO_CHANGED" => Ok(EdgeKind::CoChanged),
            "CAUSED_BY" => Ok(EdgeKind::CausedBy),
            other => Err(format!("unknown edge kind: {}", other)),
        }
    }
}

/// Status of a file inside a commit or the working tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeStatus::Added => "added",
            ChangeStatus::Modified => "modified",
            ChangeStatus::Deleted => "deleted",
            ChangeStatus::Renamed => "renamed",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ChangeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "added" => Ok(ChangeStatus::Added),
            "modified" => Ok(ChangeStatus::Modified),
            "deleted" => Ok(ChangeStatus::Deleted),
            "renamed" => Ok(ChangeStatus::Renamed),
            other => Err(format!("unknown change status: {}", other)),
        }
    }
}

/// A changed file as seen by the check pipeline.
///
/// `path` is git-relative; `absolute_path` is filled in once the orchestrator
/// has resolved it against the ingested clone root. Graph lookups must only
/// ever use `absolute_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangedFile {
    pub path: String,
    pub absolute_path: Option<String>,
    pub status: ChangeStatus,
    pub additions: u32,
    pub deletions: u32,
    pub diff_text: String,
}

impl ChangedFile {
    pub fn new(path: impl Into<String>, status: ChangeStatus) -> Self {
        Self {
            path: path.into(),
            absolute_path: None,
            status,
            additions: 0,
            deletions: 0,
            diff_text: String::new(),
        }
    }

    pub fn with_diff(mut self, diff_text: impl Into<String>) -> Self {
        self.diff_text = diff_text.into();
        self
    }

    pub fn lines_changed(&self) -> u32 {
        self.additions + self.deletions
    }
}

/// Phase-0 modification-type taxonomy. A file may carry several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModificationType {
    Behavioral,
    Structural,
    Dependency,
    Configuration,
    Test,
    Documentation,
    Tooling,
    Interface,
    Performance,
    Security,
}

impl fmt::Display for ModificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModificationType::Behavioral => "behavioral",
            ModificationType::Structural => "structural",
            ModificationType::Dependency => "dependency",
            ModificationType::Configuration => "configuration",
            ModificationType::Test => "test",
            ModificationType::Documentation => "documentation",
            ModificationType::Tooling => "tooling",
            ModificationType::Interface => "interface",
            ModificationType::Performance => "performance",
            ModificationType::Security => "security",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_levels_are_ordered() {
        assert!(RiskLevel::Critical > RiskLevel::High);
        assert!(RiskLevel::High > RiskLevel::Medium);
        assert!(RiskLevel::Medium > RiskLevel::Low);
        assert!(RiskLevel::Low > RiskLevel::Minimal);
    }

    #[test]
    fn worst_of_prefers_high() {
        let classes = [RiskClass::Low, RiskClass::High, RiskClass::Medium];
        assert_eq!(RiskClass::worst_of(&classes), RiskClass::High);
    }

    #[test]
    fn worst_of_unknown_degrades_to_medium() {
        let classes = [RiskClass::Low, RiskClass::Unknown];
        assert_eq!(
            RiskClass::worst_of(&classes).to_level(),
            RiskLevel::Medium
        );
    }

    #[test]
    fn score_maps_onto_levels() {
        assert_eq!(RiskLevel::from_score(0.9), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(0.7), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.5), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.3), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.1), RiskLevel::Minimal);
    }

    #[test]
    fn exit_codes_match_contract() {
        assert_eq!(RiskLevel::Low.exit_code(), 0);
        assert_eq!(RiskLevel::Medium.exit_code(), 1);
        assert_eq!(RiskLevel::High.exit_code(), 2);
        assert_eq!(RiskLevel::Critical.exit_code(), 3);
    }

    #[test]
    fn edge_kind_round_trips_through_display() {
        for kind in [
            EdgeKind::Contains,
            EdgeKind::Imports,
            EdgeKind::CoChanged,
            EdgeKind::CausedBy,
        ] {
            assert_eq!(kind.to_string().parse::<EdgeKind>().unwrap(), kind);
        }
    }
}
