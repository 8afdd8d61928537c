pub mod engine;
pub mod phase0;
pub mod profiles;
pub mod tier2;

pub use engine::{content_hash, FileMetrics, MetricValue, MetricsEngine};
pub use phase0::{Phase0Decision, Phase0Result, PreFilter};
pub use profiles::{infer_profile, select, Domain, RepoProfile, RiskConfig, Selection};
pub use tier2::{incident_similarity, ownership_churn, IncidentSimilarity, OwnershipChurn};
