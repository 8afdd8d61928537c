pub mod config;
pub mod error;
pub mod ids;
pub mod limits;
pub mod repo_hash;
pub mod secrets;
pub mod types;

pub use config::{CodeRiskConfig, GraphBackendKind, LlmConfig};
pub use error::{CodeRiskError, Result};
pub use repo_hash::{normalize_remote_url, repo_hash};
pub use secrets::{resolver_chain, SecretResolver};
pub use types::{
    ChangeStatus, ChangedFile, EdgeKind, GraphLayer, Language, ModificationType, NodeLabel,
    RiskClass, RiskLevel, Severity,
};
