//! Layered configuration.
//!
//! Settings are assembled once at process start from the precedence chain
//! env var > repo-local file > user-local file > built-in default, then
//! frozen into an immutable snapshot. Nothing re-reads configuration after
//! startup.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config as cfg;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::secrets::{resolver_chain, SecretResolver};

pub const REPO_CONFIG_DIR: &str = ".coderisk";
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ForgeConfig {
    /// REST API base, e.g. "https://api.github.com".
    pub api_base: String,
    /// Requests/hour quota for the token bucket.
    pub requests_per_hour: u32,
    /// Name of the secret holding the API token.
    #[serde(default = "ForgeConfig::default_token_secret")]
    pub token_secret: String,
}

impl ForgeConfig {
    fn default_token_secret() -> String {
        "GITHUB_TOKEN".to_string()
    }
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".into(),
            requests_per_hour: crate::limits::FORGE_REQUESTS_PER_HOUR,
            token_secret: Self::default_token_secret(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GraphBackendKind {
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GraphConfig {
    #[serde(default)]
    pub backend: GraphBackendKind,
    /// Local store path, relative to the data dir unless absolute.
    pub path: String,
    /// Endpoint for the managed backend (Remote only).
    #[serde(default)]
    pub remote_url: Option<String>,
    /// Name of the secret holding remote credentials.
    #[serde(default)]
    pub remote_auth_secret: Option<String>,
}

impl Default for GraphBackendKind {
    fn default() -> Self {
        Self::Local
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: GraphBackendKind::Local,
            path: "graph".into(),
            remote_url: None,
            remote_auth_secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LlmConfig {
    /// "anthropic", "openai-compatible" or "none".
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub api_base: Option<String>,
    /// Name of the secret holding the provider API key.
    pub api_key_secret: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".into(),
            model: "claude-3-5-sonnet-20241022".into(),
            api_base: None,
            api_key_secret: "ANTHROPIC_API_KEY".into(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CheckConfig {
    /// Force a specific risk profile instead of inferring one.
    #[serde(default)]
    pub profile: Option<String>,
    /// Extra test-file conventions per language, e.g.
    /// `python = ["tests/test_{stem}.py"]`. Merged over the built-ins.
    #[serde(default)]
    pub test_conventions: std::collections::HashMap<String, Vec<String>>,
}

/// Immutable configuration snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CodeRiskConfig {
    /// Root for ingested clones and local stores.
    pub data_dir: PathBuf,
    #[serde(default)]
    pub forge: ForgeConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub check: CheckConfig,
}

impl Default for CodeRiskConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            forge: ForgeConfig::default(),
            graph: GraphConfig::default(),
            llm: LlmConfig::default(),
            check: CheckConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("coderisk")
}

pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("coderisk").join(CONFIG_FILE_NAME))
}

pub fn repo_config_path(repo_root: &Path) -> PathBuf {
    repo_root.join(REPO_CONFIG_DIR).join(CONFIG_FILE_NAME)
}

impl CodeRiskConfig {
    /// Load the snapshot for a repository rooted at `repo_root`.
    ///
    /// Later sources win: defaults, then the user file, then the repo file,
    /// then `CODERISK_*` environment variables (`__` as section separator,
    /// e.g. `CODERISK_LLM__MODEL`).
    pub fn load(repo_root: Option<&Path>) -> Result<Self> {
        let mut builder = cfg::Config::builder().add_source(cfg::Config::try_from(
            &CodeRiskConfig::default(),
        )?);

        if let Some(path) = user_config_path() {
            if path.exists() {
                builder = builder.add_source(cfg::File::from(path).format(cfg::FileFormat::Toml));
            }
        }
        if let Some(root) = repo_root {
            let path = repo_config_path(root);
            if path.exists() {
                builder = builder.add_source(cfg::File::from(path).format(cfg::FileFormat::Toml));
            }
        }
        builder = builder.add_source(
            cfg::Environment::with_prefix("CODERISK")
                .separator("__")
                .try_parsing(true),
        );

        let snapshot: CodeRiskConfig = builder
            .build()
            .context("failed to assemble configuration")?
            .try_deserialize()
            .context("invalid configuration")?;
        Ok(snapshot)
    }

    /// Directory holding the ingested clone for `repo_hash`.
    pub fn clone_root(&self, repo_hash: &str) -> PathBuf {
        self.data_dir.join("repos").join(repo_hash)
    }

    /// Path of the staging database for `repo_hash`.
    pub fn staging_path(&self, repo_hash: &str) -> PathBuf {
        self.data_dir.join("staging").join(format!("{}.db", repo_hash))
    }

    /// Path of the local graph store for `repo_hash`.
    pub fn graph_path(&self, repo_hash: &str) -> PathBuf {
        let base = PathBuf::from(&self.graph.path);
        let base = if base.is_absolute() {
            base
        } else {
            self.data_dir.join(base)
        };
        base.join(repo_hash)
    }

    /// Secret resolver honoring the same precedence as settings.
    pub fn secret_resolver(&self, repo_root: Option<&Path>) -> Box<dyn SecretResolver> {
        resolver_chain(repo_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let c = CodeRiskConfig::default();
        assert_eq!(c.forge.api_base, "https://api.github.com");
        assert_eq!(c.llm.provider, "anthropic");
        assert!(matches!(c.graph.backend, GraphBackendKind::Local));
    }

    #[test]
    fn derived_paths_hang_off_data_dir() {
        let mut c = CodeRiskConfig::default();
        c.data_dir = PathBuf::from("/tmp/cr");
        assert_eq!(
            c.clone_root("ab12cd34ef56ab78"),
            PathBuf::from("/tmp/cr/repos/ab12cd34ef56ab78")
        );
        assert_eq!(
            c.staging_path("ab12cd34ef56ab78"),
            PathBuf::from("/tmp/cr/staging/ab12cd34ef56ab78.db")
        );
    }

    #[test]
    fn repo_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_dir = dir.path().join(REPO_CONFIG_DIR);
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join(CONFIG_FILE_NAME),
            "[llm]\nprovider = \"openai-compatible\"\nmodel = \"gpt-4o-mini\"\napi_key_secret = \"OPENAI_API_KEY\"\ntimeout_secs = 60\n",
        )
        .unwrap();

        let c = CodeRiskConfig::load(Some(dir.path())).unwrap();
        assert_eq!(c.llm.provider, "openai-compatible");
        assert_eq!(c.llm.model, "gpt-4o-mini");
        // untouched sections keep their defaults
        assert_eq!(c.forge.requests_per_hour, 5_000);
    }
}
