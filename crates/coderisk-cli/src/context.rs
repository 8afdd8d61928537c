//! Shared command context: configuration, stores and backends for the
//! repository the CLI was invoked in.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use coderisk_ai::{create_provider, LlmProvider};
use coderisk_core::{repo_hash, CodeRiskConfig, CodeRiskError, GraphBackendKind, Result};
use coderisk_fetch::{discover_remote_url, discover_worktree_root, repo_id_from_url};
use coderisk_graph::{GraphBackend, GraphReader, LocalGraphStore, RemoteGraphStore};
use coderisk_metrics::MetricsEngine;
use coderisk_parser::TestFileResolver;
use coderisk_staging::StagingStore;
use secrecy::SecretString;

pub struct AppContext {
    pub config: CodeRiskConfig,
    pub worktree_root: PathBuf,
    pub remote_url: String,
    pub repo_hash: String,
    pub repo_id: String,
    pub clone_root: PathBuf,
    pub staging: StagingStore,
    pub backend: Arc<dyn GraphBackend>,
    pub reader: GraphReader,
    pub engine: Arc<MetricsEngine>,
    pub llm: Option<Arc<dyn LlmProvider>>,
}

impl AppContext {
    /// Builds the context for the repository containing `start_dir` (or an
    /// explicit repo URL for `init <url>`).
    pub fn for_repo(start_dir: &Path, explicit_url: Option<&str>) -> Result<Self> {
        let worktree_root = discover_worktree_root(start_dir).unwrap_or_else(|_| start_dir.to_path_buf());
        let config = CodeRiskConfig::load(Some(&worktree_root))
            .map_err(|e| CodeRiskError::Configuration(e.to_string()))?;

        let remote_url = match explicit_url {
            Some(url) => url.to_string(),
            None => discover_remote_url(&worktree_root)
                .unwrap_or_else(|_| format!("file://{}", worktree_root.display())),
        };
        let hash = repo_hash(&remote_url);
        let repo_id = repo_id_from_url(&remote_url)
            .unwrap_or_else(|_| {
                worktree_root
                    .file_name()
                    .map(|n| format!("local/{}", n.to_string_lossy()))
                    .unwrap_or_else(|| "local/repo".to_string())
            });
        let clone_root = config.clone_root(&hash);
        debug!(repo_id, hash, clone_root = %clone_root.display(), "repository context resolved");

        let staging = StagingStore::open(&config.staging_path(&hash))?;

        let secrets = config.secret_resolver(Some(&worktree_root));
        let backend: Arc<dyn GraphBackend> = match config.graph.backend {
            GraphBackendKind::Local => Arc::new(LocalGraphStore::open(&config.graph_path(&hash))?),
            GraphBackendKind::Remote => {
                let endpoint = config.graph.remote_url.clone().ok_or_else(|| {
                    CodeRiskError::Configuration(
                        "graph.backend = remote requires graph.remote_url".into(),
                    )
                })?;
                let auth = config.graph.remote_auth_secret.as_deref().and_then(|name| {
                    secrets
                        .resolve(name)
                        .map(|secret| ("coderisk".to_string(), secret))
                });
                Arc::new(RemoteGraphStore::new(&endpoint, auth)?)
            }
        };

        let reader = GraphReader::new(backend.clone());
        let resolver = TestFileResolver::new(config.check.test_conventions.clone());
        let engine = Arc::new(MetricsEngine::new(reader.clone(), resolver));
        let llm = create_provider(&config.llm, secrets.as_ref());

        Ok(Self {
            config,
            worktree_root,
            remote_url,
            repo_hash: hash,
            repo_id,
            clone_root,
            staging,
            backend,
            reader,
            engine,
            llm,
        })
    }

    pub fn forge_token(&self) -> Option<SecretString> {
        let secrets = self.config.secret_resolver(Some(&self.worktree_root));
        secrets.resolve(&self.config.forge.token_secret)
    }
}
