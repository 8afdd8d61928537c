//! Secret resolution.
//!
//! API keys may live in the environment, in the repo-local config dir, or in
//! the user config dir. Resolvers are tried in that order and the first hit
//! wins. An OS keychain can slot into the chain as another resolver without
//! touching call sites.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use tracing::debug;

pub trait SecretResolver: Send + Sync {
    /// Returns the secret value, or None if this resolver does not hold it.
    fn resolve(&self, name: &str) -> Option<SecretString>;
}

/// Reads secrets from process environment variables.
pub struct EnvResolver;

impl SecretResolver for EnvResolver {
    fn resolve(&self, name: &str) -> Option<SecretString> {
        std::env::var(name).ok().filter(|v| !v.is_empty()).map(Into::into)
    }
}

/// Reads secrets from a `secrets.toml` file of flat `name = "value"` pairs.
pub struct TomlFileResolver {
    path: PathBuf,
}

impl TomlFileResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SecretResolver for TomlFileResolver {
    fn resolve(&self, name: &str) -> Option<SecretString> {
        let text = std::fs::read_to_string(&self.path).ok()?;
        let table: toml::Table = text.parse().ok()?;
        table
            .get(name)
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .map(|v| SecretString::from(v.to_string()))
    }
}

/// Tries each resolver in order, returning the first match.
pub struct ChainResolver {
    resolvers: Vec<Box<dyn SecretResolver>>,
}

impl ChainResolver {
    pub fn new(resolvers: Vec<Box<dyn SecretResolver>>) -> Self {
        Self { resolvers }
    }
}

impl SecretResolver for ChainResolver {
    fn resolve(&self, name: &str) -> Option<SecretString> {
        for (i, resolver) in self.resolvers.iter().enumerate() {
            if let Some(value) = resolver.resolve(name) {
                debug!(secret = name, resolver = i, "secret resolved");
                return Some(value);
            }
        }
        None
    }
}

/// The standard chain: env var > repo-local > user-local.
pub fn resolver_chain(repo_root: Option<&Path>) -> Box<dyn SecretResolver> {
    let mut resolvers: Vec<Box<dyn SecretResolver>> = vec![Box::new(EnvResolver)];
    if let Some(root) = repo_root {
        resolvers.push(Box::new(TomlFileResolver::new(
            root.join(crate::config::REPO_CONFIG_DIR).join("secrets.toml"),
        )));
    }
    if let Some(dir) = dirs::config_dir() {
        resolvers.push(Box::new(TomlFileResolver::new(
            dir.join("coderisk").join("secrets.toml"),
        )));
    }
    Box::new(ChainResolver::new(resolvers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn toml_resolver_reads_flat_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        std::fs::write(&path, "MY_KEY = \"s3cret\"\n").unwrap();

        let resolver = TomlFileResolver::new(&path);
        let value = resolver.resolve("MY_KEY").unwrap();
        assert_eq!(value.expose_secret(), "s3cret");
        assert!(resolver.resolve("OTHER").is_none());
    }

    #[test]
    fn chain_returns_first_match() {
        struct Fixed(&'static str, &'static str);
        impl SecretResolver for Fixed {
            fn resolve(&self, name: &str) -> Option<SecretString> {
                (name == self.0).then(|| SecretString::from(self.1.to_string()))
            }
        }

        let chain = ChainResolver::new(vec![
            Box::new(Fixed("A", "first")),
            Box::new(Fixed("A", "second")),
            Box::new(Fixed("B", "b")),
        ]);
        assert_eq!(chain.resolve("A").unwrap().expose_secret(), "first");
        assert_eq!(chain.resolve("B").unwrap().expose_secret(), "b");
        assert!(chain.resolve("C").is_none());
    }
}
