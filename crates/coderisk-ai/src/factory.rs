//! Provider construction from the configuration snapshot.

use std::sync::Arc;

use tracing::{info, warn};

use coderisk_core::{LlmConfig, SecretResolver};

use crate::anthropic::AnthropicProvider;
use crate::llm_provider::LlmProvider;
use crate::openai_compatible::OpenAiCompatibleProvider;

/// Builds the configured provider, or None when the provider is "none" or
/// its key cannot be resolved. Callers treat None as "Phase 2 unavailable";
/// it is never an error.
pub fn create_provider(
    config: &LlmConfig,
    secrets: &dyn SecretResolver,
) -> Option<Arc<dyn LlmProvider>> {
    if config.provider.eq_ignore_ascii_case("none") {
        return None;
    }

    let Some(api_key) = secrets.resolve(&config.api_key_secret) else {
        warn!(
            secret = %config.api_key_secret,
            "LLM API key not resolvable; agentic investigation disabled"
        );
        return None;
    };

    let provider: Arc<dyn LlmProvider> = match config.provider.as_str() {
        "anthropic" => match AnthropicProvider::with_defaults(api_key, config.model.clone()) {
            Ok(p) => Arc::new(p),
            Err(e) => {
                warn!(error = %e, "failed to construct Anthropic provider");
                return None;
            }
        },
        "openai-compatible" | "openai" => {
            match OpenAiCompatibleProvider::with_defaults(
                api_key,
                config.model.clone(),
                config.api_base.clone(),
            ) {
                Ok(p) => Arc::new(p),
                Err(e) => {
                    warn!(error = %e, "failed to construct OpenAI-compatible provider");
                    return None;
                }
            }
        }
        other => {
            warn!(provider = other, "unknown LLM provider name");
            return None;
        }
    };

    info!(
        provider = provider.provider_name(),
        model = provider.model_name(),
        "LLM provider ready"
    );
    Some(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    struct NoSecrets;
    impl SecretResolver for NoSecrets {
        fn resolve(&self, _name: &str) -> Option<SecretString> {
            None
        }
    }

    struct OneSecret;
    impl SecretResolver for OneSecret {
        fn resolve(&self, name: &str) -> Option<SecretString> {
            (name == "ANTHROPIC_API_KEY").then(|| SecretString::from("sk-test".to_string()))
        }
    }

    #[test]
    fn missing_key_yields_none() {
        let config = LlmConfig::default();
        assert!(create_provider(&config, &NoSecrets).is_none());
    }

    #[test]
    fn provider_none_is_disabled() {
        let config = LlmConfig {
            provider: "none".into(),
            ..LlmConfig::default()
        };
        assert!(create_provider(&config, &OneSecret).is_none());
    }

    #[test]
    fn anthropic_constructs_with_key() {
        let config = LlmConfig::default();
        let provider = create_provider(&config, &OneSecret).unwrap();
        assert_eq!(provider.provider_name(), "anthropic");
    }
}
