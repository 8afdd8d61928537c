//! Provider for OpenAI-compatible chat-completions endpoints (OpenAI
//! itself, plus local gateways exposing the same surface).

use crate::llm_provider::*;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleConfig {
    pub api_key: SecretString,
    pub model: String,
    pub api_base: String,
    pub timeout_secs: u64,
}

pub struct OpenAiCompatibleProvider {
    config: OpenAiCompatibleConfig,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: OpenAiCompatibleConfig) -> Result<Self> {
        if config.api_key.expose_secret().is_empty() {
            return Err(anyhow!("API key is required"));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { config, client })
    }

    pub fn with_defaults(api_key: SecretString, model: String, api_base: Option<String>) -> Result<Self> {
        Self::new(OpenAiCompatibleConfig {
            api_key,
            model,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            timeout_secs: 120,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> LlmResult<LlmResponse> {
        let mut body = json!({
            "model": self.config.model,
            "messages": messages
                .iter()
                .map(|m| json!({"role": m.role.to_string(), "content": m.content}))
                .collect::<Vec<_>>(),
            "temperature": config.temperature,
            "max_tokens": config.max_tokens,
        });
        if let Some(stop) = &config.stop {
            body["stop"] = json!(stop);
        }
        if config.json_output {
            body["response_format"] = json!({"type": "json_object"});
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.api_base))
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!("chat completions error ({}): {}", status, error_text));
        }

        let decoded: ChatResponse = response
            .json()
            .await
            .context("Failed to decode chat response")?;
        let content = decoded
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        Ok(LlmResponse {
            content,
            total_tokens: decoded.usage.map(|u| u.total_tokens),
            model: decoded.model,
        })
    }

    async fn is_available(&self) -> bool {
        !self.config.api_key.expose_secret().is_empty()
    }

    fn provider_name(&self) -> &str {
        "openai-compatible"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatUsage {
    total_tokens: usize,
}
