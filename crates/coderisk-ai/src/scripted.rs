//! A provider that replays canned responses. Used by tests and by the
//! offline demo mode; never talks to the network.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::llm_provider::{GenerationConfig, LlmProvider, LlmResponse, LlmResult, Message};

pub struct ScriptedProvider {
    responses: Mutex<Vec<String>>,
    fail: bool,
}

impl ScriptedProvider {
    /// Replays `responses` in order; repeats the last one when exhausted.
    pub fn new(responses: Vec<String>) -> Self {
        let mut responses = responses;
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
            fail: false,
        }
    }

    /// A provider whose every call errors, for LLM-unavailable paths.
    pub fn failing() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            fail: true,
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn generate_chat(
        &self,
        _messages: &[Message],
        _config: &GenerationConfig,
    ) -> LlmResult<LlmResponse> {
        if self.fail {
            anyhow::bail!("scripted provider configured to fail");
        }
        let mut responses = self.responses.lock();
        let content = if responses.len() > 1 {
            responses.pop().unwrap_or_default()
        } else {
            responses.last().cloned().unwrap_or_default()
        };
        Ok(LlmResponse {
            content,
            total_tokens: Some(64),
            model: "scripted".into(),
        })
    }

    async fn is_available(&self) -> bool {
        !self.fail
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
