pub mod agent;
pub mod anthropic;
pub mod evidence;
pub mod factory;
pub mod llm_provider;
pub mod openai_compatible;
pub mod prompts;
pub mod scripted;
pub mod synthesis;

pub use agent::{
    HopRecord, InvestigationAgent, InvestigationContext, InvestigationOutcome, StopReason,
};
pub use anthropic::{AnthropicConfig, AnthropicProvider};
pub use evidence::{Evidence, EvidenceSource};
pub use factory::create_provider;
pub use llm_provider::{GenerationConfig, LlmProvider, LlmResponse, Message, MessageRole};
pub use openai_compatible::{OpenAiCompatibleConfig, OpenAiCompatibleProvider};
pub use prompts::{parse_decision, AgentActionKind, AgentDecision};
pub use scripted::ScriptedProvider;
pub use synthesis::{Recommendation, Synthesizer, Verdict};
