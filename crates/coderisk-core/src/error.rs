use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodeRiskError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Fetch failed at {stage}: {cause}")]
    Fetch { stage: String, cause: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },

    #[error("Staging store error: {0}")]
    Staging(String),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Edge endpoint missing: {0}")]
    EndpointMissing(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Metric unavailable: {0}")]
    Metric(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("LLM provider error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Cancelled")]
    Cancelled,
}

impl CodeRiskError {
    /// Whether the error leaves the current run in a usable state.
    ///
    /// Recoverable errors are recorded as diagnostics and the run proceeds
    /// with partial results; the rest abort the stage that raised them.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CodeRiskError::Parse { .. }
                | CodeRiskError::EndpointMissing(_)
                | CodeRiskError::NodeNotFound(_)
                | CodeRiskError::Metric(_)
                | CodeRiskError::Agent(_)
                | CodeRiskError::Llm(_)
                | CodeRiskError::Timeout(_)
        )
    }

    /// Tool-level errors map to exit code 10 so pre-commit hooks fail open.
    pub fn is_tool_error(&self) -> bool {
        matches!(
            self,
            CodeRiskError::Input(_)
                | CodeRiskError::Io(_)
                | CodeRiskError::Staging(_)
                | CodeRiskError::Graph(_)
                | CodeRiskError::Configuration(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CodeRiskError>;
