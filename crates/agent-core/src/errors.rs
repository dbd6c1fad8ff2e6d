use thiserror::Error;

/// Errors emitted by the agent-core crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// Raised when a step request is malformed or missing required fields.
    #[error("invalid agent request: {0}")]
    InvalidRequest(String),

    /// Raised when configuration values contradict each other.
    #[error("invalid agent configuration: {0}")]
    InvalidConfig(String),
}

impl AgentError {
    /// Helper for wrapping static string errors.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Helper for configuration validation failures.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Terminal outcome of a decision that produced no action.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecisionError {
    /// The model kept answering with output that is not a valid action.
    #[error("model output unparseable after {attempts} attempt(s): {reason}")]
    Unparseable { attempts: u32, reason: String },

    /// The model backend kept failing (timeouts, rate limits, transport).
    #[error("model backend unavailable after {attempts} attempt(s): {reason}")]
    BackendUnavailable { attempts: u32, reason: String },
}

impl DecisionError {
    /// Stable machine-readable tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unparseable { .. } => "unparseable",
            Self::BackendUnavailable { .. } => "backend_unavailable",
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Unparseable { attempts, .. } | Self::BackendUnavailable { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Unparseable { reason, .. } | Self::BackendUnavailable { reason, .. } => reason,
        }
    }
}
