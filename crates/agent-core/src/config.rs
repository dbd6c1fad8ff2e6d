//! Configuration for the step pipeline.

use std::time::Duration;

use perceiver_structural::HtmlReducer;
use serde::{Deserialize, Serialize};

use crate::errors::AgentError;

/// Deepest DOM traversal accepted by [`AgentConfig::validate`].
const MAX_DOM_DEPTH_LIMIT: u32 = 512;

/// Tunables shared by the reducer, the prompt assembler, the decision engine
/// and the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Steps a task may take before the session is aborted.
    /// Default: 100
    pub max_steps: u32,

    /// Maximum number of elements kept per reduced page.
    /// Default: 300
    pub max_elements: u32,

    /// Maximum text length per element.
    /// Default: 100
    pub max_element_text_length: u32,

    /// Maximum depth of DOM tree to traverse.
    /// Default: 50
    pub max_dom_depth: u32,

    /// Whether to include element attributes in the reduced page.
    /// Default: true
    pub include_element_attributes: bool,

    /// Prompt size budget in characters (system + user message).
    /// Default: 48000
    pub prompt_budget_chars: usize,

    /// Most history entries ever rendered into a prompt.
    /// Default: 10
    pub history_limit: usize,

    /// Extra model calls after the first when output is rejected or the
    /// backend fails.
    /// Default: 2
    pub max_decision_retries: u32,

    /// Timeout for a single model call in milliseconds.
    /// Default: 60000
    pub llm_timeout_ms: u64,

    /// Timeout for a whole step (reduce, assemble, decide) in milliseconds.
    /// Default: 200000
    pub step_timeout_ms: u64,

    /// Seconds a terminal session is kept for inspection before eviction.
    /// Default: 300
    pub session_grace_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            max_elements: 300,
            max_element_text_length: 100,
            max_dom_depth: 50,
            include_element_attributes: true,
            prompt_budget_chars: 48_000,
            history_limit: 10,
            max_decision_retries: 2,
            llm_timeout_ms: 60_000,
            step_timeout_ms: 200_000,
            session_grace_secs: 300,
        }
    }
}

impl AgentConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a minimal config for testing.
    pub fn minimal() -> Self {
        Self {
            max_steps: 10,
            max_elements: 50,
            max_element_text_length: 50,
            max_dom_depth: 20,
            include_element_attributes: false,
            prompt_budget_chars: 8_000,
            history_limit: 5,
            max_decision_retries: 1,
            llm_timeout_ms: 1_000,
            step_timeout_ms: 5_000,
            session_grace_secs: 5,
        }
    }

    /// Create a config optimized for fast execution.
    pub fn fast() -> Self {
        Self {
            max_steps: 50,
            max_elements: 150,
            max_element_text_length: 80,
            max_dom_depth: 30,
            include_element_attributes: true,
            prompt_budget_chars: 24_000,
            history_limit: 6,
            max_decision_retries: 1,
            llm_timeout_ms: 20_000,
            step_timeout_ms: 60_000,
            session_grace_secs: 120,
        }
    }

    /// Builder: set max steps.
    pub fn max_steps(mut self, steps: u32) -> Self {
        self.max_steps = steps;
        self
    }

    /// Builder: set max elements.
    pub fn elements(mut self, count: u32) -> Self {
        self.max_elements = count;
        self
    }

    /// Builder: set the prompt budget.
    pub fn prompt_budget(mut self, chars: usize) -> Self {
        self.prompt_budget_chars = chars;
        self
    }

    /// Builder: set decision retries.
    pub fn retries(mut self, retries: u32) -> Self {
        self.max_decision_retries = retries;
        self
    }

    /// Builder: set LLM timeout.
    pub fn llm_timeout(mut self, ms: u64) -> Self {
        self.llm_timeout_ms = ms;
        self
    }

    /// Builder: set step timeout.
    pub fn step_timeout(mut self, ms: u64) -> Self {
        self.step_timeout_ms = ms;
        self
    }

    pub fn llm_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.llm_timeout_ms)
    }

    pub fn step_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn session_grace(&self) -> Duration {
        Duration::from_secs(self.session_grace_secs)
    }

    /// Reducer configured from these settings.
    pub fn reducer(&self) -> HtmlReducer {
        HtmlReducer::new()
            .with_max_depth(self.max_dom_depth)
            .with_max_text_length(self.max_element_text_length)
            .with_attributes(self.include_element_attributes)
    }

    /// Reject settings that cannot work together.
    ///
    /// Every model attempt must fit inside the step timeout, otherwise a step
    /// could be cancelled while a retry is still in flight.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.max_steps == 0 {
            return Err(AgentError::invalid_config("max_steps must be at least 1"));
        }
        if self.llm_timeout_ms == 0 || self.step_timeout_ms == 0 {
            return Err(AgentError::invalid_config("timeouts must be positive"));
        }
        if self.max_dom_depth == 0 || self.max_dom_depth > MAX_DOM_DEPTH_LIMIT {
            return Err(AgentError::invalid_config(format!(
                "max_dom_depth must be within 1..={MAX_DOM_DEPTH_LIMIT}"
            )));
        }
        let worst_case = self
            .llm_timeout_ms
            .saturating_mul(u64::from(self.max_decision_retries) + 1);
        if worst_case >= self.step_timeout_ms {
            return Err(AgentError::invalid_config(format!(
                "llm_timeout_ms ({}) x attempts ({}) = {}ms must stay below step_timeout_ms ({})",
                self.llm_timeout_ms,
                self.max_decision_retries + 1,
                worst_case,
                self.step_timeout_ms
            )));
        }
        Ok(())
    }
}
