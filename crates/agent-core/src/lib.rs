//! Agent core primitives for step-wise web automation.
//!
//! Provides the action model, prompt assembly, model-output parsing and the
//! decision engine that turns one page snapshot into one browser action.

pub mod action;
pub mod config;
pub mod decision;
pub mod errors;
pub mod llm_provider;
pub mod model;
pub mod parser;
pub mod prompt;

pub use action::{Action, ScrollDirection, Selector};
pub use config::AgentConfig;
pub use decision::{ActionDecisionEngine, Decision};
pub use errors::{AgentError, DecisionError};
pub use llm_provider::{LlmError, LlmProvider, ScriptedLlmProvider, ScriptedReply};
pub use model::{HistoryEntry, StepFailure, StepResult, Task};
pub use parser::{extract_json_object, parse_action, ParseFailure};
pub use prompt::{
    format_user_message, AssembledPrompt, Prompt, PromptAssembler, PromptContext,
    STEP_SYSTEM_PROMPT,
};
