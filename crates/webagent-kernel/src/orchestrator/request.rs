use std::collections::BTreeMap;

use agent_core::{Action, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use webagent_core_types::{StepIndex, TaskId, WebProjectId};

use super::state::SessionStatus;

/// Longest executor report carried into prompts.
const MAX_OUTCOME_CHARS: usize = 200;

pub const WARN_REDUCTION_DEGENERATE: &str = "reduction_degenerate";
pub const WARN_PROMPT_OVER_BUDGET: &str = "prompt_over_budget";
pub const WARN_STEP_LIMIT_REACHED: &str = "step_limit_reached";

/// One step as submitted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRequest {
    pub task_id: String,
    pub step_index: StepIndex,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub start_url: String,
    #[serde(default)]
    pub snapshot_html: String,
    #[serde(default)]
    pub web_project_id: WebProjectId,
    /// Caller's view of earlier steps. Only executor reports are used.
    #[serde(default)]
    pub history: Vec<Value>,
}

impl StepRequest {
    pub fn new(task_id: impl Into<String>, step_index: StepIndex) -> Self {
        Self {
            task_id: task_id.into(),
            step_index,
            prompt: String::new(),
            start_url: String::new(),
            snapshot_html: String::new(),
            web_project_id: WebProjectId::default(),
            history: Vec::new(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.start_url = url.into();
        self
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.snapshot_html = html.into();
        self
    }

    pub fn with_project(mut self, project: impl Into<WebProjectId>) -> Self {
        self.web_project_id = project.into();
        self
    }

    pub fn with_history(mut self, history: Vec<Value>) -> Self {
        self.history = history;
        self
    }

    /// Executor reports keyed by the step they describe.
    ///
    /// Entries without an explicit `step_index` (or `step`) are matched by
    /// position.
    pub fn caller_outcomes(&self) -> BTreeMap<StepIndex, String> {
        let mut outcomes = BTreeMap::new();
        for (position, entry) in self.history.iter().enumerate() {
            let Value::Object(map) = entry else {
                continue;
            };
            let index = ["step_index", "step"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_u64))
                .or_else(|| u64::try_from(position).ok())
                .and_then(|idx| StepIndex::try_from(idx).ok());
            let Some(index) = index else {
                continue;
            };
            if let Some(outcome) = outcome_text(map) {
                outcomes.insert(index, outcome);
            }
        }
        outcomes
    }
}

fn outcome_text(map: &serde_json::Map<String, Value>) -> Option<String> {
    let text = ["outcome", "result", "error"]
        .iter()
        .find_map(|key| match map.get(*key) {
            Some(Value::String(value)) if !value.trim().is_empty() => {
                Some(value.trim().to_string())
            }
            Some(Value::Null) | None => None,
            Some(Value::String(_)) => None,
            Some(other) => Some(other.to_string()),
        })
        .or_else(|| {
            map.get("success").and_then(Value::as_bool).map(|ok| {
                if ok {
                    "succeeded".to_string()
                } else {
                    "failed".to_string()
                }
            })
        })?;
    if text.chars().count() > MAX_OUTCOME_CHARS {
        let cut: String = text.chars().take(MAX_OUTCOME_CHARS).collect();
        Some(format!("{cut}..."))
    } else {
        Some(text)
    }
}

/// Accepted step returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,
    pub task_id: TaskId,
    pub step_index: StepIndex,
    /// Session status after this step.
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl StepOutcome {
    pub fn has_warning(&self, warning: &str) -> bool {
        self.warnings.iter().any(|w| w == warning)
    }
}
