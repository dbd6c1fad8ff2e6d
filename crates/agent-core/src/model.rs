use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use webagent_core_types::{StepIndex, TaskId, WebProjectId};

use crate::action::Action;

/// Goal the agent works on across every step of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub prompt: String,
    #[serde(default)]
    pub web_project_id: WebProjectId,
}

impl Task {
    pub fn new(task_id: TaskId, prompt: impl Into<String>) -> Self {
        Self {
            task_id,
            prompt: prompt.into(),
            web_project_id: WebProjectId::default(),
        }
    }

    pub fn with_project(mut self, project: WebProjectId) -> Self {
        self.web_project_id = project;
        self
    }
}

/// Error recorded against a step that produced no usable action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub kind: String,
    pub detail: String,
}

/// Outcome of one accepted step. Appended to session history and never
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub task_id: TaskId,
    pub step_index: StepIndex,
    /// Absent only when the decision stage could not produce an action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    /// Human-readable summary shown in later prompts.
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepFailure>,
    pub recorded_at: DateTime<Utc>,
}

impl StepResult {
    pub fn with_action(
        task_id: TaskId,
        step_index: StepIndex,
        action: Action,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            task_id,
            step_index,
            action: Some(action),
            summary: summary.into(),
            error: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_error(task_id: TaskId, step_index: StepIndex, error: StepFailure) -> Self {
        Self {
            task_id,
            step_index,
            action: None,
            summary: format!("no action ({})", error.kind),
            error: Some(error),
            recorded_at: Utc::now(),
        }
    }

    /// Attach a failure to a step that still carries a best-effort action.
    pub fn and_error(mut self, error: StepFailure) -> Self {
        self.error = Some(error);
        self
    }

    /// Prompt view of this step, optionally carrying the executor's report.
    pub fn to_history_entry(&self, outcome: Option<String>) -> HistoryEntry {
        let outcome = outcome.or_else(|| {
            self.error
                .as_ref()
                .map(|err| format!("error: {}", err.detail))
        });
        HistoryEntry {
            step_index: self.step_index,
            summary: self.summary.clone(),
            outcome,
        }
    }
}

/// History line rendered into prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub step_index: StepIndex,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

impl HistoryEntry {
    pub fn render(&self) -> String {
        match &self.outcome {
            Some(outcome) if !outcome.trim().is_empty() => format!(
                "Step {}: {}\n  Result: {}",
                self.step_index,
                self.summary,
                outcome.trim()
            ),
            _ => format!("Step {}: {}", self.step_index, self.summary),
        }
    }
}
