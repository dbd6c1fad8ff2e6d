use std::collections::BTreeMap;
use std::fmt;

use agent_core::{HistoryEntry, StepResult, Task};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use webagent_core_types::StepIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Done,
    Failed,
    Aborted,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend fault seen while the session stayed active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransientFailure {
    pub step_index: StepIndex,
    pub kind: String,
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// Per-task state owned by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub task: Task,
    pub expected_step_index: StepIndex,
    /// Append-only.
    pub history: Vec<StepResult>,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transient_failures: Vec<TransientFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new(task: Task) -> Self {
        let now = Utc::now();
        Self {
            task,
            expected_step_index: 0,
            history: Vec::new(),
            status: SessionStatus::Active,
            transient_failures: Vec::new(),
            abort_reason: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
        }
    }

    /// Placeholder for a task aborted before its first step arrived.
    pub fn aborted_tombstone(task: Task, reason: impl Into<String>) -> Self {
        let mut state = Self::new(task);
        state.abort(reason);
        state
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Append the result of the expected step and advance to the next index.
    pub(crate) fn record(&mut self, result: StepResult) {
        debug_assert_eq!(result.step_index, self.expected_step_index);
        self.expected_step_index = result.step_index + 1;
        self.history.push(result);
        self.updated_at = Utc::now();
    }

    pub(crate) fn record_transient(&mut self, step_index: StepIndex, kind: &str, detail: String) {
        let now = Utc::now();
        self.transient_failures.push(TransientFailure {
            step_index,
            kind: kind.to_string(),
            detail,
            at: now,
        });
        self.updated_at = now;
    }

    pub(crate) fn close(&mut self, status: SessionStatus) {
        let now = Utc::now();
        self.status = status;
        self.updated_at = now;
        if self.closed_at.is_none() {
            self.closed_at = Some(now);
        }
    }

    pub(crate) fn abort(&mut self, reason: impl Into<String>) {
        self.abort_reason = Some(reason.into());
        self.close(SessionStatus::Aborted);
    }

    /// Prompt history, oldest first, with executor reports merged by step.
    pub fn history_entries(&self, outcomes: &BTreeMap<StepIndex, String>) -> Vec<HistoryEntry> {
        self.history
            .iter()
            .map(|result| result.to_history_entry(outcomes.get(&result.step_index).cloned()))
            .collect()
    }

    /// Whether a terminal session has outlived `grace` at `now`.
    pub fn expired(&self, grace: chrono::Duration, now: DateTime<Utc>) -> bool {
        match self.closed_at {
            Some(closed) if self.is_terminal() => closed + grace <= now,
            _ => false,
        }
    }
}
