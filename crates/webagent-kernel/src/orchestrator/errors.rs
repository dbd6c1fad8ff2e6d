use agent_core::DecisionError;
use thiserror::Error;
use webagent_core_types::{StepIndex, TaskId};

use super::state::SessionStatus;

/// Rejection or failure of one step request.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("invalid request: {detail}")]
    InvalidRequest {
        task_id: String,
        step_index: StepIndex,
        detail: String,
    },

    #[error("step {got} is out of order; expected step {expected}")]
    OutOfOrderStep {
        task_id: TaskId,
        expected: StepIndex,
        got: StepIndex,
    },

    #[error("session is closed ({status}); start a new task id")]
    SessionClosed {
        task_id: TaskId,
        step_index: StepIndex,
        status: SessionStatus,
    },

    #[error("{source}")]
    Decision {
        task_id: TaskId,
        step_index: StepIndex,
        #[source]
        source: DecisionError,
    },

    #[error("step did not finish within {timeout_ms}ms; retry the same step")]
    StepTimeout {
        task_id: TaskId,
        step_index: StepIndex,
        timeout_ms: u64,
    },

    #[error("internal error: {detail}")]
    Internal {
        task_id: TaskId,
        step_index: StepIndex,
        detail: String,
    },
}

impl StepError {
    /// Stable machine-readable tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::OutOfOrderStep { .. } => "out_of_order_step",
            Self::SessionClosed { .. } => "session_closed",
            Self::Decision { source, .. } => source.kind(),
            Self::StepTimeout { .. } => "step_timeout",
            Self::Internal { .. } => "internal",
        }
    }

    /// Whether resubmitting (possibly with a corrected index) can succeed.
    pub fn retryable(&self) -> bool {
        match self {
            Self::InvalidRequest { .. } | Self::SessionClosed { .. } => false,
            Self::OutOfOrderStep { .. } | Self::StepTimeout { .. } | Self::Internal { .. } => true,
            Self::Decision { source, .. } => {
                matches!(source, DecisionError::BackendUnavailable { .. })
            }
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            Self::InvalidRequest { task_id, .. } => task_id,
            Self::OutOfOrderStep { task_id, .. }
            | Self::SessionClosed { task_id, .. }
            | Self::Decision { task_id, .. }
            | Self::StepTimeout { task_id, .. }
            | Self::Internal { task_id, .. } => task_id.as_str(),
        }
    }

    pub fn step_index(&self) -> StepIndex {
        match self {
            Self::OutOfOrderStep { got, .. } => *got,
            Self::InvalidRequest { step_index, .. }
            | Self::SessionClosed { step_index, .. }
            | Self::Decision { step_index, .. }
            | Self::StepTimeout { step_index, .. }
            | Self::Internal { step_index, .. } => *step_index,
        }
    }

    pub fn expected_step_index(&self) -> Option<StepIndex> {
        match self {
            Self::OutOfOrderStep { expected, .. } => Some(*expected),
            _ => None,
        }
    }
}
