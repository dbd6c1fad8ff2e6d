//! Turning an assembled prompt into exactly one validated action.

use std::sync::Arc;
use std::time::Duration;

use perceiver_structural::ReducedPage;
use tracing::{debug, warn};

use crate::action::Action;
use crate::errors::DecisionError;
use crate::llm_provider::LlmProvider;
use crate::parser::parse_action;
use crate::prompt::Prompt;

/// Accepted decision together with how much it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: Action,
    /// Model calls made, including the accepted one.
    pub attempts: u32,
    /// Reasons earlier attempts were rejected, oldest first.
    pub rejected: Vec<String>,
}

/// Why a single attempt did not yield an action.
#[derive(Debug, Clone)]
enum AttemptFailure {
    Output(String),
    Backend(String),
}

/// Calls the model, validates its answer, and retries within a fixed budget.
#[derive(Clone)]
pub struct ActionDecisionEngine {
    provider: Arc<dyn LlmProvider>,
    max_retries: u32,
    llm_timeout: Duration,
}

impl std::fmt::Debug for ActionDecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDecisionEngine")
            .field("provider", &self.provider.name())
            .field("max_retries", &self.max_retries)
            .field("llm_timeout", &self.llm_timeout)
            .finish()
    }
}

impl ActionDecisionEngine {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            max_retries: 2,
            llm_timeout: Duration::from_secs(60),
        }
    }

    /// Extra attempts after the first one.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_llm_timeout(mut self, timeout: Duration) -> Self {
        self.llm_timeout = timeout;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Obtain one action valid for `page`.
    ///
    /// Malformed output and unknown addresses are retried with a note about
    /// the rejection; backend faults are retried with the original prompt.
    /// Once attempts run out, the class of the last failure decides between
    /// [`DecisionError::Unparseable`] and [`DecisionError::BackendUnavailable`].
    pub async fn decide(
        &self,
        prompt: &Prompt,
        page: &ReducedPage,
    ) -> Result<Decision, DecisionError> {
        let max_attempts = self.max_attempts();
        let mut rejected = Vec::new();
        let mut retry_note: Option<String> = None;
        let mut last_failure = AttemptFailure::Backend("no attempt made".to_string());

        for attempt in 1..=max_attempts {
            let attempt_prompt = match &retry_note {
                Some(note) => prompt.with_retry_note(note),
                None => prompt.clone(),
            };

            let failure = match tokio::time::timeout(
                self.llm_timeout,
                self.provider.complete(&attempt_prompt),
            )
            .await
            {
                Err(_) => AttemptFailure::Backend(format!(
                    "model call timed out after {}ms",
                    self.llm_timeout.as_millis()
                )),
                Ok(Err(err)) if err.is_backend_fault() => AttemptFailure::Backend(err.to_string()),
                Ok(Err(err)) => {
                    retry_note = Some("Your previous answer was empty.".to_string());
                    AttemptFailure::Output(err.to_string())
                }
                Ok(Ok(raw)) => match parse_action(&raw, page) {
                    Ok(action) => {
                        debug!(
                            target: "decision",
                            provider = self.provider.name(),
                            attempt,
                            action = action.kind(),
                            "model action accepted"
                        );
                        return Ok(Decision {
                            action,
                            attempts: attempt,
                            rejected,
                        });
                    }
                    Err(failure) => {
                        retry_note = Some(format!(
                            "Your previous answer was rejected: {failure}."
                        ));
                        AttemptFailure::Output(failure.to_string())
                    }
                },
            };

            let reason = match &failure {
                AttemptFailure::Output(reason) | AttemptFailure::Backend(reason) => reason.clone(),
            };
            warn!(
                target: "decision",
                provider = self.provider.name(),
                attempt,
                max_attempts,
                reason = %reason,
                "model attempt rejected"
            );
            rejected.push(reason);
            last_failure = failure;
        }

        Err(match last_failure {
            AttemptFailure::Output(reason) => DecisionError::Unparseable {
                attempts: max_attempts,
                reason,
            },
            AttemptFailure::Backend(reason) => DecisionError::BackendUnavailable {
                attempts: max_attempts,
                reason,
            },
        })
    }
}
