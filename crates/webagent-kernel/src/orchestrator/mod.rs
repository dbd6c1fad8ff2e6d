//! Per-task step state machine.
//!
//! A session starts at step 0, accepts exactly the expected step index, and
//! ends in `done`, `failed` or `aborted`. Every step holds the task's slot lock
//! from validation to commit; the pipeline itself never touches the session,
//! so a cancelled or timed-out step leaves it unchanged.

mod errors;
mod request;
mod state;
mod store;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use agent_core::{
    Action, ActionDecisionEngine, AgentConfig, AssembledPrompt, Decision, DecisionError,
    HistoryEntry, LlmProvider, PromptAssembler, PromptContext, StepFailure, StepResult, Task,
};
use chrono::Utc;
use perceiver_structural::HtmlReducer;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, instrument, warn};
use webagent_core_types::TaskId;

use crate::metrics;

pub use errors::StepError;
pub use request::{
    StepOutcome, StepRequest, WARN_PROMPT_OVER_BUDGET, WARN_REDUCTION_DEGENERATE,
    WARN_STEP_LIMIT_REACHED,
};
pub use state::{SessionState, SessionStatus, TransientFailure};
pub use store::{InMemorySessionStore, SessionSlot, SessionStore};

pub const STEP_LIMIT_REASON: &str = "step limit reached";
pub const DEFAULT_ABORT_REASON: &str = "aborted by caller";

struct PipelineOutput {
    assembled: AssembledPrompt,
    degenerate: bool,
    decision: Result<Decision, DecisionError>,
}

/// Drives sessions step by step: reduce, assemble, decide, commit.
pub struct StepOrchestrator {
    store: Arc<dyn SessionStore>,
    engine: ActionDecisionEngine,
    assembler: PromptAssembler,
    reducer: HtmlReducer,
    config: AgentConfig,
    project_hints: BTreeMap<String, String>,
}

impl StepOrchestrator {
    pub fn new(config: AgentConfig, provider: Arc<dyn LlmProvider>) -> Self {
        let reducer = config.reducer();
        let engine = ActionDecisionEngine::new(provider)
            .with_max_retries(config.max_decision_retries)
            .with_llm_timeout(config.llm_timeout_duration());
        let assembler = PromptAssembler::new().with_history_limit(config.history_limit);
        Self {
            store: Arc::new(InMemorySessionStore::new()),
            engine,
            assembler,
            reducer,
            config,
            project_hints: BTreeMap::new(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_project_hints(mut self, hints: BTreeMap<String, String>) -> Self {
        self.project_hints = hints;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn session_count(&self) -> usize {
        self.store.len()
    }

    /// Process one step request.
    #[instrument(
        name = "webagent.step",
        skip(self, request),
        fields(task_id = %request.task_id, step_index = request.step_index)
    )]
    pub async fn step(&self, request: StepRequest) -> Result<StepOutcome, StepError> {
        let started = Instant::now();
        let result = self.run_step(request).await;
        let label = match &result {
            Ok(outcome) if outcome.action.is_done() => "done",
            Ok(_) => "action",
            Err(err) => err.kind(),
        };
        metrics::record_step(label, started.elapsed());
        metrics::set_active_sessions(self.store.len());
        result
    }

    async fn run_step(&self, request: StepRequest) -> Result<StepOutcome, StepError> {
        let step_index = request.step_index;
        let task_id =
            TaskId::parse(request.task_id.clone()).map_err(|err| StepError::InvalidRequest {
                task_id: request.task_id.clone(),
                step_index,
                detail: err.to_string(),
            })?;

        let slot = self.store.slot(&task_id);
        let mut guard = slot.lock_owned().await;

        let (task, history) = match guard.as_ref() {
            None if step_index != 0 => {
                return Err(StepError::OutOfOrderStep {
                    task_id,
                    expected: 0,
                    got: step_index,
                });
            }
            None => {
                let task = Task::new(task_id.clone(), request.prompt.clone())
                    .with_project(request.web_project_id.clone());
                (task, Vec::new())
            }
            Some(state) if state.is_terminal() => {
                return Err(StepError::SessionClosed {
                    task_id,
                    step_index,
                    status: state.status,
                });
            }
            Some(state) if state.expected_step_index != step_index => {
                return Err(StepError::OutOfOrderStep {
                    task_id,
                    expected: state.expected_step_index,
                    got: step_index,
                });
            }
            Some(state) => (
                state.task.clone(),
                state.history_entries(&request.caller_outcomes()),
            ),
        };

        let step_timeout = self.config.step_timeout_duration();
        let output =
            match tokio::time::timeout(step_timeout, self.run_pipeline(&task, &request, history))
                .await
            {
                Ok(Ok(output)) => output,
                Ok(Err(err)) => {
                    warn!(error = %err, "prompt preparation failed; session left unchanged");
                    return Err(StepError::Internal {
                        task_id,
                        step_index,
                        detail: format!("Task join error: {}", err),
                    });
                }
                Err(_) => {
                    warn!(
                        timeout_ms = self.config.step_timeout_ms,
                        "step timed out; session left unchanged"
                    );
                    return Err(StepError::StepTimeout {
                        task_id,
                        step_index,
                        timeout_ms: self.config.step_timeout_ms,
                    });
                }
            };

        let mut warnings = Vec::new();
        if output.degenerate {
            warnings.push(WARN_REDUCTION_DEGENERATE.to_string());
        }
        if output.assembled.over_budget {
            warnings.push(WARN_PROMPT_OVER_BUDGET.to_string());
        }
        let page = output.assembled.page;
        let state = guard.get_or_insert_with(|| SessionState::new(task));

        match output.decision {
            Ok(decision) => {
                metrics::record_decision_attempts(1, decision.attempts.saturating_sub(1));
                let selector = decision.action.selector(&page);
                let summary = decision.action.describe(Some(&page));
                let action = decision.action;
                state.record(StepResult::with_action(
                    task_id.clone(),
                    step_index,
                    action.clone(),
                    summary,
                ));
                if action.is_done() {
                    state.close(SessionStatus::Done);
                    info!(steps = state.history.len(), "task marked done");
                } else {
                    self.enforce_step_limit(state, &mut warnings);
                }
                Ok(StepOutcome {
                    action,
                    selector,
                    task_id,
                    step_index,
                    status: state.status,
                    warnings,
                })
            }
            Err(err @ DecisionError::Unparseable { .. }) if output.degenerate => {
                metrics::record_decision_attempts(0, err.attempts());
                let action = Action::Fail {
                    reason: format!("page has no usable elements ({})", err.reason()),
                };
                let failure = StepFailure {
                    kind: err.kind().to_string(),
                    detail: err.to_string(),
                };
                state.record(
                    StepResult::with_action(
                        task_id.clone(),
                        step_index,
                        action.clone(),
                        action.describe(None),
                    )
                    .and_error(failure),
                );
                self.enforce_step_limit(state, &mut warnings);
                warn!(error = %err, "no decision on degenerate page; returning fail action");
                Ok(StepOutcome {
                    action,
                    selector: None,
                    task_id,
                    step_index,
                    status: state.status,
                    warnings,
                })
            }
            Err(err @ DecisionError::Unparseable { .. }) => {
                metrics::record_decision_attempts(0, err.attempts());
                state.record(StepResult::with_error(
                    task_id.clone(),
                    step_index,
                    StepFailure {
                        kind: err.kind().to_string(),
                        detail: err.to_string(),
                    },
                ));
                state.close(SessionStatus::Failed);
                warn!(error = %err, "decision failed; session closed");
                Err(StepError::Decision {
                    task_id,
                    step_index,
                    source: err,
                })
            }
            Err(err @ DecisionError::BackendUnavailable { .. }) => {
                metrics::record_decision_attempts(0, err.attempts());
                state.record_transient(step_index, err.kind(), err.to_string());
                warn!(error = %err, "model backend unavailable; step may be retried");
                Err(StepError::Decision {
                    task_id,
                    step_index,
                    source: err,
                })
            }
        }
    }

    async fn run_pipeline(
        &self,
        task: &Task,
        request: &StepRequest,
        history: Vec<HistoryEntry>,
    ) -> Result<PipelineOutput, JoinError> {
        let (assembled, degenerate) = self.prepare_prompt(task, request, history).await?;
        debug!(
            elements = assembled.page.len(),
            history_used = assembled.history_used,
            history_dropped = assembled.history_dropped,
            elements_dropped = assembled.elements_dropped,
            prompt_chars = assembled.prompt.len(),
            "prompt assembled"
        );
        let decision = self.engine.decide(&assembled.prompt, &assembled.page).await;
        Ok(PipelineOutput {
            assembled,
            degenerate,
            decision,
        })
    }

    /// Reduce the snapshot and assemble the prompt on the blocking pool.
    fn prepare_prompt(
        &self,
        task: &Task,
        request: &StepRequest,
        history: Vec<HistoryEntry>,
    ) -> JoinHandle<(AssembledPrompt, bool)> {
        let reducer = self.reducer.clone();
        let assembler = self.assembler.clone();
        let max_elements = self.config.max_elements as usize;
        let budget_chars = self.config.prompt_budget_chars;
        let project_hint = self
            .project_hints
            .get(task.web_project_id.as_str())
            .filter(|hint| !hint.trim().is_empty())
            .cloned();
        let task = task.clone();
        let html = request.snapshot_html.clone();
        let url = request.start_url.trim().to_string();
        let step_index = request.step_index;

        tokio::task::spawn_blocking(move || {
            let mut reduced = reducer.reduce(&html, max_elements);
            if !url.is_empty() {
                reduced = reduced.with_url(url.as_str());
            }
            let degenerate = reduced.is_degenerate();
            let context = PromptContext {
                task: &task,
                url: &url,
                step_index,
                project_hint: project_hint.as_deref(),
            };
            let assembled = assembler.assemble(context, reduced, &history, budget_chars);
            (assembled, degenerate)
        })
    }

    fn enforce_step_limit(&self, state: &mut SessionState, warnings: &mut Vec<String>) {
        if state.expected_step_index >= self.config.max_steps {
            state.abort(STEP_LIMIT_REASON);
            warnings.push(WARN_STEP_LIMIT_REACHED.to_string());
            info!(max_steps = self.config.max_steps, "step limit reached; session aborted");
        }
    }

    /// Force the session into `aborted`, waiting for any in-flight step.
    ///
    /// Unknown tasks get an aborted placeholder so late steps are refused.
    #[instrument(name = "webagent.abort", skip(self, reason), fields(task_id = %task_id))]
    pub async fn abort(&self, task_id: &TaskId, reason: Option<String>) -> SessionState {
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_ABORT_REASON.to_string());
        let slot = self.store.slot(task_id);
        let mut guard = slot.lock_owned().await;
        let snapshot = match guard.as_mut() {
            Some(state) => {
                state.abort(reason);
                state.clone()
            }
            None => {
                let state =
                    SessionState::aborted_tombstone(Task::new(task_id.clone(), String::new()), reason);
                *guard = Some(state.clone());
                state
            }
        };
        info!(status = %snapshot.status, steps = snapshot.history.len(), "session aborted");
        snapshot
    }

    /// Snapshot of a session, waiting for any in-flight step to commit.
    pub async fn session(&self, task_id: &TaskId) -> Option<SessionState> {
        let slot = self.store.get(task_id)?;
        let guard = slot.lock().await;
        guard.clone()
    }

    /// Evict terminal sessions closed more than `grace` ago.
    pub fn prune(&self, grace: Duration) -> usize {
        let grace = chrono::Duration::from_std(grace).unwrap_or_else(|_| chrono::Duration::zero());
        let removed = self.store.prune(grace, Utc::now());
        if removed > 0 {
            debug!(removed, "pruned expired sessions");
        }
        metrics::set_active_sessions(self.store.len());
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{LlmError, ScriptedLlmProvider, ScriptedReply};
    use std::sync::atomic::{AtomicBool, Ordering};
    use webagent_core_types::StepIndex;

    const PAGE: &str = r#"<html><body><button id="go">Go</button></body></html>"#;

    fn go_address() -> String {
        AgentConfig::default().reducer().reduce(PAGE, 300).elements[0]
            .address
            .clone()
    }

    fn orchestrator(replies: Vec<ScriptedReply>) -> (StepOrchestrator, Arc<ScriptedLlmProvider>) {
        let provider = Arc::new(ScriptedLlmProvider::new(replies));
        let config = AgentConfig::default()
            .retries(0)
            .llm_timeout(1_000)
            .step_timeout(5_000)
            .max_steps(3);
        (StepOrchestrator::new(config, provider.clone()), provider)
    }

    fn click_reply() -> ScriptedReply {
        ScriptedReply::text(format!(
            r#"{{"action":"click","address":"{}"}}"#,
            go_address()
        ))
    }

    fn request(step: StepIndex) -> StepRequest {
        StepRequest::new("task-1", step)
            .with_prompt("press go")
            .with_url("https://example.test/")
            .with_html(PAGE)
    }

    #[tokio::test]
    async fn first_step_must_be_zero() {
        let (orchestrator, provider) = orchestrator(vec![]);
        let err = orchestrator.step(request(2)).await.unwrap_err();
        assert!(matches!(
            err,
            StepError::OutOfOrderStep {
                expected: 0,
                got: 2,
                ..
            }
        ));
        assert_eq!(provider.calls(), 0);
        assert!(orchestrator.session(&TaskId::from("task-1")).await.is_none());
    }

    #[tokio::test]
    async fn blank_task_id_is_invalid() {
        let (orchestrator, _) = orchestrator(vec![]);
        let err = orchestrator
            .step(StepRequest::new("   ", 0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
    }

    #[tokio::test]
    async fn step_limit_aborts_session() {
        let (orchestrator, _) =
            orchestrator(vec![click_reply(), click_reply(), click_reply(), click_reply()]);
        for step in 0..2 {
            let outcome = orchestrator.step(request(step)).await.unwrap();
            assert_eq!(outcome.status, SessionStatus::Active);
        }
        let last = orchestrator.step(request(2)).await.unwrap();
        assert_eq!(last.status, SessionStatus::Aborted);
        assert!(last.has_warning(WARN_STEP_LIMIT_REACHED));

        let state = orchestrator.session(&TaskId::from("task-1")).await.unwrap();
        assert_eq!(state.abort_reason.as_deref(), Some(STEP_LIMIT_REASON));
        assert_eq!(state.history.len(), 3);

        let err = orchestrator.step(request(3)).await.unwrap_err();
        assert_eq!(err.kind(), "session_closed");

        let after = orchestrator.session(&TaskId::from("task-1")).await.unwrap();
        assert_eq!(after.history, state.history);
        assert_eq!(after.expected_step_index, 3);
        assert_eq!(after.status, SessionStatus::Aborted);
    }

    #[tokio::test]
    async fn page_reduction_runs_off_the_async_worker() {
        let buttons: String = (0..4_000)
            .map(|i| format!(r#"<button id="b{i}">Button {i}</button>"#))
            .collect();
        let html = format!("<html><body>{buttons}</body></html>");
        let (orchestrator, _) = orchestrator(vec![ScriptedReply::text(
            r#"{"action":"done","summary":"seen"}"#,
        )]);

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        tokio::spawn(async move { flag.store(true, Ordering::SeqCst) });

        let outcome = orchestrator
            .step(request(0).with_html(html))
            .await
            .unwrap();
        assert!(outcome.action.is_done());
        assert!(
            ran.load(Ordering::SeqCst),
            "current-thread runtime was blocked for the whole step"
        );
    }

    #[tokio::test]
    async fn unparseable_fails_session() {
        let (orchestrator, _) = orchestrator(vec![ScriptedReply::text("no idea")]);
        let err = orchestrator.step(request(0)).await.unwrap_err();
        assert_eq!(err.kind(), "unparseable");

        let state = orchestrator.session(&TaskId::from("task-1")).await.unwrap();
        assert_eq!(state.status, SessionStatus::Failed);
        assert_eq!(state.history.len(), 1);
        assert!(state.history[0].action.is_none());
        assert_eq!(
            state.history[0].error.as_ref().map(|e| e.kind.as_str()),
            Some("unparseable")
        );
    }

    #[tokio::test]
    async fn backend_failure_leaves_index_unchanged() {
        let (orchestrator, _) = orchestrator(vec![
            ScriptedReply::Error(LlmError::Unavailable("503".into())),
            click_reply(),
        ]);
        let err = orchestrator.step(request(0)).await.unwrap_err();
        assert!(err.retryable());

        let state = orchestrator.session(&TaskId::from("task-1")).await.unwrap();
        assert_eq!(state.status, SessionStatus::Active);
        assert_eq!(state.expected_step_index, 0);
        assert!(state.history.is_empty());
        assert_eq!(state.transient_failures.len(), 1);

        orchestrator.step(request(0)).await.unwrap();
        let state = orchestrator.session(&TaskId::from("task-1")).await.unwrap();
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.expected_step_index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn step_timeout_leaves_session_untouched() {
        let provider = Arc::new(ScriptedLlmProvider::new([
            ScriptedReply::text("{}").delayed(Duration::from_secs(600))
        ]));
        let config = AgentConfig::default()
            .retries(0)
            .llm_timeout(10_000)
            .step_timeout(2_000);
        let orchestrator = StepOrchestrator::new(config, provider);
        let err = orchestrator.step(request(0)).await.unwrap_err();
        assert_eq!(err.kind(), "step_timeout");
        let state = orchestrator.session(&TaskId::from("task-1")).await;
        assert!(state.is_none());
    }

    #[tokio::test]
    async fn abort_creates_tombstone_and_refuses_steps() {
        let (orchestrator, provider) = orchestrator(vec![click_reply()]);
        let state = orchestrator
            .abort(&TaskId::from("task-1"), Some("  ".into()))
            .await;
        assert_eq!(state.status, SessionStatus::Aborted);
        assert_eq!(state.abort_reason.as_deref(), Some(DEFAULT_ABORT_REASON));

        let err = orchestrator.step(request(0)).await.unwrap_err();
        assert_eq!(err.kind(), "session_closed");
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn abort_overrides_done() {
        let (orchestrator, _) = orchestrator(vec![ScriptedReply::text(
            r#"{"action":"done","summary":"nothing to do"}"#,
        )]);
        let outcome = orchestrator.step(request(0)).await.unwrap();
        assert_eq!(outcome.status, SessionStatus::Done);

        let state = orchestrator
            .abort(&TaskId::from("task-1"), Some("operator".into()))
            .await;
        assert_eq!(state.status, SessionStatus::Aborted);
        assert_eq!(state.history.len(), 1);
    }

    #[tokio::test]
    async fn prune_evicts_closed_sessions() {
        let (orchestrator, _) = orchestrator(vec![]);
        orchestrator.abort(&TaskId::from("gone"), None).await;
        assert_eq!(orchestrator.prune(Duration::from_secs(3600)), 0);
        assert_eq!(orchestrator.prune(Duration::ZERO), 1);
        assert_eq!(orchestrator.session_count(), 0);
    }

    #[tokio::test]
    async fn project_hints_reach_the_prompt() {
        let (orchestrator, provider) = orchestrator(vec![click_reply()]);
        let orchestrator = orchestrator.with_project_hints(BTreeMap::from([(
            "shop".to_string(),
            "Checkout lives under the cart icon.".to_string(),
        )]));
        orchestrator
            .step(request(0).with_project("shop"))
            .await
            .unwrap();
        assert!(provider.prompts()[0]
            .user
            .contains("Checkout lives under the cart icon."));
    }
}
