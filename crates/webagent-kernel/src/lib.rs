//! Step orchestration, model backend and HTTP surface of the web agent.

pub mod app_settings;
pub mod llm;
pub mod metrics;
pub mod orchestrator;
pub mod server;

use std::sync::Arc;

use agent_core::LlmProvider;

pub use app_settings::{Config, LlmBackend, LlmSettings, ServerSettings, SettingsError};
pub use orchestrator::{
    SessionState, SessionStatus, StepError, StepOrchestrator, StepOutcome, StepRequest,
};
pub use server::{build_router, spawn_session_sweeper, ServeHealth, ServeState};

/// Orchestrator wired from validated settings and a model backend.
pub fn build_orchestrator(
    config: &Config,
    provider: Arc<dyn LlmProvider>,
) -> Result<StepOrchestrator, SettingsError> {
    config.validate()?;
    metrics::register_metrics();
    Ok(StepOrchestrator::new(config.agent.clone(), provider)
        .with_project_hints(config.project_hints.clone()))
}
