use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::Serialize;

use crate::orchestrator::StepOrchestrator;

#[derive(Clone)]
pub struct ServeState {
    pub(crate) orchestrator: Arc<StepOrchestrator>,
    pub(crate) health: Arc<ServeHealth>,
}

impl ServeState {
    pub fn new(orchestrator: Arc<StepOrchestrator>) -> Self {
        Self::with_health(orchestrator, Arc::new(ServeHealth::new()))
    }

    pub fn with_health(orchestrator: Arc<StepOrchestrator>, health: Arc<ServeHealth>) -> Self {
        Self {
            orchestrator,
            health,
        }
    }

    pub fn orchestrator(&self) -> &Arc<StepOrchestrator> {
        &self.orchestrator
    }

    pub fn health(&self) -> &Arc<ServeHealth> {
        &self.health
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServeHealthSnapshot {
    pub live: bool,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Default)]
pub struct ServeHealth {
    live: AtomicBool,
    ready: AtomicBool,
    started_at: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl ServeHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_live(&self) {
        self.live.store(true, Ordering::SeqCst);
        if let Ok(duration) = SystemTime::now().duration_since(UNIX_EPOCH) {
            let _ = self.started_at.compare_exchange(
                0,
                duration.as_secs(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        }
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
        *self.last_error.lock() = None;
    }

    pub fn mark_unready(&self, error: impl Into<String>) {
        self.ready.store(false, Ordering::SeqCst);
        *self.last_error.lock() = Some(error.into());
    }

    pub fn snapshot(&self) -> ServeHealthSnapshot {
        ServeHealthSnapshot {
            live: self.live.load(Ordering::SeqCst),
            ready: self.ready.load(Ordering::SeqCst),
            started_at: match self.started_at.load(Ordering::SeqCst) {
                0 => None,
                value => Some(value),
            },
            last_error: self.last_error.lock().clone(),
        }
    }
}
