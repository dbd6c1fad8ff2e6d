mod router;
mod state;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

use crate::orchestrator::StepOrchestrator;

pub use router::build_router;
pub use state::{ServeHealth, ServeHealthSnapshot, ServeState};

/// Periodically evict terminal sessions past their grace period.
pub fn spawn_session_sweeper(
    orchestrator: Arc<StepOrchestrator>,
    every: Duration,
    grace: Duration,
) -> JoinHandle<()> {
    let every = every.max(Duration::from_secs(1));
    info!(
        interval_secs = every.as_secs(),
        grace_secs = grace.as_secs(),
        "Session sweeper enabled"
    );
    tokio::spawn(async move {
        let mut ticker = interval(every);
        loop {
            ticker.tick().await;
            let removed = orchestrator.prune(grace);
            if removed > 0 {
                debug!(removed, "Pruned expired sessions");
            }
        }
    })
}
