use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use webagent_core_types::TaskId;

use super::state::SessionState;

/// Exclusive slot for one task. `None` until the first accepted step.
pub type SessionSlot = Arc<Mutex<Option<SessionState>>>;

/// Maps task ids to their session slots.
///
/// Holding a slot's lock is the per-task critical section: the orchestrator
/// keeps it across the whole read-decide-commit cycle of a step.
pub trait SessionStore: Send + Sync {
    /// Slot for `task_id`, created empty when missing.
    fn slot(&self, task_id: &TaskId) -> SessionSlot;

    /// Slot for `task_id` without creating one.
    fn get(&self, task_id: &TaskId) -> Option<SessionSlot>;

    /// Drop expired terminal sessions and unused empty slots.
    fn prune(&self, grace: chrono::Duration, now: DateTime<Utc>) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<TaskId, SessionSlot>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn slot(&self, task_id: &TaskId) -> SessionSlot {
        self.sessions
            .entry(task_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    fn get(&self, task_id: &TaskId) -> Option<SessionSlot> {
        self.sessions.get(task_id).map(|slot| slot.clone())
    }

    fn prune(&self, grace: chrono::Duration, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, slot| {
            // Someone outside the map holds the slot; a step or abort may be
            // about to use it.
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(guard) => match guard.as_ref() {
                    None => false,
                    Some(state) => !state.expired(grace, now),
                },
                Err(_) => true,
            }
        });
        before.saturating_sub(self.sessions.len())
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::state::SessionStatus;
    use agent_core::Task;

    fn state(id: &str) -> SessionState {
        SessionState::new(Task::new(TaskId::from(id), "goal"))
    }

    #[tokio::test]
    async fn same_task_shares_one_slot() {
        let store = InMemorySessionStore::new();
        let a = store.slot(&TaskId::from("t"));
        let b = store.slot(&TaskId::from("t"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 1);
        assert!(store.get(&TaskId::from("other")).is_none());
    }

    #[tokio::test]
    async fn prune_drops_expired_and_empty_slots() {
        let store = InMemorySessionStore::new();
        let now = Utc::now();
        let grace = chrono::Duration::seconds(5);

        store.slot(&TaskId::from("empty"));
        {
            let slot = store.slot(&TaskId::from("active"));
            *slot.lock().await = Some(state("active"));
        }
        {
            let slot = store.slot(&TaskId::from("done"));
            let mut done = state("done");
            done.close(SessionStatus::Done);
            *slot.lock().await = Some(done);
        }

        assert_eq!(store.prune(grace, now), 1);
        assert_eq!(store.len(), 2);

        let removed = store.prune(grace, now + chrono::Duration::seconds(6));
        assert_eq!(removed, 1);
        assert!(store.get(&TaskId::from("active")).is_some());
        assert!(store.get(&TaskId::from("done")).is_none());
    }

    #[tokio::test]
    async fn prune_keeps_slots_in_use() {
        let store = InMemorySessionStore::new();
        let held = store.slot(&TaskId::from("busy"));
        assert_eq!(store.prune(chrono::Duration::zero(), Utc::now()), 0);
        drop(held);
        assert_eq!(store.prune(chrono::Duration::zero(), Utc::now()), 1);
    }
}
