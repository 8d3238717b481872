use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use livetasks_core::{Task, TaskPatch, TaskStore};
use tracing::debug;

use crate::config::BackendConfig;
use crate::error::MutationError;

/// Write path standing in for a remote API: waits `write_latency`, then applies
/// the write to the store. Faults can be switched on for every write or armed
/// for the next few.
#[derive(Debug)]
pub struct SimulatedBackend {
    store: TaskStore,
    latency: Duration,
    failing: AtomicBool,
    fail_next: AtomicUsize,
}

impl SimulatedBackend {
    /// Writes go to `store`, delayed by `config.write_latency`.
    pub fn new(store: TaskStore, config: &BackendConfig) -> Self {
        Self {
            store,
            latency: config.write_latency,
            failing: AtomicBool::new(config.fail_writes),
            fail_next: AtomicUsize::new(0),
        }
    }

    /// Store the writes land in.
    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Makes every following write fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes the next `count` writes fail.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.fetch_add(count, Ordering::SeqCst);
    }

    /// Appends `task` to the store (no id check).
    pub async fn add_task(&self, task: Task) -> Result<Task, MutationError> {
        self.round_trip("add task").await?;
        self.store.add(task.clone());
        Ok(task)
    }

    /// `Ok(None)` when no task has `id`.
    pub async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Option<Task>, MutationError> {
        self.round_trip("update task").await?;
        Ok(self.store.update(id, patch))
    }

    async fn round_trip(&self, op: &'static str) -> Result<(), MutationError> {
        tokio::time::sleep(self.latency).await;
        let armed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed || self.failing.load(Ordering::SeqCst) {
            debug!(op, "simulated write fault");
            return Err(MutationError::Backend {
                op,
                reason: "simulated failure".into(),
            });
        }
        Ok(())
    }
}
