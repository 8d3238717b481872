//! Task list bindings: the live queries the UI reads and the two optimistic
//! mutations it triggers.

use std::sync::Arc;

use livetasks_core::{Record, Task, TaskPatch, TaskStore};
use tracing::debug;

use crate::backend::SimulatedBackend;
use crate::engine::{LiveQuery, LiveQueryEngine};
use crate::error::{EngineError, MutationError};
use crate::key::QueryKey;
use crate::mutation::OptimisticMutation;

/// `["tasks"]`: every task.
pub fn tasks_key() -> QueryKey {
    QueryKey::from("tasks")
}

/// `["tasks", "completed"]`, under [`tasks_key`] so invalidating the list
/// also refreshes this view.
pub fn completed_tasks_key() -> QueryKey {
    tasks_key().child("completed")
}

/// Live view of every task, in store order.
pub fn subscribe_tasks(
    engine: &LiveQueryEngine<Vec<Task>>,
    store: &TaskStore,
) -> Result<LiveQuery<Vec<Task>>, EngineError> {
    let store = store.clone();
    engine.subscribe(tasks_key(), move || {
        let store = store.clone();
        async move { Ok(store.find_many()) }
    })
}

/// Live view of the completed tasks.
pub fn subscribe_completed_tasks(
    engine: &LiveQueryEngine<Vec<Task>>,
    store: &TaskStore,
) -> Result<LiveQuery<Vec<Task>>, EngineError> {
    let store = store.clone();
    engine.subscribe(completed_tasks_key(), move || {
        let store = store.clone();
        async move { Ok(store.find_where(|t| t.completed)) }
    })
}

fn appended(previous: Option<&Vec<Task>>, task: Task) -> Vec<Task> {
    let mut next = previous.cloned().unwrap_or_default();
    next.push(task);
    next
}

fn patched(previous: Option<&Vec<Task>>, id: &str, patch: &TaskPatch) -> Vec<Task> {
    previous
        .map(|tasks| {
            tasks
                .iter()
                .cloned()
                .map(|mut task| {
                    if task.id == id {
                        task.merge(patch);
                    }
                    task
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Add/update intents for the task list, applied optimistically to
/// [`tasks_key`].
///
/// The plain methods mirror a UI action: they return once the optimistic
/// patch is visible and leave the write to a background task, whose faults are
/// only logged. The `_async` variants await the write and return its outcome.
#[derive(Clone)]
pub struct TaskMutations {
    backend: Arc<SimulatedBackend>,
    add: OptimisticMutation<Vec<Task>>,
    update: OptimisticMutation<Vec<Task>>,
}

impl TaskMutations {
    /// Binds both mutations to [`tasks_key`] on `engine`.
    pub fn new(engine: LiveQueryEngine<Vec<Task>>, backend: Arc<SimulatedBackend>) -> Self {
        Self {
            backend,
            add: OptimisticMutation::new("add task", engine.clone(), tasks_key()),
            update: OptimisticMutation::new("update task", engine, tasks_key()),
        }
    }

    /// Write path the mutations go through.
    pub fn backend(&self) -> &SimulatedBackend {
        &self.backend
    }

    /// Appends `task` to the cached list now and writes it in the background.
    pub fn add_task(&self, task: Task) {
        let pending = self.add.begin(|prev| appended(prev, task.clone()));
        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            let result = backend.add_task(task).await;
            if let Ok(task) = pending.settle(result) {
                debug!(id = %task.id, "add task settled");
            }
        });
    }

    /// Like [`add_task`](Self::add_task) but waits for the write.
    pub async fn add_task_async(&self, task: Task) -> Result<Task, MutationError> {
        let optimistic = task.clone();
        self.add
            .run(|prev| appended(prev, optimistic), self.backend.add_task(task))
            .await
    }

    /// Merges `patch` into the cached task `id` now and writes it in the
    /// background.
    pub fn update_task(&self, id: impl Into<String>, patch: TaskPatch) {
        let id = id.into();
        let pending = self.update.begin(|prev| patched(prev, &id, &patch));
        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            let result = backend.update_task(&id, &patch).await;
            if let Ok(updated) = pending.settle(result) {
                debug!(%id, found = updated.is_some(), "update task settled");
            }
        });
    }

    /// Like [`update_task`](Self::update_task) but waits for the write.
    /// `Ok(None)` when the store has no task with `id`.
    pub async fn update_task_async(
        &self,
        id: &str,
        patch: TaskPatch,
    ) -> Result<Option<Task>, MutationError> {
        self.update
            .run(
                |prev| patched(prev, id, &patch),
                self.backend.update_task(id, &patch),
            )
            .await
    }

    /// Flips the completion flag of `task`.
    pub fn toggle_task(&self, task: &Task) {
        self.update_task(task.id.clone(), TaskPatch::completed(!task.completed));
    }

    /// True while an add has not settled.
    pub fn is_adding_task(&self) -> bool {
        self.add.is_pending()
    }

    /// True while an update has not settled.
    pub fn is_updating_task(&self) -> bool {
        self.update.is_pending()
    }

    /// Waits until every add and update begun so far has settled.
    pub async fn settled(&self) {
        tokio::join!(self.add.idle(), self.update.idle());
    }
}
