use serde::{Deserialize, Serialize};

use crate::ids::generate_task_id;
use crate::util::{now_ms, EpochMs};

/// A domain entity held by a [`Collection`](crate::Collection).
///
/// Records are addressed by a string id assigned by whoever creates them.
pub trait Record: Clone + Send + 'static {
    /// Partial update merged by [`Collection::update`](crate::Collection::update).
    type Patch;

    /// Identifier, unique within a collection after `insert`.
    fn id(&self) -> &str;

    /// Shallow merge: fields present in `patch` overwrite, the rest are kept.
    fn merge(&mut self, patch: &Self::Patch);
}

/// A task on the live list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Client-generated id.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Completion flag.
    pub completed: bool,
    /// Creation time.
    #[serde(rename = "createdAt")]
    pub created_at_ms: EpochMs,
}

impl Task {
    /// Creates an open task with a fresh id, stamped with the current time.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: generate_task_id(),
            title: title.into(),
            completed: false,
            created_at_ms: now_ms(),
        }
    }

    /// Creates a task with an explicit id and creation time.
    pub fn with_id(
        id: impl Into<String>,
        title: impl Into<String>,
        completed: bool,
        created_at_ms: EpochMs,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            completed,
            created_at_ms,
        }
    }
}

/// Fields of a [`Task`] that may be changed after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New completion flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TaskPatch {
    /// Patch that only sets the completion flag.
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }

    /// Patch that only sets the title.
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// True when the patch carries no fields.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.completed.is_none()
    }
}

impl Record for Task {
    type Patch = TaskPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn merge(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
    }
}
