//! Project-planning schemas: the richer task shape the live list is growing
//! towards, plus the derived views computed from it.
//!
//! None of these are wired into live queries or optimistic mutations yet; the
//! live list works on [`Task`](crate::Task).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::util::EpochMs;

/// A person tasks can be assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Contact address.
    pub email: String,
    /// Avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Creation time.
    #[serde(rename = "createdAt")]
    pub created_at_ms: EpochMs,
}

/// A project grouping tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// UI colour, e.g. `#0066cc`.
    pub color: String,
    /// Owning [`User`].
    pub owner_id: String,
    /// Creation time.
    #[serde(rename = "createdAt")]
    pub created_at_ms: EpochMs,
    /// Last modification time.
    #[serde(rename = "updatedAt")]
    pub updated_at_ms: EpochMs,
}

/// Workflow state of a [`PlannedTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    /// Not started.
    Todo,
    /// Being worked on.
    InProgress,
    /// Finished.
    Done,
}

/// Priority of a [`PlannedTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low.
    Low,
    /// Medium.
    Medium,
    /// High.
    High,
}

/// Task linked to a project and optionally an assignee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedTask {
    /// Id.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Workflow state.
    pub status: TaskState,
    /// Priority.
    pub priority: Priority,
    /// Owning [`Project`].
    pub project_id: String,
    /// Assigned [`User`], if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    /// Creation time.
    #[serde(rename = "createdAt")]
    pub created_at_ms: EpochMs,
    /// Last modification time.
    #[serde(rename = "updatedAt")]
    pub updated_at_ms: EpochMs,
    /// Deadline.
    #[serde(rename = "dueDate", default, skip_serializing_if = "Option::is_none")]
    pub due_date_ms: Option<EpochMs>,
}

impl PlannedTask {
    /// Not done and past its due date at `now_ms`.
    pub fn is_overdue(&self, now_ms: EpochMs) -> bool {
        self.status != TaskState::Done && self.due_date_ms.is_some_and(|due| due < now_ms)
    }
}

/// A task joined with its project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskWithProject {
    /// The task.
    #[serde(flatten)]
    pub task: PlannedTask,
    /// Its project.
    pub project: Project,
}

/// A task joined with its assignee, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskWithAssignee {
    /// The task.
    #[serde(flatten)]
    pub task: PlannedTask,
    /// Its assignee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<User>,
}

/// Per-project progress counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    /// Project id.
    pub project_id: String,
    /// Project name.
    pub project_name: String,
    /// Tasks in the project.
    pub total_tasks: usize,
    /// Tasks in [`TaskState::Done`].
    pub completed_tasks: usize,
    /// Tasks in [`TaskState::InProgress`].
    pub in_progress_tasks: usize,
    /// Tasks in [`TaskState::Todo`].
    pub todo_tasks: usize,
    /// `completed / total * 100`, `0.0` for an empty project.
    pub completion_percentage: f64,
}

impl ProjectStats {
    /// Counts the tasks of `project` among `tasks`.
    pub fn compute(project: &Project, tasks: &[PlannedTask]) -> Self {
        let mut stats = Self {
            project_id: project.id.clone(),
            project_name: project.name.clone(),
            total_tasks: 0,
            completed_tasks: 0,
            in_progress_tasks: 0,
            todo_tasks: 0,
            completion_percentage: 0.0,
        };
        for task in tasks.iter().filter(|t| t.project_id == project.id) {
            stats.total_tasks += 1;
            match task.status {
                TaskState::Done => stats.completed_tasks += 1,
                TaskState::InProgress => stats.in_progress_tasks += 1,
                TaskState::Todo => stats.todo_tasks += 1,
            }
        }
        if stats.total_tasks > 0 {
            stats.completion_percentage =
                stats.completed_tasks as f64 / stats.total_tasks as f64 * 100.0;
        }
        stats
    }
}

/// Per-user workload counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    /// User id.
    pub user_id: String,
    /// User name.
    pub user_name: String,
    /// Tasks assigned to the user.
    pub assigned_tasks: usize,
    /// Assigned tasks that are done.
    pub completed_tasks: usize,
    /// Assigned tasks past their due date and not done at `now_ms`.
    pub overdue_tasks: usize,
}

impl UserStats {
    /// Counts the tasks assigned to `user` as of `now_ms`.
    pub fn compute(user: &User, tasks: &[PlannedTask], now_ms: EpochMs) -> Self {
        let assigned: Vec<&PlannedTask> = tasks
            .iter()
            .filter(|t| t.assignee_id.as_deref() == Some(user.id.as_str()))
            .collect();
        Self {
            user_id: user.id.clone(),
            user_name: user.name.clone(),
            assigned_tasks: assigned.len(),
            completed_tasks: assigned.iter().filter(|t| t.status == TaskState::Done).count(),
            overdue_tasks: assigned.iter().filter(|t| t.is_overdue(now_ms)).count(),
        }
    }
}

/// Inner join of tasks with their projects. Tasks whose project is unknown are
/// left out; order follows `tasks`.
pub fn join_projects(tasks: &[PlannedTask], projects: &[Project]) -> Vec<TaskWithProject> {
    let by_id: HashMap<&str, &Project> = projects.iter().map(|p| (p.id.as_str(), p)).collect();
    tasks
        .iter()
        .filter_map(|task| {
            by_id.get(task.project_id.as_str()).map(|project| TaskWithProject {
                task: task.clone(),
                project: (*project).clone(),
            })
        })
        .collect()
}

/// Left join of tasks with their assignees.
pub fn join_assignees(tasks: &[PlannedTask], users: &[User]) -> Vec<TaskWithAssignee> {
    let by_id: HashMap<&str, &User> = users.iter().map(|u| (u.id.as_str(), u)).collect();
    tasks
        .iter()
        .map(|task| TaskWithAssignee {
            task: task.clone(),
            assignee: task
                .assignee_id
                .as_deref()
                .and_then(|id| by_id.get(id))
                .map(|user| (*user).clone()),
        })
        .collect()
}
