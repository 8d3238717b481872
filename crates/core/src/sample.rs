//! Seed data for demos and tests.

use crate::model::Task;
use crate::util::EpochMs;

/// 2024-01-01T00:00:00Z.
const JAN_1_2024_MS: EpochMs = 1_704_067_200_000;
const DAY_MS: EpochMs = 24 * 60 * 60 * 1000;

/// The three starter tasks shown on first launch.
pub fn sample_tasks() -> Vec<Task> {
    vec![
        Task::with_id("task-1", "Learn TanStack DB collections", false, JAN_1_2024_MS),
        Task::with_id("task-2", "Try live queries", false, JAN_1_2024_MS + DAY_MS),
        Task::with_id(
            "task-3",
            "Implement optimistic mutations",
            true,
            JAN_1_2024_MS + 2 * DAY_MS,
        ),
    ]
}
