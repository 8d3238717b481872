//! Identifier helpers.

use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;
use uuid::Uuid;

use crate::util::now_ms;

/// Length of the random suffix in generated task ids.
const RANDOM_SUFFIX_LEN: usize = 9;

/// Generates a client-side task id of the form `task-<epoch ms>-<random>`.
///
/// Collisions are improbable but not ruled out; the store does not guarantee
/// uniqueness for [`Collection::add`](crate::Collection::add).
pub fn generate_task_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("task-{}-{}", now_ms(), &random[..RANDOM_SUFFIX_LEN])
}

/// Identifies one optimistic mutation attempt in logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MutationId(pub Ulid);

impl MutationId {
    /// Creates a fresh, time-ordered id.
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
