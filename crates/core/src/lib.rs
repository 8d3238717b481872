#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Domain records and the in-memory collection store behind the live task list.
//!
//! Everything in this crate is synchronous. The reactive layer (live queries,
//! optimistic mutations) lives in `livetasks-client` and talks to a
//! [`Collection`] through a cloned handle.

pub mod ids;
pub mod model;
pub mod planning;
pub mod sample;
pub mod store;

mod util;

pub use ids::{generate_task_id, MutationId};
pub use model::{Record, Task, TaskPatch};
pub use store::{Collection, TaskStore};
pub use util::{now_ms, EpochMs};
