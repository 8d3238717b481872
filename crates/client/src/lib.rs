#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Reactive layer over the task store: polling live queries with a shared
//! cache, idle-query garbage collection and optimistic mutations.
//!
//! ```text
//! TaskStore <- SimulatedBackend <- TaskMutations --set/restore/invalidate--> LiveQueryEngine
//!     ^                                                                          |
//!     +------------------------- query fn (every tick) --------------------------+
//! ```

mod backend;
mod config;
mod engine;
mod error;
mod gc;
mod key;
mod mutation;
mod scheduler;
pub mod tasks;

pub use backend::SimulatedBackend;
pub use config::{BackendConfig, LiveConfig};
pub use engine::{LiveQuery, LiveQueryEngine, QueryFn, QueryFuture, QueryState};
pub use error::{EngineError, MutationError, QueryError};
pub use key::QueryKey;
pub use mutation::{MutationContext, MutationState, OptimisticMutation, PendingMutation};
pub use scheduler::TickOutcome;
pub use tasks::{
    completed_tasks_key, subscribe_completed_tasks, subscribe_tasks, tasks_key, TaskMutations,
};
