use thiserror::Error;

/// Misuse of the live query engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// `subscribe_every` was given a zero interval.
    #[error("refetch interval must be greater than zero")]
    ZeroInterval,
}

/// Fault raised by a query function during a tick. Kept on the cached state
/// until the next successful tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The query function returned an error; carries its full chain.
    #[error("query failed: {0}")]
    Fetch(String),
}

impl QueryError {
    pub(crate) fn from_fault(err: &anyhow::Error) -> Self {
        Self::Fetch(format!("{err:#}"))
    }
}

/// Fault raised while executing a write inside an optimistic mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("backend rejected {op}: {reason}")]
    /// The backend refused the write.
    Backend {
        /// Operation that was attempted, e.g. `"add task"`.
        op: &'static str,
        /// Why it was refused.
        reason: String,
    },
}
