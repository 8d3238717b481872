//! Optimistic mutations: patch the live query cache first, write second,
//! then confirm (invalidate) or roll back.
//!
//! One invocation moves through `Idle -> Pending -> {Confirmed, RolledBack}`:
//!
//! 1. `begin` cancels ticks in flight for the key, snapshots the cached value
//!    into a [`MutationContext`] and writes the optimistic projection. All of
//!    this is synchronous, so consumers see the projection before the write
//!    starts.
//! 2. The caller runs the write.
//! 3. `settle` either invalidates the key (success; the next tick replaces the
//!    projection with the authoritative value) or restores the snapshot
//!    (failure). Faults are logged, never retried.
//!
//! Overlapping mutations on one key each snapshot at their own `begin`. The
//! second snapshot therefore contains the first projection, and rolling back
//! the second restores a cache that still shows the first, even if the first
//! later fails too.

use std::future::Future;
use std::sync::Arc;

use livetasks_core::MutationId;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::engine::LiveQueryEngine;
use crate::error::MutationError;
use crate::key::QueryKey;

/// Lifecycle of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    /// Nothing in flight.
    Idle,
    /// Projection applied, write not settled.
    Pending,
    /// Write succeeded; the key was invalidated.
    Confirmed,
    /// Write failed; the snapshot was restored.
    RolledBack,
}

/// Rollback data for one mutation attempt.
#[derive(Debug, Clone)]
pub struct MutationContext<T> {
    previous: Option<T>,
}

impl<T> MutationContext<T> {
    /// Cached value right before the optimistic patch.
    pub fn previous(&self) -> Option<&T> {
        self.previous.as_ref()
    }
}

/// One kind of optimistic write against one cache key (e.g. "add task").
pub struct OptimisticMutation<T> {
    name: &'static str,
    engine: LiveQueryEngine<T>,
    key: QueryKey,
    /// Invocations begun and not settled yet.
    pending: Arc<watch::Sender<usize>>,
}

impl<T> Clone for OptimisticMutation<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            engine: self.engine.clone(),
            key: self.key.clone(),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<T> OptimisticMutation<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Binds a mutation named `name` (used in logs) to `key` on `engine`.
    pub fn new(name: &'static str, engine: LiveQueryEngine<T>, key: QueryKey) -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            name,
            engine,
            key,
            pending: Arc::new(pending),
        }
    }

    /// Key whose cached value this mutation patches.
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// `Pending` while any invocation is in flight, `Idle` otherwise.
    pub fn state(&self) -> MutationState {
        if self.is_pending() {
            MutationState::Pending
        } else {
            MutationState::Idle
        }
    }

    /// True while any invocation of this mutation has not settled.
    pub fn is_pending(&self) -> bool {
        self.pending_count() > 0
    }

    /// Number of invocations begun and not settled yet.
    pub fn pending_count(&self) -> usize {
        *self.pending.borrow()
    }

    /// Waits until every invocation begun so far (and any begun meanwhile) has
    /// settled.
    pub async fn idle(&self) {
        let mut rx = self.pending.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Applies `project` to the cached value and publishes the result.
    ///
    /// `project` receives the current value (`None` if nothing is cached yet).
    pub fn begin<P>(&self, project: P) -> PendingMutation<T>
    where
        P: FnOnce(Option<&T>) -> T,
    {
        let id = MutationId::new();
        self.engine.cancel_in_flight(&self.key);
        let previous = self.engine.query_data(&self.key);
        let projected = project(previous.as_ref());
        self.engine.set_query_data(&self.key, projected);
        self.pending.send_modify(|n| *n += 1);
        info!(mutation = self.name, %id, key = %self.key, "optimistic update applied");

        PendingMutation {
            id,
            name: self.name,
            engine: self.engine.clone(),
            key: self.key.clone(),
            context: MutationContext { previous },
            state: MutationState::Pending,
            _pending: PendingGuard(Arc::clone(&self.pending)),
        }
    }

    /// `begin`, then await `write`, then `settle`.
    ///
    /// `write` is only polled after the projection is visible.
    pub async fn run<P, W, R>(&self, project: P, write: W) -> Result<R, MutationError>
    where
        P: FnOnce(Option<&T>) -> T,
        W: Future<Output = Result<R, MutationError>>,
    {
        let pending = self.begin(project);
        let result = write.await;
        pending.settle(result)
    }
}

struct PendingGuard(Arc<watch::Sender<usize>>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// A mutation whose optimistic projection is live and whose write has not
/// settled yet.
///
/// Dropping it unsettled leaves the projection in place and invalidates the
/// key so the next tick reconciles.
pub struct PendingMutation<T>
where
    T: Clone + Send + Sync + 'static,
{
    id: MutationId,
    name: &'static str,
    engine: LiveQueryEngine<T>,
    key: QueryKey,
    context: MutationContext<T>,
    state: MutationState,
    _pending: PendingGuard,
}

impl<T> PendingMutation<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Id of this attempt, as logged.
    pub fn id(&self) -> MutationId {
        self.id
    }

    /// Always `Pending` until consumed by `confirm`, `roll_back` or `settle`.
    pub fn state(&self) -> MutationState {
        self.state
    }

    /// Snapshot taken before the projection was applied.
    pub fn context(&self) -> &MutationContext<T> {
        &self.context
    }

    /// The write succeeded: mark the key for revalidation.
    pub fn confirm(mut self) -> MutationState {
        self.engine.invalidate(&self.key);
        info!(mutation = self.name, id = %self.id, key = %self.key, "optimistic update confirmed");
        self.state = MutationState::Confirmed;
        self.state
    }

    /// The write failed: put the snapshot back.
    pub fn roll_back(mut self, error: &MutationError) -> MutationState {
        self.engine
            .restore_query_data(&self.key, self.context.previous.take());
        warn!(
            mutation = self.name,
            id = %self.id,
            key = %self.key,
            error = %error,
            "optimistic update failed; rolled back"
        );
        self.state = MutationState::RolledBack;
        self.state
    }

    /// Confirms or rolls back depending on `result`, then hands it back.
    pub fn settle<R>(self, result: Result<R, MutationError>) -> Result<R, MutationError> {
        match &result {
            Ok(_) => {
                self.confirm();
            }
            Err(err) => {
                self.roll_back(err);
            }
        }
        result
    }
}

impl<T> Drop for PendingMutation<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.state == MutationState::Pending {
            warn!(mutation = self.name, id = %self.id, key = %self.key, "dropped before settling");
            self.engine.invalidate(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LiveConfig;
    use std::time::Duration;

    fn rejected() -> MutationError {
        MutationError::Backend {
            op: "test",
            reason: "nope".into(),
        }
    }

    fn engine_with(key: &QueryKey, value: Vec<u32>) -> LiveQueryEngine<Vec<u32>> {
        let engine = LiveQueryEngine::new(LiveConfig::default());
        engine.set_query_data(key, value);
        engine
    }

    fn push(n: u32) -> impl FnOnce(Option<&Vec<u32>>) -> Vec<u32> {
        move |prev| {
            let mut next = prev.cloned().unwrap_or_default();
            next.push(n);
            next
        }
    }

    #[test]
    fn test_begin_patches_synchronously_and_counts_pending() {
        let key = QueryKey::from("nums");
        let engine = engine_with(&key, vec![1]);
        let mutation = OptimisticMutation::new("push", engine.clone(), key.clone());
        assert!(!mutation.is_pending());

        let pending = mutation.begin(push(2));
        assert_eq!(engine.query_data(&key), Some(vec![1, 2]));
        assert_eq!(pending.state(), MutationState::Pending);
        assert_eq!(pending.context().previous(), Some(&vec![1]));
        assert!(mutation.is_pending());

        // Confirm needs a runtime only when the key has subscribers.
        assert_eq!(pending.confirm(), MutationState::Confirmed);
        assert!(!mutation.is_pending());
        assert_eq!(engine.query_data(&key), Some(vec![1, 2]));
        assert!(engine.query_state(&key).is_some_and(|s| s.stale));
    }

    #[test]
    fn test_roll_back_restores_exact_snapshot() {
        let key = QueryKey::from("nums");
        let engine = engine_with(&key, vec![3, 1, 2]);
        let mutation = OptimisticMutation::new("push", engine.clone(), key.clone());

        let pending = mutation.begin(push(9));
        assert_eq!(pending.roll_back(&rejected()), MutationState::RolledBack);
        assert_eq!(engine.query_data(&key), Some(vec![3, 1, 2]));
        assert!(!mutation.is_pending());
    }

    #[test]
    fn test_roll_back_to_empty_cache() {
        let key = QueryKey::from("nums");
        let engine = LiveQueryEngine::<Vec<u32>>::new(LiveConfig::default());
        let mutation = OptimisticMutation::new("push", engine.clone(), key.clone());

        let pending = mutation.begin(push(1));
        assert_eq!(engine.query_data(&key), Some(vec![1]));
        pending.roll_back(&rejected());
        assert_eq!(engine.query_data(&key), None);
    }

    #[test]
    fn test_overlapping_rollback_keeps_earlier_projection() {
        let key = QueryKey::from("nums");
        let engine = engine_with(&key, vec![1]);
        let mutation = OptimisticMutation::new("push", engine.clone(), key.clone());

        let first = mutation.begin(push(2));
        let second = mutation.begin(push(3));
        assert_eq!(mutation.pending_count(), 2);
        assert_eq!(engine.query_data(&key), Some(vec![1, 2, 3]));

        second.roll_back(&rejected());
        assert_eq!(engine.query_data(&key), Some(vec![1, 2]));

        // The first one failing afterwards restores its own snapshot.
        first.roll_back(&rejected());
        assert_eq!(engine.query_data(&key), Some(vec![1]));
        assert!(!mutation.is_pending());
    }

    #[test]
    fn test_rollback_out_of_order_resurrects_failed_projection() {
        let key = QueryKey::from("nums");
        let engine = engine_with(&key, vec![1]);
        let mutation = OptimisticMutation::new("push", engine.clone(), key.clone());

        let first = mutation.begin(push(2));
        let second = mutation.begin(push(3));
        first.roll_back(&rejected());
        assert_eq!(engine.query_data(&key), Some(vec![1]));
        second.roll_back(&rejected());
        // Second snapshot was taken on top of the first projection.
        assert_eq!(engine.query_data(&key), Some(vec![1, 2]));
    }

    #[test]
    fn test_dropping_unsettled_mutation_clears_pending() {
        let key = QueryKey::from("nums");
        let engine = engine_with(&key, vec![1]);
        let mutation = OptimisticMutation::new("push", engine.clone(), key.clone());

        drop(mutation.begin(push(2)));
        assert!(!mutation.is_pending());
        assert_eq!(engine.query_data(&key), Some(vec![1, 2]));
        assert!(engine.query_state(&key).is_some_and(|s| s.stale));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exposes_projection_before_write_resolves() {
        let key = QueryKey::from("nums");
        let engine = engine_with(&key, vec![1]);
        let mutation = OptimisticMutation::new("push", engine.clone(), key.clone());

        let observer = {
            let engine = engine.clone();
            let key = key.clone();
            let mutation = mutation.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                (engine.query_data(&key), mutation.is_pending())
            }
        };
        let write = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, MutationError>("done")
        };
        let (result, seen) = tokio::join!(mutation.run(push(2), write), observer);

        assert_eq!(result, Ok("done"));
        assert_eq!(seen, (Some(vec![1, 2]), true));
        assert!(!mutation.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_rolls_back_on_fault() {
        let key = QueryKey::from("nums");
        let engine = engine_with(&key, vec![1]);
        let mutation = OptimisticMutation::new("push", engine.clone(), key.clone());

        let write = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Err::<(), _>(rejected())
        };
        let result = mutation.run(push(2), write).await;
        assert_eq!(result, Err(rejected()));
        assert_eq!(engine.query_data(&key), Some(vec![1]));
        assert!(!mutation.is_pending());
    }

    #[test]
    fn test_state_tracks_unsettled_invocations() {
        let key = QueryKey::from("nums");
        let engine = engine_with(&key, vec![1]);
        let mutation = OptimisticMutation::new("push", engine, key);
        assert_eq!(mutation.state(), MutationState::Idle);

        let pending = mutation.begin(push(2));
        assert_eq!(mutation.state(), MutationState::Pending);
        pending.roll_back(&rejected());
        assert_eq!(mutation.state(), MutationState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_waits_for_every_write() {
        let key = QueryKey::from("nums");
        let engine = engine_with(&key, vec![1]);
        let mutation = OptimisticMutation::new("push", engine.clone(), key.clone());

        let first = mutation.begin(push(2));
        let second = mutation.begin(push(3));
        let settle = async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            first.confirm();
            tokio::time::sleep(Duration::from_millis(50)).await;
            second.roll_back(&rejected());
        };
        let start = tokio::time::Instant::now();
        tokio::join!(mutation.idle(), settle);
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(mutation.pending_count(), 0);

        // Nothing in flight: returns at once.
        mutation.idle().await;
        assert_eq!(engine.query_data(&key), Some(vec![1, 2]));
    }
}
