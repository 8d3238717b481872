//! Tick execution and the per-key poller loop.

use std::sync::Arc;
use std::time::Duration;

use livetasks_core::now_ms;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::engine::Shared;
use crate::error::QueryError;
use crate::key::QueryKey;

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The query function succeeded and its value was cached.
    Fetched,
    /// The query function faulted; the previous value was kept.
    Failed,
    /// Another tick for the same key was still running.
    Skipped,
    /// A direct cache write happened while the tick ran; its result was dropped.
    Superseded,
    /// No query function is registered for the key.
    Inactive,
}

/// Polls `key` every `period` until the poller generation changes (last
/// subscriber left, or a newer poller took over). The first tick fires
/// immediately. A slow tick delays the next one; missed ticks are skipped, not
/// queued.
pub(crate) fn spawn_poller<T>(shared: Arc<Shared<T>>, key: QueryKey, period: Duration, generation: u64)
where
    T: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            if !is_current(&shared, &key, generation) {
                debug!(%key, generation, "poller stopped");
                break;
            }
            run_tick(&shared, &key).await;
        }
    });
}

/// Runs one out-of-band tick for `key` on a background task.
pub(crate) fn spawn_refetch<T>(shared: Arc<Shared<T>>, key: QueryKey)
where
    T: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        run_tick(&shared, &key).await;
    });
}

fn is_current<T>(shared: &Shared<T>, key: &QueryKey, generation: u64) -> bool {
    shared
        .lock()
        .get(key)
        .is_some_and(|e| e.subscribers > 0 && e.poller == Some(generation))
}

/// Executes the query function for `key` once and stores the outcome.
///
/// At most one tick per key runs at a time; a tick that finds another one in
/// flight returns [`TickOutcome::Skipped`] without calling the query function.
pub(crate) async fn run_tick<T>(shared: &Shared<T>, key: &QueryKey) -> TickOutcome
where
    T: Clone + Send + Sync + 'static,
{
    let (query_fn, epoch) = {
        let mut entries = shared.lock();
        let Some(entry) = entries.get_mut(key) else {
            return TickOutcome::Inactive;
        };
        let Some(query_fn) = entry.query_fn.clone() else {
            return TickOutcome::Inactive;
        };
        if entry.in_flight {
            debug!(%key, "previous tick still running; skipping");
            return TickOutcome::Skipped;
        }
        entry.in_flight = true;
        (query_fn, entry.write_epoch)
    };

    debug!(%key, "running query tick");
    let result = query_fn().await;

    let mut entries = shared.lock();
    let Some(entry) = entries.get_mut(key) else {
        return TickOutcome::Inactive;
    };
    entry.in_flight = false;
    if entry.write_epoch != epoch {
        debug!(%key, "cache written during tick; dropping result");
        return TickOutcome::Superseded;
    }

    match result {
        Ok(value) => {
            entry.state.send_modify(|s| {
                s.value = Some(value);
                s.loading = false;
                s.error = None;
                s.stale = false;
                s.updated_at_ms = Some(now_ms());
            });
            TickOutcome::Fetched
        }
        Err(err) => {
            warn!(%key, error = %format!("{err:#}"), "query tick failed");
            let fault = QueryError::from_fault(&err);
            entry.state.send_modify(|s| {
                s.loading = false;
                s.error = Some(fault);
            });
            TickOutcome::Failed
        }
    }
}
