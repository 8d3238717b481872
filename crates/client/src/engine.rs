//! Live query engine: runs query functions on a fixed cadence and caches their
//! latest result per [`QueryKey`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use livetasks_core::{now_ms, EpochMs};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::LiveConfig;
use crate::error::{EngineError, QueryError};
use crate::key::QueryKey;
use crate::scheduler::{self, TickOutcome};

/// Boxed future returned by a query function.
pub type QueryFuture<T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send>>;

/// Type-erased query function.
pub type QueryFn<T> = Arc<dyn Fn() -> QueryFuture<T> + Send + Sync>;

/// Cached result of one query plus its status.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    /// Last successful value, or the latest optimistic write.
    pub value: Option<T>,
    /// True until the first tick completes.
    pub loading: bool,
    /// Fault of the most recent tick, cleared by the next successful one.
    pub error: Option<QueryError>,
    /// When `value` was last replaced.
    pub updated_at_ms: Option<EpochMs>,
    /// Invalidated and waiting for a fresh tick.
    pub stale: bool,
}

impl<T> QueryState<T> {
    fn pending() -> Self {
        Self {
            value: None,
            loading: true,
            error: None,
            updated_at_ms: None,
            stale: false,
        }
    }

    fn idle() -> Self {
        Self {
            loading: false,
            ..Self::pending()
        }
    }
}

pub(crate) struct Entry<T> {
    pub(crate) state: watch::Sender<QueryState<T>>,
    pub(crate) query_fn: Option<QueryFn<T>>,
    pub(crate) subscribers: usize,
    pub(crate) idle_since: Option<Instant>,
    pub(crate) in_flight: bool,
    /// Generation of the poller currently allowed to run, if any.
    pub(crate) poller: Option<u64>,
    pub(crate) next_poller: u64,
    /// Bumped by direct cache writes; a tick that started under an older epoch
    /// drops its result.
    pub(crate) write_epoch: u64,
}

impl<T> Entry<T> {
    fn new(state: QueryState<T>) -> Self {
        let (tx, _rx) = watch::channel(state);
        Self {
            state: tx,
            query_fn: None,
            subscribers: 0,
            idle_since: Some(Instant::now()),
            in_flight: false,
            poller: None,
            next_poller: 0,
            write_epoch: 0,
        }
    }
}

pub(crate) struct Shared<T> {
    pub(crate) config: LiveConfig,
    pub(crate) entries: Mutex<HashMap<QueryKey, Entry<T>>>,
}

impl<T> Shared<T> {
    // Critical sections never await and leave the map consistent, so a poisoned
    // lock is still usable.
    pub(crate) fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Query cache with polling readers.
///
/// Cloning is cheap and shares the cache. Subscribing spawns Tokio tasks, so
/// it must happen inside a Tokio runtime.
pub struct LiveQueryEngine<T> {
    pub(crate) shared: Arc<Shared<T>>,
}

impl<T> Clone for LiveQueryEngine<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

enum Start {
    Poller(u64),
    Refetch,
}

impl<T> LiveQueryEngine<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty cache. Nothing is spawned until the first subscription.
    pub fn new(config: LiveConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Subscribes with the configured default interval.
    pub fn subscribe<F, Fut>(&self, key: QueryKey, query_fn: F) -> Result<LiveQuery<T>, EngineError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let interval = self.shared.config.refetch_interval;
        self.subscribe_every(key, query_fn, interval)
    }

    /// Registers `query_fn` under `key`, refetched every `interval`.
    ///
    /// The first execution starts right away. If `key` is already polled, its
    /// slot is reused: the latest `query_fn` replaces the old one, the existing
    /// cadence is kept and an immediate refetch is requested instead.
    pub fn subscribe_every<F, Fut>(
        &self,
        key: QueryKey,
        query_fn: F,
        interval: Duration,
    ) -> Result<LiveQuery<T>, EngineError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        if interval.is_zero() {
            return Err(EngineError::ZeroInterval);
        }
        let query_fn: QueryFn<T> = Arc::new(move || Box::pin(query_fn()) as QueryFuture<T>);

        let (rx, start) = {
            let mut entries = self.shared.lock();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Entry::new(QueryState::pending()));
            entry.query_fn = Some(query_fn);
            entry.subscribers += 1;
            entry.idle_since = None;
            let empty = entry.state.borrow().value.is_none();
            if empty {
                entry.state.send_modify(|s| s.loading = true);
            }

            let start = if entry.poller.is_some() {
                Start::Refetch
            } else {
                entry.next_poller += 1;
                entry.poller = Some(entry.next_poller);
                Start::Poller(entry.next_poller)
            };
            (entry.state.subscribe(), start)
        };

        match start {
            Start::Poller(generation) => {
                debug!(%key, interval_ms = interval.as_millis() as u64, "starting poller");
                scheduler::spawn_poller(Arc::clone(&self.shared), key.clone(), interval, generation);
            }
            Start::Refetch => {
                debug!(%key, "reusing cached query");
                scheduler::spawn_refetch(Arc::clone(&self.shared), key.clone());
            }
        }

        Ok(LiveQuery {
            shared: Arc::clone(&self.shared),
            key,
            rx,
        })
    }

    /// Snapshot of the cached state of `key`.
    pub fn query_state(&self, key: &QueryKey) -> Option<QueryState<T>> {
        self.shared.lock().get(key).map(|e| e.state.borrow().clone())
    }

    /// Cached value of `key`, if any.
    pub fn query_data(&self, key: &QueryKey) -> Option<T> {
        self.shared
            .lock()
            .get(key)
            .and_then(|e| e.state.borrow().value.clone())
    }

    /// Replaces the cached value of `key`, creating the slot if needed.
    /// Subscribers see the new value immediately.
    pub fn set_query_data(&self, key: &QueryKey, value: T) {
        let mut entries = self.shared.lock();
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(QueryState::idle()));
        entry.state.send_modify(|s| {
            s.value = Some(value);
            s.loading = false;
            s.updated_at_ms = Some(now_ms());
        });
    }

    /// Puts back a value captured earlier with [`query_data`](Self::query_data),
    /// including "no value".
    pub fn restore_query_data(&self, key: &QueryKey, value: Option<T>) {
        match value {
            Some(value) => self.set_query_data(key, value),
            None => {
                if let Some(entry) = self.shared.lock().get(key) {
                    entry.state.send_modify(|s| s.value = None);
                }
            }
        }
    }

    /// Makes any tick already running for `key` discard its result when it
    /// lands. Ticks started afterwards are unaffected.
    pub fn cancel_in_flight(&self, key: &QueryKey) {
        if let Some(entry) = self.shared.lock().get_mut(key) {
            if entry.in_flight {
                debug!(%key, "superseding in-flight tick");
            }
            entry.write_epoch += 1;
        }
    }

    /// Marks every query whose key starts with `prefix` as stale and refetches
    /// the ones that have subscribers. Unwatched ones refetch on their next
    /// subscription.
    pub fn invalidate(&self, prefix: &QueryKey) {
        let active: Vec<QueryKey> = {
            let entries = self.shared.lock();
            entries
                .iter()
                .filter(|(key, _)| key.starts_with(prefix))
                .filter_map(|(key, entry)| {
                    entry.state.send_modify(|s| s.stale = true);
                    (entry.subscribers > 0).then(|| key.clone())
                })
                .collect()
        };
        for key in active {
            debug!(%key, "invalidated; refetching");
            scheduler::spawn_refetch(Arc::clone(&self.shared), key);
        }
    }

    /// Runs one tick for `key` now and waits for it.
    pub async fn refetch(&self, key: &QueryKey) -> TickOutcome {
        scheduler::run_tick(&self.shared, key).await
    }

    /// True while `key` has a cache slot (watched, or idle and not evicted yet).
    pub fn contains(&self, key: &QueryKey) -> bool {
        self.shared.lock().contains_key(key)
    }

    /// Live handles currently watching `key`.
    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        self.shared.lock().get(key).map_or(0, |e| e.subscribers)
    }

    /// Number of cached queries.
    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.shared.lock().is_empty()
    }
}

/// A consumer's view of one live query.
///
/// Dropping the last handle for a key stops its polling; the cached value stays
/// until garbage collection evicts it.
pub struct LiveQuery<T> {
    shared: Arc<Shared<T>>,
    key: QueryKey,
    rx: watch::Receiver<QueryState<T>>,
}

impl<T> LiveQuery<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Key this handle watches.
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Snapshot of the cached state.
    pub fn state(&self) -> QueryState<T> {
        self.rx.borrow().clone()
    }

    /// Cached value, if any.
    pub fn value(&self) -> Option<T> {
        self.rx.borrow().value.clone()
    }

    /// True until the first tick completes.
    pub fn is_loading(&self) -> bool {
        self.rx.borrow().loading
    }

    /// Fault of the latest tick, if it failed.
    pub fn error(&self) -> Option<QueryError> {
        self.rx.borrow().error.clone()
    }

    /// Waits for the next change of the cached state. Returns `false` if the
    /// slot is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Waits until `predicate` holds for the cached state (checked against the
    /// current state first) and returns that state.
    ///
    /// If the slot is evicted meanwhile, returns the last state seen.
    pub async fn wait_until<P>(&mut self, predicate: P) -> QueryState<T>
    where
        P: FnMut(&QueryState<T>) -> bool,
    {
        if let Ok(state) = self.rx.wait_for(predicate).await {
            return state.clone();
        }
        self.rx.borrow().clone()
    }

    /// Waits until the first tick has completed.
    pub async fn settled(&mut self) -> QueryState<T> {
        self.wait_until(|s| !s.loading).await
    }

    /// Runs one tick for this key now and waits for it.
    pub async fn refetch(&self) -> TickOutcome {
        scheduler::run_tick(&self.shared, &self.key).await
    }
}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        let mut entries = self.shared.lock();
        let Some(entry) = entries.get_mut(&self.key) else {
            return;
        };
        entry.subscribers = entry.subscribers.saturating_sub(1);
        if entry.subscribers == 0 {
            entry.poller = None;
            entry.idle_since = Some(Instant::now());
            info!(key = %self.key, "last subscriber left; polling stopped");
        }
    }
}
