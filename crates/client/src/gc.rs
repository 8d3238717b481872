use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, Instant};
use tracing::{debug, info};

use crate::engine::LiveQueryEngine;

const MIN_GC_INTERVAL: Duration = Duration::from_millis(10);

impl<T> LiveQueryEngine<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Evicts cached queries that have had no subscriber for at least
    /// `gc_time` and no tick in flight. Returns how many were evicted.
    pub fn collect_garbage(&self) -> usize {
        let gc_time = self.shared.config.gc_time;
        let now = Instant::now();
        let mut entries = self.shared.lock();
        let before = entries.len();
        entries.retain(|key, entry| {
            let expired = entry.subscribers == 0
                && !entry.in_flight
                && entry
                    .idle_since
                    .is_some_and(|since| now.duration_since(since) >= gc_time);
            if expired {
                info!(%key, "evicting idle query");
            }
            !expired
        });
        before - entries.len()
    }

    /// Sweeps every `gc_interval` until the engine is dropped.
    pub fn spawn_gc(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.shared);
        let period = self.shared.config.gc_interval.max(MIN_GC_INTERVAL);
        tokio::spawn(async move {
            let mut tick = interval(period);
            loop {
                tick.tick().await;
                let Some(shared) = weak.upgrade() else {
                    debug!("engine dropped; gc stopped");
                    break;
                };
                let evicted = LiveQueryEngine { shared }.collect_garbage();
                if evicted > 0 {
                    debug!(evicted, "gc tick");
                }
            }
        })
    }
}
