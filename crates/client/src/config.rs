use std::time::Duration;

/// Live query engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveConfig {
    /// Default refetch cadence for [`LiveQueryEngine::subscribe`](crate::LiveQueryEngine::subscribe).
    pub refetch_interval: Duration,
    /// How long a query without subscribers stays cached before eviction.
    pub gc_time: Duration,
    /// How often the garbage collector sweeps.
    pub gc_interval: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            refetch_interval: Duration::from_millis(1000),
            gc_time: Duration::from_secs(30),
            gc_interval: Duration::from_secs(5),
        }
    }
}

/// Simulated backend settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Delay applied to every write before it reaches the store.
    pub write_latency: Duration,
    /// Start with every write failing.
    pub fail_writes: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            write_latency: Duration::from_millis(100),
            fail_writes: false,
        }
    }
}
