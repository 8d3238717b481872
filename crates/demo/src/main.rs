#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! `livetasks`: seeds a task store, watches it through live queries and walks
//! through optimistic add, toggle and a rolled back rename.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use livetasks_client::{
    subscribe_completed_tasks, subscribe_tasks, BackendConfig, LiveConfig, LiveQuery,
    LiveQueryEngine, SimulatedBackend, TaskMutations,
};
use livetasks_core::sample::sample_tasks;
use livetasks_core::{Task, TaskPatch, TaskStore};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "livetasks", version, about = "Live task list with optimistic updates")]
struct Cli {
    /// Refetch interval of the live queries, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// How long an unwatched query stays cached, in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    gc_ms: u64,

    /// Simulated latency of every backend write, in milliseconds.
    #[arg(long, default_value_t = 100)]
    latency_ms: u64,

    /// Reject every backend write (the optimistic updates roll back).
    #[arg(long, default_value_t = false)]
    fail_writes: bool,

    /// Keep running and print the list whenever it changes, until Ctrl-C.
    #[arg(long, default_value_t = false)]
    watch: bool,
}

type Query = LiveQuery<Vec<Task>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let live = LiveConfig {
        refetch_interval: Duration::from_millis(cli.interval_ms),
        gc_time: Duration::from_millis(cli.gc_ms),
        ..LiveConfig::default()
    };
    let writes = BackendConfig {
        write_latency: Duration::from_millis(cli.latency_ms),
        fail_writes: cli.fail_writes,
    };
    info!(?live, ?writes, "starting live task list");

    let store = TaskStore::default();
    store.insert(sample_tasks());

    let engine = LiveQueryEngine::new(live);
    let gc = engine.spawn_gc();
    let backend = Arc::new(SimulatedBackend::new(store.clone(), &writes));
    let mutations = TaskMutations::new(engine.clone(), backend);

    let mut all = subscribe_tasks(&engine, &store)?;
    let mut done = subscribe_completed_tasks(&engine, &store)?;
    all.settled().await;
    done.settled().await;
    render("loaded", &all, &done, &mutations);

    let task = Task::new("Write the release notes");
    mutations.add_task(task.clone());
    render("add (optimistic)", &all, &done, &mutations);
    settle(&mut all, &mutations).await;
    render("add (settled)", &all, &done, &mutations);

    if let Some(first) = all.value().and_then(|tasks| tasks.into_iter().next()) {
        mutations.toggle_task(&first);
        render("toggle (optimistic)", &all, &done, &mutations);
        settle(&mut all, &mutations).await;
        // The completed view refetches on its own after the confirm.
        done.wait_until(|s| !s.stale).await;
        render("toggle (settled)", &all, &done, &mutations);
    }

    mutations.backend().fail_next(1);
    mutations.update_task(task.id.clone(), TaskPatch::title("Never saved"));
    render("rename (optimistic, will fail)", &all, &done, &mutations);
    settle(&mut all, &mutations).await;
    render("rename (rolled back)", &all, &done, &mutations);

    if cli.watch {
        watch(&mut all, &done, &mutations).await;
    }

    println!("{}", serde_json::to_string_pretty(&store.find_many())?);
    gc.abort();
    Ok(())
}

/// Waits until no write is pending and the list has been revalidated.
async fn settle(all: &mut Query, mutations: &TaskMutations) {
    mutations.settled().await;
    all.wait_until(|s| !s.stale).await;
}

async fn watch(all: &mut Query, done: &Query, mutations: &TaskMutations) {
    info!("watching for changes; press Ctrl-C to stop");
    let mut last = all.value();
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
            alive = all.changed() => {
                if !alive {
                    break;
                }
                let current = all.value();
                if current != last {
                    render("changed", all, done, mutations);
                    last = current;
                }
            }
        }
    }
}

fn render(label: &str, all: &Query, done: &Query, mutations: &TaskMutations) {
    let tasks = all.value().unwrap_or_default();
    let completed = done.value().map_or(0, |t| t.len());
    let saving = if mutations.is_adding_task() || mutations.is_updating_task() {
        ", saving..."
    } else {
        ""
    };
    println!("== {label}: {} tasks, {completed} completed{saving}", tasks.len());
    for task in &tasks {
        let mark = if task.completed { 'x' } else { ' ' };
        println!("  [{mark}] {:<36} {}", task.title, task.id);
    }
    if let Some(err) = all.error() {
        println!("  last refresh failed: {err}");
    }
}
