use std::sync::Arc;
use std::time::Duration;

use livetasks_client::{
    completed_tasks_key, subscribe_completed_tasks, subscribe_tasks, tasks_key, BackendConfig,
    LiveConfig, LiveQueryEngine, MutationError, SimulatedBackend, TaskMutations,
};
use livetasks_core::sample::sample_tasks;
use livetasks_core::{Task, TaskPatch, TaskStore};

struct Fixture {
    store: TaskStore,
    engine: LiveQueryEngine<Vec<Task>>,
    backend: Arc<SimulatedBackend>,
    mutations: TaskMutations,
}

fn fixture() -> Fixture {
    let store = TaskStore::default();
    store.insert(sample_tasks());
    let engine = LiveQueryEngine::new(LiveConfig::default());
    let backend = Arc::new(SimulatedBackend::new(store.clone(), &BackendConfig::default()));
    let mutations = TaskMutations::new(engine.clone(), Arc::clone(&backend));
    Fixture {
        store,
        engine,
        backend,
        mutations,
    }
}

fn ids(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(|t| t.id.as_str()).collect()
}

// Latency is 100ms; this leaves room for the settle and the refetch it
// triggers, and stays well before the next 1s poll.
const SETTLE: Duration = Duration::from_millis(150);

#[tokio::test(start_paused = true)]
async fn test_initial_queries_reflect_the_store() {
    let f = fixture();
    let mut all = subscribe_tasks(&f.engine, &f.store).unwrap();
    let mut done = subscribe_completed_tasks(&f.engine, &f.store).unwrap();

    let all_state = all.settled().await;
    let done_state = done.settled().await;

    let tasks = all_state.value.unwrap();
    assert_eq!(ids(&tasks), ["task-1", "task-2", "task-3"]);
    assert_eq!(ids(&done_state.value.unwrap()), ["task-3"]);
    assert_eq!(all.key(), &tasks_key());
    assert_eq!(done.key(), &completed_tasks_key());
}

#[tokio::test(start_paused = true)]
async fn test_add_is_visible_before_the_write_and_reconciled_after() {
    let f = fixture();
    let mut all = subscribe_tasks(&f.engine, &f.store).unwrap();
    all.settled().await;

    f.mutations
        .add_task(Task::with_id("task-4", "Write docs", false, 0));

    let optimistic = all.value().unwrap();
    assert_eq!(ids(&optimistic), ["task-1", "task-2", "task-3", "task-4"]);
    assert!(f.mutations.is_adding_task());
    assert_eq!(f.store.len(), 3);

    tokio::time::sleep(SETTLE).await;
    assert!(!f.mutations.is_adding_task());
    assert_eq!(f.store.len(), 4);
    let state = all.state();
    assert!(!state.stale);
    assert_eq!(state.value, Some(f.store.find_many()));
}

#[tokio::test(start_paused = true)]
async fn test_failed_add_restores_the_exact_snapshot() {
    let f = fixture();
    let mut all = subscribe_tasks(&f.engine, &f.store).unwrap();
    all.settled().await;
    let before = all.value();

    f.backend.set_failing(true);
    f.mutations.add_task(Task::with_id("task-4", "Doomed", false, 0));
    assert_eq!(all.value().map(|t| t.len()), Some(4));

    tokio::time::sleep(SETTLE).await;
    assert_eq!(all.value(), before);
    assert_eq!(f.store.len(), 3);
    assert!(!f.mutations.is_adding_task());
}

#[tokio::test(start_paused = true)]
async fn test_toggle_flows_into_the_completed_view() {
    let f = fixture();
    let mut all = subscribe_tasks(&f.engine, &f.store).unwrap();
    let mut done = subscribe_completed_tasks(&f.engine, &f.store).unwrap();
    let tasks = all.settled().await.value.unwrap();
    done.settled().await;

    f.mutations.toggle_task(&tasks[0]);
    assert!(all.value().unwrap()[0].completed);
    assert!(f.mutations.is_updating_task());
    // Only the list the mutation targets is patched optimistically.
    assert_eq!(ids(&done.value().unwrap()), ["task-3"]);

    tokio::time::sleep(SETTLE).await;
    assert!(f.store.find_many()[0].completed);
    assert_eq!(ids(&done.value().unwrap()), ["task-1", "task-3"]);
    assert!(!f.mutations.is_updating_task());
}

#[tokio::test(start_paused = true)]
async fn test_async_variants_report_the_outcome() {
    let f = fixture();
    let mut all = subscribe_tasks(&f.engine, &f.store).unwrap();
    all.settled().await;

    let added = f
        .mutations
        .add_task_async(Task::with_id("task-4", "Ship it", false, 0))
        .await
        .unwrap();
    assert_eq!(added.id, "task-4");

    let missing = f
        .mutations
        .update_task_async("task-404", TaskPatch::completed(true))
        .await;
    assert_eq!(missing, Ok(None));

    f.backend.fail_next(1);
    let err = f
        .mutations
        .update_task_async("task-1", TaskPatch::title("Renamed"))
        .await
        .unwrap_err();
    assert!(matches!(err, MutationError::Backend { op: "update task", .. }));
    assert_eq!(f.store.find_many()[0].title, "Learn TanStack DB collections");
    assert_eq!(all.value().unwrap()[0].title, "Learn TanStack DB collections");
}

#[tokio::test(start_paused = true)]
async fn test_pending_flag_holds_until_the_write_settles() {
    let f = fixture();
    let mut all = subscribe_tasks(&f.engine, &f.store).unwrap();
    all.settled().await;

    let observer = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        (f.mutations.is_adding_task(), all.value().map(|t| t.len()))
    };
    let (result, seen) = tokio::join!(
        f.mutations
            .add_task_async(Task::with_id("task-4", "Observe me", false, 0)),
        observer
    );
    assert!(result.is_ok());
    assert_eq!(seen, (true, Some(4)));
    assert!(!f.mutations.is_adding_task());
}

#[tokio::test(start_paused = true)]
async fn test_polling_picks_up_writes_made_elsewhere() {
    let f = fixture();
    let mut all = subscribe_tasks(&f.engine, &f.store).unwrap();
    all.settled().await;

    f.store.add(Task::with_id("task-9", "From another tab", false, 0));
    assert_eq!(all.value().map(|t| t.len()), Some(3));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(all.value().map(|t| t.len()), Some(4));
}

#[tokio::test(start_paused = true)]
async fn test_unwatched_views_are_collected() {
    let store = TaskStore::default();
    store.insert(sample_tasks());
    let engine = LiveQueryEngine::new(LiveConfig {
        gc_time: Duration::from_secs(2),
        gc_interval: Duration::from_millis(500),
        ..LiveConfig::default()
    });
    let gc = engine.spawn_gc();

    let mut all = subscribe_tasks(&engine, &store).unwrap();
    let mut done = subscribe_completed_tasks(&engine, &store).unwrap();
    all.settled().await;
    done.settled().await;
    drop(done);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(engine.contains(&tasks_key()));
    assert!(!engine.contains(&completed_tasks_key()));
    gc.abort();
}

#[tokio::test(start_paused = true)]
async fn test_settled_waits_for_background_writes() {
    let f = fixture();
    let mut all = subscribe_tasks(&f.engine, &f.store).unwrap();
    all.settled().await;

    f.mutations.add_task(Task::with_id("task-4", "Saved", false, 0));
    f.mutations.update_task("task-2", TaskPatch::title("Renamed"));
    assert!(f.mutations.is_adding_task());
    assert!(f.mutations.is_updating_task());

    let start = tokio::time::Instant::now();
    f.mutations.settled().await;
    assert!(start.elapsed() >= Duration::from_millis(100));
    assert!(!f.mutations.is_adding_task());
    assert!(!f.mutations.is_updating_task());
    assert_eq!(f.mutations.backend().store().len(), 4);
    assert_eq!(f.store.find_many()[1].title, "Renamed");

    let state = all.wait_until(|s| !s.stale).await;
    assert_eq!(state.value, Some(f.store.find_many()));
}
