use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use serde_json::{json, Map, Value};

use trellis::{
    CheckpointStore, Edge, Engine, EngineConfig, GraphBuilder, MemoryCheckpointStore,
    MemoryReviewQueue, Node, NodeKind, NodeOutput, RetryBackoff, ReviewQueue, RunId,
    SqliteCheckpointStore, TrellisError, WorkflowRunner,
    WorkflowState,
};

fn update(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn setter(name: &str, key: &'static str, value: Value) -> Node {
    Node::function(name, move |_state| {
        let value = value.clone();
        async move { Ok(NodeOutput::Update(update(&[(key, value)]))) }
    })
}

fn fast_config() -> EngineConfig {
    EngineConfig {
        retry: RetryBackoff {
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        },
        ..EngineConfig::default()
    }
}

fn review_graph(breakpoint_kind: NodeKind) -> trellis::CompiledGraph {
    GraphBuilder::new()
        .add_node(setter("draft", "draft", json!("v1")))
        .unwrap()
        .add_node(setter("gate", "reviewed", json!("requested")).with_kind(breakpoint_kind))
        .unwrap()
        .add_node(setter("publish", "published", json!(true)))
        .unwrap()
        .add_edge(Edge::new("draft", "gate"))
        .add_edge(Edge::new("gate", "publish"))
        .build()
        .unwrap()
}

#[tokio::test]
async fn pause_and_resume_round_trip() {
    let queue = Arc::new(MemoryReviewQueue::new());
    let engine = Engine::new(review_graph(NodeKind::Breakpoint)).with_reviews(queue.clone());
    let run_id = RunId::from_str("run-review");

    let paused = engine
        .run(WorkflowState::new(), &run_id, None)
        .await
        .unwrap();

    assert_eq!(paused.status.as_deref(), Some("PAUSED"));
    assert!(paused.get("published").is_none());
    assert_eq!(queue.pending(), vec![run_id.clone()]);

    let resumed = engine.resume_from_queue(&run_id).await.unwrap();

    assert!(resumed.status.is_none());
    assert_eq!(resumed.get("published"), Some(&json!(true)));
    assert!(queue.pending().is_empty());

    // Same terminal state as an equivalent run with the breakpoint removed.
    let plain = Engine::new(review_graph(NodeKind::Default))
        .run(WorkflowState::new(), &RunId::new(), None)
        .await
        .unwrap();
    assert_eq!(resumed.data, plain.data);
    assert_eq!(resumed.history, plain.history);
}

#[tokio::test]
async fn breakpoint_without_queue_is_an_error() {
    let engine = Engine::new(review_graph(NodeKind::Breakpoint));
    let err = engine
        .run(WorkflowState::new(), &RunId::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, TrellisError::NoReviewQueue));
}

#[tokio::test]
async fn nested_pause_stops_the_parent_run() {
    let child_queue = Arc::new(MemoryReviewQueue::new());
    let child: Arc<dyn WorkflowRunner> = Arc::new(
        Engine::new(review_graph(NodeKind::Breakpoint)).with_reviews(child_queue.clone()),
    );

    let graph = GraphBuilder::new()
        .add_subgraph("nested", child, 0)
        .unwrap()
        .add_node(setter("announce", "announced", json!(true)))
        .unwrap()
        .add_edge(Edge::new("nested", "announce"))
        .build()
        .unwrap();

    let state = Engine::new(graph)
        .run(WorkflowState::new(), &RunId::from_str("run-nested"), None)
        .await
        .unwrap();

    // The child is pending review; nothing after the subgraph may run.
    assert_eq!(state.status.as_deref(), Some("PAUSED"));
    assert!(state.get("published").is_none());
    assert!(state.get("announced").is_none());
    assert_eq!(child_queue.pending().len(), 1);
}

#[tokio::test]
async fn resume_missing_review_entry_is_not_found() {
    let engine =
        Engine::new(review_graph(NodeKind::Breakpoint)).with_reviews(Arc::new(MemoryReviewQueue::new()));
    let err = engine
        .resume_from_queue(&RunId::from_str("ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, TrellisError::ReviewEntryNotFound(_)));
}

/// Build `prep -> work -> finish` where `work` counts its executions and
/// `finish` fails while `fail_finish` is set.
fn crashy_graph(
    work_runs: Arc<AtomicU32>,
    fail_finish: Arc<AtomicBool>,
) -> trellis::CompiledGraph {
    GraphBuilder::new()
        .add_node(setter("prep", "prepped", json!(true)))
        .unwrap()
        .add_node(Node::function("work", move |_state| {
            let runs = work_runs.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(NodeOutput::Update(update(&[("worked", json!(true))])))
            }
        }))
        .unwrap()
        .add_node(Node::function("finish", move |_state| {
            let fail = fail_finish.clone();
            async move {
                if fail.load(Ordering::SeqCst) {
                    return Err(TrellisError::Node("simulated crash".into()));
                }
                Ok(NodeOutput::Update(update(&[("finished", json!(true))])))
            }
        }))
        .unwrap()
        .add_edge(Edge::new("prep", "work"))
        .add_edge(Edge::new("work", "finish"))
        .build()
        .unwrap()
}

#[tokio::test]
async fn checkpoint_resume_is_idempotent() {
    let work_runs = Arc::new(AtomicU32::new(0));
    let fail_finish = Arc::new(AtomicBool::new(true));
    let store = Arc::new(MemoryCheckpointStore::new());

    let engine = Engine::new(crashy_graph(work_runs.clone(), fail_finish.clone()))
        .with_config(fast_config())
        .with_checkpoints(store.clone());
    let run_id = RunId::from_str("run-crash");

    // First run dies in "finish"; the last checkpoint is "work".
    let err = engine
        .run(WorkflowState::new(), &run_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, TrellisError::NodeExecution { .. }));
    assert_eq!(store.load(&run_id).unwrap().unwrap().node, "work");

    // Recover and resume: "work" must not execute a second time.
    fail_finish.store(false, Ordering::SeqCst);
    let resumed = engine.resume_from_checkpoint(&run_id).await.unwrap();

    assert_eq!(work_runs.load(Ordering::SeqCst), 1);
    assert_eq!(resumed.get("finished"), Some(&json!(true)));

    // Identical to an uninterrupted run.
    let clean_runs = Arc::new(AtomicU32::new(0));
    let clean = Engine::new(crashy_graph(clean_runs, Arc::new(AtomicBool::new(false))))
        .run(WorkflowState::new(), &RunId::new(), None)
        .await
        .unwrap();
    assert_eq!(resumed.data, clean.data);
    assert_eq!(resumed.history, clean.history);
}

#[tokio::test]
async fn sqlite_checkpoints_survive_an_engine_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("checkpoints.db");
    let work_runs = Arc::new(AtomicU32::new(0));
    let fail_finish = Arc::new(AtomicBool::new(true));
    let run_id = RunId::from_str("run-restart");

    {
        let store = Arc::new(SqliteCheckpointStore::open(&db).unwrap());
        let engine = Engine::new(crashy_graph(work_runs.clone(), fail_finish.clone()))
            .with_config(fast_config())
            .with_checkpoints(store);
        engine
            .run(WorkflowState::new(), &run_id, None)
            .await
            .unwrap_err();
    }

    // A fresh engine with a fresh store handle picks the run back up.
    fail_finish.store(false, Ordering::SeqCst);
    let store = Arc::new(SqliteCheckpointStore::open(&db).unwrap());
    let engine =
        Engine::new(crashy_graph(work_runs.clone(), fail_finish)).with_checkpoints(store);
    let resumed = engine.resume_from_checkpoint(&run_id).await.unwrap();

    assert_eq!(work_runs.load(Ordering::SeqCst), 1);
    assert_eq!(resumed.get("finished"), Some(&json!(true)));
}

#[tokio::test]
async fn resume_without_store_is_an_error() {
    let engine = Engine::new(review_graph(NodeKind::Default));
    let err = engine
        .resume_from_checkpoint(&RunId::from_str("run-x"))
        .await
        .unwrap_err();
    assert!(matches!(err, TrellisError::NoCheckpointStore));
}

#[tokio::test]
async fn resume_unknown_run_is_checkpoint_not_found() {
    let engine = Engine::new(review_graph(NodeKind::Default))
        .with_checkpoints(Arc::new(MemoryCheckpointStore::new()));
    let err = engine
        .resume_from_checkpoint(&RunId::from_str("ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, TrellisError::CheckpointNotFound(_)));
}

#[tokio::test]
async fn resume_after_final_node_returns_completed_state() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let engine = Engine::new(review_graph(NodeKind::Default))
        .with_checkpoints(store.clone())
        .with_completion_hook(|state| state.record("procedure", json!("consolidated")));
    let run_id = RunId::from_str("run-done");

    let finished = engine
        .run(WorkflowState::new(), &run_id, None)
        .await
        .unwrap();
    assert_eq!(store.load(&run_id).unwrap().unwrap().node, "publish");

    // Resuming a run whose checkpoint is its final node re-runs nothing and
    // still finishes through the completion hook.
    let resumed = engine.resume_from_checkpoint(&run_id).await.unwrap();
    assert_eq!(resumed.data, finished.data);
    assert_eq!(
        resumed
            .history
            .iter()
            .filter(|h| h.action == "procedure")
            .count(),
        1
    );
}

#[tokio::test]
async fn checkpoint_failures_never_abort_the_run() {
    struct FailingStore;
    impl trellis::CheckpointStore for FailingStore {
        fn save(&self, _cp: &trellis::Checkpoint) -> trellis::Result<()> {
            Err(TrellisError::Database("disk full".into()))
        }
        fn load(&self, _run_id: &RunId) -> trellis::Result<Option<trellis::Checkpoint>> {
            Ok(None)
        }
        fn delete(&self, _run_id: &RunId) -> trellis::Result<usize> {
            Ok(0)
        }
    }

    let engine =
        Engine::new(review_graph(NodeKind::Default)).with_checkpoints(Arc::new(FailingStore));
    let state = engine
        .run(WorkflowState::new(), &RunId::new(), None)
        .await
        .unwrap();
    assert_eq!(state.get("published"), Some(&json!(true)));
}
