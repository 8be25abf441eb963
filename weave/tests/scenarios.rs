//! End-to-end engine scenarios exercising Reason -> Act -> Respond together,
//! beyond what `engine::tests` covers in isolation: a parallel-safe batch, a
//! dependency-forced-sequential batch, and malformed call JSON with retry.


use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use weave::llm::mock::{MockLlm, Script};
use weave::store::in_memory::InMemoryStore;
use weave::tools::registry::ToolRegistry;
use weave::tools::stub::{FakeFilesTool, FakeSearchTool, FakeShellTool};
use weave::{EngineConfig, EngineError, ExecutionEngine, StopReason};

fn registry_with_stub_tools() -> Arc<ToolRegistry> {
    let registry = ToolRegistry::new();
    let files = FakeFilesTool::new();
    let shell = FakeShellTool::with_fs(files.fs());
    registry.register(Arc::new(shell));
    registry.register(Arc::new(files));
    registry.register(Arc::new(FakeSearchTool));
    Arc::new(registry)
}

#[tokio::test]
async fn parallel_safe_batch_runs_concurrently_and_both_succeed() {
    let llm = Arc::new(MockLlm::new(vec![
        Script::Text(
            "§think:\nlooking up two things.§call:\n[{\"name\":\"search\",\"args\":{\"query\":\"x\"}},{\"name\":\"search\",\"args\":{\"query\":\"y\"}}]§execute"
                .to_string(),
        ),
        Script::Text("§respond:\nFound both.§end".to_string()),
    ]));
    let store = Arc::new(InMemoryStore::new());
    let engine = ExecutionEngine::new(store, registry_with_stub_tools(), llm, EngineConfig::default());

    let outcome = engine.start_task("search for x and y", "u1", None, None).await.unwrap();
    assert_eq!(outcome.response.trim(), "Found both.");
    assert_eq!(outcome.iterations, 2);
    assert!(outcome.stop_reason.is_none());
}

#[tokio::test]
async fn dependency_batch_forces_sequential_and_the_shell_sees_the_write() {
    let llm = Arc::new(MockLlm::new(vec![
        Script::Text(
            "§think:\nwrite then read.§call:\n[{\"name\":\"create_file\",\"args\":{\"path\":\"t.txt\",\"content\":\"hi\"}},{\"name\":\"shell\",\"args\":{\"command\":\"cat t.txt\"}}]§execute"
                .to_string(),
        ),
        Script::Text("§respond:\nThe file contains hi.§end".to_string()),
    ]));
    let store = Arc::new(InMemoryStore::new());
    let engine = ExecutionEngine::new(store, registry_with_stub_tools(), llm, EngineConfig::default());

    let outcome = engine
        .start_task("create t.txt with hi then cat it", "u1", None, None)
        .await
        .unwrap();
    assert!(outcome.response.contains("hi"));
}

#[tokio::test]
async fn malformed_call_json_retries_once_then_succeeds() {
    let llm = Arc::new(MockLlm::new(vec![
        Script::Text("§think:\nbad call.§call:\n{not valid json§execute".to_string()),
        Script::Text(
            "§think:\nfixed.§call:\n[{\"name\":\"search\",\"args\":{\"query\":\"x\"}}]§execute".to_string(),
        ),
        Script::Text("§respond:\nDone.§end".to_string()),
    ]));
    let store = Arc::new(InMemoryStore::new());
    let engine = ExecutionEngine::new(store, registry_with_stub_tools(), llm, EngineConfig::default());

    let outcome = engine.start_task("search for x", "u1", None, None).await.unwrap();
    assert_eq!(outcome.response.trim(), "Done.");
    assert!(outcome.stop_reason.is_none());
}

#[tokio::test]
async fn cancelling_before_act_stops_the_task_without_a_respond_phase() {
    let llm = Arc::new(MockLlm::new(vec![
        Script::Text(
            "§think:\nlooking up x.§call:\n[{\"name\":\"search\",\"args\":{\"query\":\"x\"}}]§execute"
                .to_string(),
        ),
        // If Act or Respond ran despite cancellation, this would be consumed
        // and the assertions below would see a real response instead of an error.
        Script::Text("§respond:\nshould never be reached.§end".to_string()),
    ]));
    let store = Arc::new(InMemoryStore::new());
    let engine = ExecutionEngine::new(store, registry_with_stub_tools(), llm, EngineConfig::default());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine
        .start_task_cancellable("search for x", "u1", None, None, Some(cancel))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
}

#[tokio::test]
async fn malformed_call_json_twice_stops_with_parse_error_exceeded() {
    let llm = Arc::new(MockLlm::new(vec![
        Script::Text("§think:\nbad call.§call:\n{not valid json§execute".to_string()),
        Script::Text("§think:\nstill bad.§call:\n{also not valid§execute".to_string()),
    ]));
    let store = Arc::new(InMemoryStore::new());
    let engine = ExecutionEngine::new(store, registry_with_stub_tools(), llm, EngineConfig::default());

    let outcome = engine.start_task("search for x", "u1", None, None).await.unwrap();
    assert_eq!(outcome.stop_reason, Some(StopReason::ParseErrorExceeded));
    assert!(!outcome.response.trim().is_empty());
}
