//! Act Step (§4.6): drains `pending_calls`, dispatches them through the Tool
//! Scheduler, and appends outcomes to `completed_calls`.
//!
//! Grounded on `original_source/src/cogency/phases/act.py`'s drain-then-dispatch
//! shape, generalized to delegate dispatch to a standalone scheduler rather
//! than looping tool calls sequentially in place.

use crate::engine::EngineConfig;
use crate::events::EventSink;
use crate::react::reason::record_action_outcome;
use crate::state::{ActionFingerprint, ActionOutcome, Execution, Workspace};
use crate::tools::registry::ToolRegistry;
use crate::tools::scheduler::Scheduler;
use crate::tools::CallOutcome;

/// Executes the batch of calls Reason set in `execution.pending_calls`
/// (§4.6). A no-op when the batch is empty. Act never decides whether the
/// loop continues — that is Reason's responsibility on the next turn.
pub async fn act(workspace: &mut Workspace, execution: &mut Execution, tools: &ToolRegistry, config: &EngineConfig, sink: &EventSink) {
    if execution.pending_calls.is_empty() {
        return;
    }

    let calls = std::mem::take(&mut execution.pending_calls);
    let scheduler = Scheduler::new(config.sequential_dependency_heuristic);
    let iteration = execution.iteration as u64;
    let result = scheduler.run(tools, calls).await;
    execution.last_batch = Some(result.clone());

    for call in result.all_calls() {
        let outcome_label = match call.outcome {
            CallOutcome::Success => "success",
            CallOutcome::Failure => "failure",
            CallOutcome::Timeout => "timeout",
            CallOutcome::Error => "error",
        };
        sink.call_result(iteration, &call.name, outcome_label, call.duration).await;

        workspace.record_fingerprint(ActionFingerprint {
            iteration: execution.iteration,
            tool_calls: vec![(call.name.clone(), call.args.clone())],
            succeeded: call.outcome == CallOutcome::Success,
        });
        if call.outcome != CallOutcome::Success {
            if let Some(err) = &call.error {
                workspace.record_failure(crate::state::FailedAttempt {
                    iteration: execution.iteration,
                    tool: call.name.clone(),
                    error: err.clone(),
                });
            }
        }
        execution.completed_calls.push(call);
    }

    sink.tool_event(
        iteration,
        match result.execution_mode {
            crate::tools::scheduler::ExecutionMode::Parallel => "parallel",
            crate::tools::scheduler::ExecutionMode::Sequential => "sequential",
        },
        result.successful_count,
        result.failed_count,
    )
    .await;

    workspace.update_tool_quality(result.failed_count, result.successful_count);

    let outcome = if result.failed_count == 0 {
        ActionOutcome::Success
    } else if result.successful_count == 0 {
        ActionOutcome::Failure
    } else {
        ActionOutcome::Partial
    };
    record_action_outcome(workspace, outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::stub::{FakeSearchTool, FakeShellTool};
    use serde_json::json;
    use std::sync::Arc;

    fn workspace_with_one_thought() -> Workspace {
        let mut ws = Workspace::new("t1", "u1", "objective");
        ws.push_thought(crate::state::Thought {
            iteration: 0,
            thinking: "thinking".to_string(),
            planning: None,
            reflection: None,
            approach: None,
            tool_calls: vec![("search".to_string(), json!({"query": "x"}))],
            action_outcome: None,
        });
        ws
    }

    #[tokio::test]
    async fn empty_pending_calls_is_a_no_op() {
        let mut ws = workspace_with_one_thought();
        let mut ex = Execution::new(10);
        let registry = ToolRegistry::new();
        let sink = EventSink::discarding("t1");
        act(&mut ws, &mut ex, &registry, &EngineConfig::default(), &sink).await;
        assert!(ex.completed_calls.is_empty());
    }

    #[tokio::test]
    async fn successful_batch_appends_completed_calls_and_marks_outcome_success() {
        let mut ws = workspace_with_one_thought();
        let mut ex = Execution::new(10);
        ex.pending_calls = vec![("search".to_string(), json!({"query": "x"}))];
        let registry = ToolRegistry::new();
        registry.register(Arc::new(FakeSearchTool));
        let sink = EventSink::discarding("t1");

        act(&mut ws, &mut ex, &registry, &EngineConfig::default(), &sink).await;

        assert_eq!(ex.completed_calls.len(), 1);
        assert!(ex.pending_calls.is_empty());
        assert_eq!(ws.thoughts.last().unwrap().action_outcome, Some(ActionOutcome::Success));
    }

    #[tokio::test]
    async fn unknown_tool_in_batch_fails_without_cancelling_siblings() {
        let mut ws = workspace_with_one_thought();
        let mut ex = Execution::new(10);
        ex.pending_calls = vec![
            ("does_not_exist".to_string(), json!({})),
            ("search".to_string(), json!({"query": "x"})),
        ];
        let registry = ToolRegistry::new();
        registry.register(Arc::new(FakeSearchTool));
        let sink = EventSink::discarding("t1");

        act(&mut ws, &mut ex, &registry, &EngineConfig::default(), &sink).await;

        assert_eq!(ex.completed_calls.len(), 2);
        assert_eq!(ws.thoughts.last().unwrap().action_outcome, Some(ActionOutcome::Partial));
    }

    #[tokio::test]
    async fn dependency_batch_runs_sequentially_and_updates_fingerprints() {
        let mut ws = workspace_with_one_thought();
        let mut ex = Execution::new(10);
        ex.pending_calls = vec![
            ("create_file".to_string(), json!({"path": "t.txt", "content": "hi"})),
            ("shell".to_string(), json!({"command": "cat t.txt"})),
        ];
        let registry = ToolRegistry::new();
        let files = crate::tools::stub::FakeFilesTool::new();
        let shell = FakeShellTool::with_fs(files.fs());
        registry.register(Arc::new(files));
        registry.register(Arc::new(shell));
        let sink = EventSink::discarding("t1");

        act(&mut ws, &mut ex, &registry, &EngineConfig::default(), &sink).await;

        assert_eq!(ws.action_fingerprints.len(), 2);
        assert_eq!(ex.completed_calls.len(), 2);
    }
}
