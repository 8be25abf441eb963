//! Tool Scheduler (§4.3): dependency heuristic, parallel/sequential dispatch,
//! aggregate result.
//!
//! Grounded primarily on `original_source/src/cogency/tools/executor.py`
//! (`needs_sequential`, `run_tools`) — an `act_node.rs`-style loop only runs
//! sequentially and has no parallel path to generalize from.

use std::time::{Duration, Instant};

use serde_json::Value;

use crate::tools::registry::ToolRegistry;
use crate::tools::{CallOutcome, ToolCall, ToolOutcome};

/// Filesystem-mutating tool names (§4.3).
const FILE_OPS: &[&str] = &["create", "create_file", "write_file", "edit_file", "delete_file"];
/// Shell-executing tool names (§4.3).
const SHELL_OPS: &[&str] = &["shell", "run_shell", "execute_command", "bash"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Parallel,
    Sequential,
}

/// The aggregate outcome of one dispatched batch (§4.3 "Aggregate output").
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub successful: Vec<ToolCall>,
    pub failures: Vec<ToolCall>,
    pub summary: String,
    pub successful_count: usize,
    pub failed_count: usize,
    pub total_executed: usize,
    pub execution_mode: ExecutionMode,
}

impl BatchResult {
    pub fn all_calls(&self) -> Vec<ToolCall> {
        let mut calls = self.successful.clone();
        calls.extend(self.failures.clone());
        calls
    }
}

/// Decides batch concurrency and aggregates outcomes. Stateless beyond the
/// `sequential_dependency_heuristic` flag, so it is cheap to construct per
/// dispatch.
pub struct Scheduler {
    sequential_dependency_heuristic: bool,
}

impl Scheduler {
    pub fn new(sequential_dependency_heuristic: bool) -> Self {
        Self { sequential_dependency_heuristic }
    }

    /// `true` if the batch mixes a filesystem mutator with a shell call
    /// (§4.3). The heuristic is conservative: no other cross-tool
    /// dependencies are inferred.
    fn needs_sequential(&self, calls: &[(String, Value)]) -> bool {
        if !self.sequential_dependency_heuristic {
            return false;
        }
        let has_file = calls.iter().any(|(name, _)| FILE_OPS.contains(&name.as_str()));
        let has_shell = calls.iter().any(|(name, _)| SHELL_OPS.contains(&name.as_str()));
        has_file && has_shell
    }

    /// Dispatches `calls` against `registry`, choosing parallel or
    /// sequential execution per [`Scheduler::needs_sequential`].
    pub async fn run(&self, registry: &ToolRegistry, calls: Vec<(String, Value)>) -> BatchResult {
        let mode = if self.needs_sequential(&calls) {
            ExecutionMode::Sequential
        } else {
            ExecutionMode::Parallel
        };

        let results = match mode {
            ExecutionMode::Sequential => self.run_sequential(registry, &calls).await,
            ExecutionMode::Parallel => self.run_parallel(registry, &calls).await,
        };

        aggregate(results, mode)
    }

    async fn run_sequential(&self, registry: &ToolRegistry, calls: &[(String, Value)]) -> Vec<ToolCall> {
        let mut out = Vec::with_capacity(calls.len());
        for (name, args) in calls {
            out.push(dispatch_one(registry, name.clone(), args.clone()).await);
        }
        out
    }

    async fn run_parallel(&self, registry: &ToolRegistry, calls: &[(String, Value)]) -> Vec<ToolCall> {
        let futures = calls
            .iter()
            .map(|(name, args)| dispatch_one(registry, name.clone(), args.clone()));
        futures::future::join_all(futures).await
    }
}

async fn dispatch_one(registry: &ToolRegistry, name: String, args: Value) -> ToolCall {
    let start = Instant::now();
    let args_for_record = args.clone();
    let outcome_result = registry.call(&name, args).await;
    let duration = start.elapsed();

    match outcome_result {
        Ok(ToolOutcome::Success { data }) => ToolCall {
            name,
            args: args_for_record,
            outcome: CallOutcome::Success,
            result: Some(data),
            error: None,
            duration,
        },
        Ok(ToolOutcome::Failure { error_message }) => ToolCall {
            name,
            args: args_for_record,
            outcome: CallOutcome::Failure,
            result: None,
            error: Some(error_message),
            duration,
        },
        Err(err) => ToolCall {
            name,
            args: args_for_record,
            outcome: CallOutcome::Error,
            result: None,
            error: Some(err.to_string()),
            duration,
        },
    }
}

fn aggregate(calls: Vec<ToolCall>, execution_mode: ExecutionMode) -> BatchResult {
    let total_executed = calls.len();
    let mut successful = Vec::new();
    let mut failures = Vec::new();
    for call in calls {
        if call.outcome == CallOutcome::Success {
            successful.push(call);
        } else {
            failures.push(call);
        }
    }
    let successful_count = successful.len();
    let failed_count = failures.len();
    let summary = format!(
        "{} of {} calls succeeded ({:?})",
        successful_count, total_executed, execution_mode
    );

    BatchResult { successful, failures, summary, successful_count, failed_count, total_executed, execution_mode }
}

/// Total wall time of a batch, purely for tracing fields (§10.1); not part
/// of any scheduling decision.
pub fn total_duration(calls: &[ToolCall]) -> Duration {
    calls.iter().map(|c| c.duration).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::stub::{EchoTool, FakeFilesTool, FakeSearchTool, FakeShellTool};
    use serde_json::json;
    use std::sync::Arc;

    fn registry_with_stub_tools() -> ToolRegistry {
        let registry = ToolRegistry::new();
        let files = FakeFilesTool::new();
        let shell = FakeShellTool::with_fs(files.fs());
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(shell));
        registry.register(Arc::new(files));
        registry.register(Arc::new(FakeSearchTool));
        registry
    }

    #[tokio::test]
    async fn parallel_safe_batch_runs_in_parallel() {
        let registry = registry_with_stub_tools();
        let scheduler = Scheduler::new(true);
        let calls = vec![
            ("search".to_string(), json!({"query": "x"})),
            ("search".to_string(), json!({"query": "y"})),
        ];
        let result = scheduler.run(&registry, calls).await;
        assert_eq!(result.execution_mode, ExecutionMode::Parallel);
        assert_eq!(result.successful_count, 2);
        assert_eq!(result.failed_count, 0);
    }

    #[tokio::test]
    async fn mutator_plus_shell_forces_sequential() {
        let registry = registry_with_stub_tools();
        let scheduler = Scheduler::new(true);
        let calls = vec![
            ("create_file".to_string(), json!({"path": "t.txt", "content": "hi"})),
            ("shell".to_string(), json!({"command": "cat t.txt"})),
        ];
        let result = scheduler.run(&registry, calls).await;
        assert_eq!(result.execution_mode, ExecutionMode::Sequential);
        assert_eq!(result.successful_count, 2);
        let shell_call = result.successful.iter().find(|c| c.name == "shell").unwrap();
        assert!(shell_call.result.as_deref().unwrap().contains("hi"));
    }

    #[tokio::test]
    async fn heuristic_can_be_disabled_by_config() {
        let registry = registry_with_stub_tools();
        let scheduler = Scheduler::new(false);
        let calls = vec![
            ("create_file".to_string(), json!({"path": "t.txt", "content": "hi"})),
            ("shell".to_string(), json!({"command": "cat t.txt"})),
        ];
        let result = scheduler.run(&registry, calls).await;
        assert_eq!(result.execution_mode, ExecutionMode::Parallel);
    }

    #[tokio::test]
    async fn unknown_tool_fails_without_cancelling_siblings() {
        let registry = registry_with_stub_tools();
        let scheduler = Scheduler::new(true);
        let calls = vec![
            ("does_not_exist".to_string(), json!({})),
            ("search".to_string(), json!({"query": "x"})),
        ];
        let result = scheduler.run(&registry, calls).await;
        assert_eq!(result.total_executed, 2);
        assert_eq!(result.successful_count, 1);
        assert_eq!(result.failed_count, 1);
        let failure = &result.failures[0];
        assert_eq!(failure.name, "does_not_exist");
        assert!(failure.error.as_deref().unwrap().contains("not found"));
    }
}
