//! Protocol-level event types (§6 "Event stream (produced)").
//! Every phase and every tool call emits one of these to the task's output
//! channel, each carrying its own `task_id` and `iteration`.
//!
//! Trimmed from a graph-oriented event set (`NodeEnter`/`NodeExit`/
//! `Values`/`Updates`/`Checkpoint` plus Tree-of-Thought/Graph-of-Thought-specific
//! variants) down to the runtime's own fixed vocabulary: `{phase_start,
//! phase_end, think, call_planned, call_result, tool_event, error, response}`.

use serde::Serialize;
use serde_json::Value;

/// One event on a task's output stream. Every variant carries `task_id` and
/// `iteration` (§6 "Each event carries task_id, iteration, and a structured
/// payload"); downstream formatters render these for humans, the core does
/// not format (§6).
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    PhaseStart { task_id: String, iteration: u64, phase: String },
    PhaseEnd { task_id: String, iteration: u64, phase: String },
    Think { task_id: String, iteration: u64, content: String },
    CallPlanned { task_id: String, iteration: u64, name: String, args: Value },
    CallResult {
        task_id: String,
        iteration: u64,
        name: String,
        outcome: String,
        duration_ms: u64,
    },
    ToolEvent {
        task_id: String,
        iteration: u64,
        execution_mode: String,
        successful_count: usize,
        failed_count: usize,
    },
    Error { task_id: String, iteration: u64, message: String },
    Response { task_id: String, iteration: u64, content: String },
}

impl ProtocolEvent {
    /// Serializes this event to a JSON object (type + payload).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
