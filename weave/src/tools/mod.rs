//! Tool Registry and Contract (§4.2) plus the Tool Scheduler (§4.3).
//!
//! A [`Tool`] is looked up by name in a [`registry::ToolRegistry`], which is
//! read-only after construction. A batch of `(name, args)` calls from Reason
//! is handed to [`scheduler::Scheduler`], which decides parallel vs. sequential
//! dispatch and aggregates the outcomes.
//!
//! Concrete product-surface tool families (`bash`, `file`, `exa`, `lsp`,
//! `skill`, `todo`, `twitter`, `web`, `memory`, `mcp_adapter`,
//! `aggregate_source`, `batch`, `conversation`, `r#trait`) are out of scope
//! here (§1) and have been dropped.

pub mod registry;
pub mod scheduler;
pub mod stub;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors a tool invocation can surface, grounded on the `ToolSourceError`
/// convention (`trait.rs`, `batch.rs`).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolSourceError {
    #[error("tool '{0}' not found")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

/// Describes a tool for prompt rendering and validation (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// Enumerated parameter descriptor, rendered verbatim into the prompt.
    pub schema: Value,
    pub examples: Vec<String>,
    pub rules: Vec<String>,
}

/// The tagged outcome of one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { data: String },
    Failure { error_message: String },
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success { .. })
    }
}

/// A `Tool` exposes metadata for prompt rendering plus `execute`.
/// Implementations should be idempotent on repeated identical calls where
/// practical (§4.2) — the core makes no retry decision of its own.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn spec(&self) -> ToolSpec;
    async fn execute(&self, args: Value) -> Result<ToolOutcome, ToolSourceError>;
}

/// One completed tool call, the value object carried in `completed_calls`
/// and the Workspace's action-fingerprint/failure history (§3, §11.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub args: Value,
    pub outcome: CallOutcome,
    pub result: Option<String>,
    pub error: Option<String>,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Success,
    Failure,
    Timeout,
    Error,
}

/// Renders a batch of calls as one human-readable line (§11.4), e.g.
/// `"shell(command=ls) | search(query=x)"`. Filters args down to a small
/// set of interesting keys rather than dumping the full argument map.
pub fn format_calls_readable(calls: &[(String, Value)]) -> String {
    const INTERESTING_KEYS: &[&str] = &["query", "url", "path", "filename", "command"];

    calls
        .iter()
        .map(|(name, args)| {
            let obj = args.as_object();
            let rendered: Vec<String> = INTERESTING_KEYS
                .iter()
                .filter_map(|key| {
                    obj.and_then(|o| o.get(*key))
                        .map(|v| format!("{}={}", key, value_as_plain(v)))
                })
                .collect();
            if rendered.is_empty() {
                name.clone()
            } else {
                format!("{}({})", name, rendered.join(", "))
            }
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

fn value_as_plain(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
