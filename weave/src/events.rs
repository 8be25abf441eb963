//! Event stream emission (§6 "Event stream (produced)").
//!
//! Wraps the `stream-event` crate's typed [`ProtocolEvent`] in a thin sink the
//! engine can hand to each phase; a dropped/disinterested receiver is not an
//! error (grounded on the `let _ = tx.send(...)` streaming convention used by
//! `invoke_stream`'s default implementation).

use std::time::Duration;

use stream_event::ProtocolEvent;
use tokio::sync::mpsc;

/// Emits [`ProtocolEvent`]s for one task onto an (optional) output channel.
/// Backpressure from a bounded channel is a suspension point (§5).
#[derive(Clone)]
pub struct EventSink {
    tx: Option<mpsc::Sender<ProtocolEvent>>,
    task_id: String,
}

impl EventSink {
    pub fn new(task_id: impl Into<String>, tx: Option<mpsc::Sender<ProtocolEvent>>) -> Self {
        Self { tx, task_id: task_id.into() }
    }

    /// A sink that discards every event; useful for tests that don't assert
    /// on the stream.
    pub fn discarding(task_id: impl Into<String>) -> Self {
        Self::new(task_id, None)
    }

    async fn emit(&self, event: ProtocolEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event).await;
        }
    }

    pub async fn phase_start(&self, iteration: u64, phase: &str) {
        self.emit(ProtocolEvent::PhaseStart { task_id: self.task_id.clone(), iteration, phase: phase.to_string() })
            .await;
    }

    pub async fn phase_end(&self, iteration: u64, phase: &str) {
        self.emit(ProtocolEvent::PhaseEnd { task_id: self.task_id.clone(), iteration, phase: phase.to_string() })
            .await;
    }

    pub async fn think(&self, iteration: u64, content: &str) {
        self.emit(ProtocolEvent::Think {
            task_id: self.task_id.clone(),
            iteration,
            content: content.to_string(),
        })
        .await;
    }

    pub async fn call_planned(&self, iteration: u64, name: &str, args: serde_json::Value) {
        self.emit(ProtocolEvent::CallPlanned { task_id: self.task_id.clone(), iteration, name: name.to_string(), args })
            .await;
    }

    pub async fn call_result(&self, iteration: u64, name: &str, outcome: &str, duration: Duration) {
        self.emit(ProtocolEvent::CallResult {
            task_id: self.task_id.clone(),
            iteration,
            name: name.to_string(),
            outcome: outcome.to_string(),
            duration_ms: duration.as_millis() as u64,
        })
        .await;
    }

    pub async fn tool_event(&self, iteration: u64, execution_mode: &str, successful_count: usize, failed_count: usize) {
        self.emit(ProtocolEvent::ToolEvent {
            task_id: self.task_id.clone(),
            iteration,
            execution_mode: execution_mode.to_string(),
            successful_count,
            failed_count,
        })
        .await;
    }

    pub async fn error(&self, iteration: u64, message: &str) {
        self.emit(ProtocolEvent::Error { task_id: self.task_id.clone(), iteration, message: message.to_string() })
            .await;
    }

    pub async fn response(&self, iteration: u64, content: &str) {
        self.emit(ProtocolEvent::Response {
            task_id: self.task_id.clone(),
            iteration,
            content: content.to_string(),
        })
        .await;
    }
}
