//! Execution Engine (§4.8): sequences Reason → Act → Respond, owns task
//! lifecycle (`start_task`/`continue_task`), and applies the forced-completion
//! rule at the iteration budget.
//!
//! Grounded on `original_source/src/cogency/runtime.py`'s explicit
//! dependency-injection `run()` flow, rather than a graph runtime
//! (`graph/runtime.rs`-style) that drives an arbitrary user-defined node
//! graph — more generality than this fixed three-phase loop needs.

mod config;

pub use config::EngineConfig;

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

use crate::events::EventSink;
use crate::llm::LlmClient;
use crate::profile_learner::ProfileLearner;
use crate::react;
use crate::state::{Conversation, Execution, Profile, Role, StopReason, Workspace};
use crate::store::Store;
use crate::tools::registry::ToolRegistry;

/// Errors that can terminate `start_task`/`continue_task` before a task
/// exists. Once a task exists, failures become `stop_reason` values on
/// Execution instead (§7, §10.2).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("llm failed: {0}")]
    LlmFailed(String),
    #[error("task cancelled")]
    Cancelled,
}

/// The final outcome of a task run.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task_id: String,
    pub response: String,
    pub stop_reason: Option<StopReason>,
    pub iterations: usize,
}

/// Sequences phases and manages task lifecycle (§4.8). Holds the Store, Tool
/// Registry, and LLM adapter as explicit dependencies (§9 "Global state" —
/// no process-wide singletons).
pub struct ExecutionEngine {
    store: Arc<dyn Store>,
    tools: Arc<ToolRegistry>,
    llm: Arc<dyn LlmClient>,
    config: EngineConfig,
    /// Notified once per completed turn, after its messages are durably
    /// saved (§3, §9 "background profile learning"); absent unless the
    /// embedder opts in via [`ExecutionEngine::with_profile_learner`].
    profile_learner: Option<ProfileLearner>,
}

impl ExecutionEngine {
    pub fn new(store: Arc<dyn Store>, tools: Arc<ToolRegistry>, llm: Arc<dyn LlmClient>, config: EngineConfig) -> Self {
        Self { store, tools, llm, config, profile_learner: None }
    }

    /// Attaches a background [`ProfileLearner`] the engine notifies after
    /// each turn's conversation messages are persisted (§3, §9). Optional:
    /// an engine with none attached runs exactly as before, never learning
    /// a profile.
    pub fn with_profile_learner(mut self, learner: ProfileLearner) -> Self {
        self.profile_learner = Some(learner);
        self
    }

    /// Creates a fresh task: a `task_id`, an empty Workspace with
    /// `objective = query`, a fresh Execution, and loads (or creates) the
    /// user's Profile. Persists the empty Workspace before returning (§4.8).
    pub async fn start_task(
        &self,
        query: &str,
        user_id: &str,
        conversation_id: Option<String>,
        events: Option<tokio::sync::mpsc::Sender<stream_event::ProtocolEvent>>,
    ) -> Result<TaskOutcome, EngineError> {
        self.start_task_cancellable(query, user_id, conversation_id, events, None).await
    }

    /// As [`ExecutionEngine::start_task`], but accepts a [`CancellationToken`]
    /// the driver can signal to abort the task mid-flight (§5 "Cancellation").
    /// Checked after Reason and after Act on every iteration; a cancelled
    /// task persists whatever Workspace state the last completed phase wrote
    /// and returns `EngineError::Cancelled` without running Respond.
    pub async fn start_task_cancellable(
        &self,
        query: &str,
        user_id: &str,
        conversation_id: Option<String>,
        events: Option<tokio::sync::mpsc::Sender<stream_event::ProtocolEvent>>,
        cancel: Option<CancellationToken>,
    ) -> Result<TaskOutcome, EngineError> {
        if query.trim().is_empty() {
            return Err(EngineError::InvalidQuery("query must not be empty".to_string()));
        }

        let task_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now();

        let mut workspace = Workspace::new(&task_id, user_id, query);
        workspace.conversation_id = conversation_id.clone();
        workspace.mode = self.config.mode;

        let profile = match self.store.load_profile(user_id).await {
            Ok(p) => p,
            Err(_) => Profile::new(user_id, now),
        };

        let conversation = match &conversation_id {
            Some(id) => match self.store.load_conversation(id, user_id).await {
                Ok(c) => c,
                Err(_) => Conversation::new(id.clone(), user_id.to_string()),
            },
            None => Conversation::new(uuid::Uuid::new_v4().to_string(), user_id.to_string()),
        };

        if self.store.save_workspace(&task_id, user_id, &workspace).await.is_err() {
            tracing::warn!(task_id = %task_id, "failed to persist initial workspace");
        }

        let execution = Execution::new(self.config.max_iterations);
        let sink = EventSink::new(task_id.clone(), events);

        self.drive(workspace, execution, conversation, profile, sink, cancel).await
    }

    /// Resumes a previously started task: loads Workspace and Profile by
    /// `(task_id, user_id)`; Execution is always fresh (§3 "Execution" —
    /// never persisted).
    pub async fn continue_task(
        &self,
        task_id: &str,
        user_id: &str,
        events: Option<tokio::sync::mpsc::Sender<stream_event::ProtocolEvent>>,
    ) -> Result<TaskOutcome, EngineError> {
        self.continue_task_cancellable(task_id, user_id, events, None).await
    }

    /// As [`ExecutionEngine::continue_task`], with an optional cancellation
    /// token (§5 "Cancellation").
    pub async fn continue_task_cancellable(
        &self,
        task_id: &str,
        user_id: &str,
        events: Option<tokio::sync::mpsc::Sender<stream_event::ProtocolEvent>>,
        cancel: Option<CancellationToken>,
    ) -> Result<TaskOutcome, EngineError> {
        let workspace = self
            .store
            .load_workspace(task_id, user_id)
            .await
            .map_err(|e| EngineError::InvalidQuery(format!("no such task: {e}")))?;

        let profile = match self.store.load_profile(user_id).await {
            Ok(p) => p,
            Err(_) => Profile::new(user_id, chrono::Utc::now()),
        };

        let conversation = match &workspace.conversation_id {
            Some(id) => self
                .store
                .load_conversation(id, user_id)
                .await
                .unwrap_or_else(|_| Conversation::new(id.clone(), user_id.to_string())),
            None => Conversation::new(uuid::Uuid::new_v4().to_string(), user_id.to_string()),
        };

        let execution = Execution::new(self.config.max_iterations);
        let sink = EventSink::new(task_id.to_string(), events);

        self.drive(workspace, execution, conversation, profile, sink, cancel).await
    }

    /// The Reason → Act → Respond loop (§4.8). Each pass through Reason
    /// increments `execution.iteration`; the loop terminates as soon as
    /// Reason sets a response or a stop reason, or chooses not to act.
    ///
    /// `cancel`, when present, is checked after Reason and after Act's
    /// checkpoint save (§5 "Cancellation"). A signalled token aborts the
    /// task immediately after persisting whatever Workspace state the
    /// just-finished phase wrote, without ever running Respond; a signal
    /// that lands mid-phase is honored at the next checkpoint, since
    /// Reason/Act are the engine's own atomic units of work (§9 "Workspace
    /// is mutated by the engine loop only").
    async fn drive(
        &self,
        mut workspace: Workspace,
        mut execution: Execution,
        mut conversation: Conversation,
        mut profile: Profile,
        sink: EventSink,
        cancel: Option<CancellationToken>,
    ) -> Result<TaskOutcome, EngineError> {
        let task_id = workspace.task_id.clone();
        let user_id = workspace.user_id.clone();
        let span = info_span!("task", task_id = %task_id, user_id = %user_id);

        let is_cancelled = |cancel: &Option<CancellationToken>| cancel.as_ref().is_some_and(|c| c.is_cancelled());

        async {
            conversation.append(Role::User, &workspace.objective, chrono::Utc::now());

            loop {
                let iteration = execution.iteration as u64;
                sink.phase_start(iteration, "reason").await;
                react::reason(
                    &mut workspace,
                    &mut execution,
                    &conversation,
                    &profile,
                    self.llm.as_ref(),
                    self.tools.as_ref(),
                    self.store.as_ref(),
                    &self.config,
                    &sink,
                )
                .await;
                sink.phase_end(iteration, "reason").await;

                if is_cancelled(&cancel) {
                    return self.abort_cancelled(&task_id, &user_id, &workspace).await;
                }

                if execution.response.is_some() || execution.stop_reason.is_some() {
                    break;
                }
                if execution.pending_calls.is_empty() {
                    execution.stop_reason = Some(StopReason::NoActions);
                    break;
                }

                sink.phase_start(iteration, "act").await;
                react::act(&mut workspace, &mut execution, self.tools.as_ref(), &self.config, &sink).await;
                sink.phase_end(iteration, "act").await;

                if self.store.save_workspace(&task_id, &user_id, &workspace).await.is_err() {
                    tracing::warn!(task_id = %task_id, "failed to checkpoint workspace after act");
                }

                if is_cancelled(&cancel) {
                    return self.abort_cancelled(&task_id, &user_id, &workspace).await;
                }
            }

            sink.phase_start(execution.iteration as u64, "respond").await;
            let response = react::respond(&mut workspace, &mut execution, &mut conversation, self.llm.as_ref(), &self.config).await;
            sink.phase_end(execution.iteration as u64, "respond").await;
            sink.response(execution.iteration as u64, &response).await;

            if self.store.save_workspace(&task_id, &user_id, &workspace).await.is_err() {
                tracing::warn!(task_id = %task_id, "failed to checkpoint workspace after respond");
            }
            if self.store.save_conversation(&conversation).await.is_err() {
                tracing::warn!(task_id = %task_id, "failed to persist conversation");
            }
            // Notified only now that the turn's messages are durably saved,
            // so the learner's own conversation read is guaranteed to see them.
            self.notify_profile_learner(&user_id, &conversation.conversation_id);
            profile.last_updated = chrono::Utc::now();
            if self.store.save_profile(&user_id, &profile).await.is_err() {
                tracing::warn!(user_id = %user_id, "failed to persist profile");
            }

            Ok(TaskOutcome {
                task_id: task_id.clone(),
                response,
                stop_reason: execution.stop_reason,
                iterations: execution.iteration,
            })
        }
        .instrument(span)
        .await
    }

    fn notify_profile_learner(&self, user_id: &str, conversation_id: &str) {
        if let Some(learner) = &self.profile_learner {
            learner.notify(user_id, conversation_id);
        }
    }

    /// Persists the Workspace as last written by the just-completed phase and
    /// returns `Err(EngineError::Cancelled)`, never reaching Respond (§5).
    async fn abort_cancelled(&self, task_id: &str, user_id: &str, workspace: &Workspace) -> Result<TaskOutcome, EngineError> {
        if self.store.save_workspace(task_id, user_id, workspace).await.is_err() {
            tracing::warn!(task_id = %task_id, "failed to checkpoint workspace on cancellation");
        }
        tracing::info!(task_id = %task_id, "task cancelled");
        Err(EngineError::Cancelled)
    }
}
