//! Three-Horizon State model (§3): Profile (Horizon 1, user-scoped), Workspace
//! (Horizon 2, task-scoped, persisted), Execution (Horizon 3, ephemeral), plus
//! Conversation and KnowledgeArtifact.
//!
//! Generalized from a flat `messages` + per-round `tool_calls`/`tool_results`
//! state struct into three separate lifetimes: a single flat struct does not
//! distinguish "survives restart" from "discarded at task end", so this
//! module splits it.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tools::scheduler::BatchResult;
use crate::tools::ToolCall;

/// Reasoning mode (§6 Configuration, §4.5.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Fast,
    Deep,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Fast
    }
}

/// Horizon 1 — long-lived per-user attributes (§3 "Profile").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub preferences: std::collections::HashMap<String, String>,
    pub goals: Vec<String>,
    pub expertise: std::collections::HashSet<String>,
    pub projects: std::collections::HashMap<String, String>,
    pub communication_style: String,
    pub who: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub last_learned_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            preferences: Default::default(),
            goals: Vec::new(),
            expertise: Default::default(),
            projects: Default::default(),
            communication_style: "neutral".to_string(),
            who: String::new(),
            created_at: now,
            last_updated: now,
            last_learned_at: None,
        }
    }

    /// Last-writer-wins merge on `last_updated` (§3 "concurrent writers
    /// resolve by last-writer-wins").
    pub fn merge_newer(self, other: Profile) -> Profile {
        if other.last_updated >= self.last_updated {
            other
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Horizon 1 — append-only message log (§3 "Conversation").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: String,
    pub user_id: String,
    pub messages: Vec<ConversationMessage>,
}

impl Conversation {
    pub fn new(conversation_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self { conversation_id: conversation_id.into(), user_id: user_id.into(), messages: Vec::new() }
    }

    pub fn append(&mut self, role: Role, content: impl Into<String>, now: DateTime<Utc>) {
        self.messages.push(ConversationMessage { role, content: content.into(), timestamp: now });
    }
}

/// One reasoning turn recorded on the Workspace (§3 "ordered list of
/// thoughts").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thought {
    pub iteration: usize,
    pub thinking: String,
    pub planning: Option<String>,
    pub reflection: Option<String>,
    pub approach: Option<String>,
    pub tool_calls: Vec<(String, serde_json::Value)>,
    /// Set by Act after dispatch (§4.6 "record an action outcome").
    pub action_outcome: Option<ActionOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Success,
    Partial,
    Failure,
}

/// One accepted mode switch, read-only provenance (§11.2). `iteration` is
/// kept alongside `{from, to, reason}` so the cooldown in §4.5.5 can be
/// enforced without rescanning `thoughts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeSwitch {
    pub from: Mode,
    pub to: Mode,
    pub reason: String,
    pub iteration: usize,
}

/// A compact record of one past action, kept for the bounded
/// `action_fingerprints` history (§11.1) — distinct from the full `Thought`,
/// which is too large to replay repeatedly as recent-failure context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionFingerprint {
    pub iteration: usize,
    pub tool_calls: Vec<(String, serde_json::Value)>,
    pub succeeded: bool,
}

/// A failed attempt, kept in the bounded `failed_attempts` log (§11.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedAttempt {
    pub iteration: usize,
    pub tool: String,
    pub error: String,
}

/// Signal of recent tool-call trajectory quality (§11.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolQuality {
    Unknown,
    Good,
    Poor,
}

impl Default for ToolQuality {
    fn default() -> Self {
        ToolQuality::Unknown
    }
}

/// Horizon 2 — task-scoped, persisted after every phase (§3 "Workspace").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub task_id: String,
    pub user_id: String,
    pub conversation_id: Option<String>,
    pub objective: String,
    pub thoughts: Vec<Thought>,
    pub insights: std::collections::HashSet<String>,
    pub facts: std::collections::HashMap<String, String>,
    pub approach: Option<String>,
    pub mode: Mode,
    pub mode_switches: Vec<ModeSwitch>,
    pub last_tool_quality: ToolQuality,
    pub action_fingerprints: VecDeque<ActionFingerprint>,
    pub failed_attempts: VecDeque<FailedAttempt>,
    /// Caps for `action_fingerprints`/`failed_attempts` truncation (§11.1),
    /// independent of the per-turn reasoning window (§4.5.2).
    pub max_history: usize,
    pub max_failures: usize,
}

impl Workspace {
    pub fn new(task_id: impl Into<String>, user_id: impl Into<String>, objective: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            user_id: user_id.into(),
            conversation_id: None,
            objective: objective.into(),
            thoughts: Vec::new(),
            insights: Default::default(),
            facts: Default::default(),
            approach: None,
            mode: Mode::default(),
            mode_switches: Vec::new(),
            last_tool_quality: ToolQuality::default(),
            action_fingerprints: VecDeque::new(),
            failed_attempts: VecDeque::new(),
            max_history: 5,
            max_failures: 5,
        }
    }

    /// Appends a thought; `thoughts` is append-only within a task (§3
    /// invariant).
    pub fn push_thought(&mut self, thought: Thought) {
        self.thoughts.push(thought);
    }

    /// Records an accepted mode switch (§4.5.5, §11.2) and updates the
    /// current mode.
    pub fn switch_mode(&mut self, to: Mode, reason: impl Into<String>, iteration: usize) {
        let from = self.mode;
        self.mode = to;
        self.mode_switches.push(ModeSwitch { from, to, reason: reason.into(), iteration });
    }

    /// Whether a new switch is allowed at `iteration`, per the cooldown
    /// (§4.5.5 "at most once every two iterations").
    pub fn can_switch_mode(&self, iteration: usize, cooldown: usize) -> bool {
        match self.mode_switches.last() {
            Some(last) => iteration.saturating_sub(last.iteration) >= cooldown,
            None => true,
        }
    }

    /// Truncating push for the action-fingerprint history (§11.1): oldest
    /// entries silently drop off once `max_history` is exceeded.
    pub fn record_fingerprint(&mut self, fp: ActionFingerprint) {
        self.action_fingerprints.push_back(fp);
        while self.action_fingerprints.len() > self.max_history {
            self.action_fingerprints.pop_front();
        }
    }

    /// Truncating push for the failure log (§11.1).
    pub fn record_failure(&mut self, failure: FailedAttempt) {
        self.failed_attempts.push_back(failure);
        while self.failed_attempts.len() > self.max_failures {
            self.failed_attempts.pop_front();
        }
    }

    /// Updates `last_tool_quality` from one Act batch's aggregate outcome
    /// (§11.3).
    pub fn update_tool_quality(&mut self, failed_count: usize, successful_count: usize) {
        self.last_tool_quality = if failed_count == 0 && successful_count > 0 {
            ToolQuality::Good
        } else if failed_count > 0 && successful_count == 0 {
            ToolQuality::Poor
        } else {
            ToolQuality::Unknown
        };
    }

    /// Last `n` failures, for `summarize_attempts`-style forced-completion
    /// and retry context (grounded on `state.py`'s `summarize_attempts`).
    pub fn recent_failures(&self, n: usize) -> Vec<&FailedAttempt> {
        self.failed_attempts.iter().rev().take(n).collect()
    }
}

/// Horizon 3 — ephemeral, never persisted, fresh at every task start/resume
/// (§3 "Execution").
#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub iteration: usize,
    pub max_iterations: usize,
    pub pending_calls: Vec<(String, serde_json::Value)>,
    pub completed_calls: Vec<ToolCall>,
    pub stop_reason: Option<StopReason>,
    pub response: Option<String>,
    pub user_error_message: Option<String>,
    /// The most recent Act batch's aggregate outcome, read by Respond's
    /// branching (§4.7) — not part of the persisted Workspace, since
    /// Execution never persists (§3).
    pub last_batch: Option<BatchResult>,
    /// Optional JSON schema Respond's final text must conform to (§4.7
    /// "An optional JSON output schema, if configured").
    pub output_schema: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxIterations,
    NoActions,
    LlmError,
    ParseErrorExceeded,
}

impl Execution {
    pub fn new(max_iterations: usize) -> Self {
        Self { max_iterations, ..Default::default() }
    }

    pub fn is_terminal(&self) -> bool {
        self.response.is_some() || self.stop_reason.is_some()
    }
}

/// Semantic-indexed, user-scoped knowledge (§3 "KnowledgeArtifact").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeArtifact {
    pub topic: String,
    pub user_id: String,
    pub content: String,
    pub content_type: String,
    pub embedding: Option<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn profile_merge_keeps_the_newer_write() {
        let older = Profile::new("u1", now());
        let mut newer = Profile::new("u1", now());
        newer.last_updated = now() + chrono::Duration::seconds(1);
        newer.who = "updated".to_string();

        let merged = older.merge_newer(newer.clone());
        assert_eq!(merged.who, "updated");
    }

    #[test]
    fn action_fingerprint_history_truncates_from_the_front() {
        let mut ws = Workspace::new("t1", "u1", "objective");
        ws.max_history = 2;
        for i in 0..5 {
            ws.record_fingerprint(ActionFingerprint { iteration: i, tool_calls: vec![], succeeded: true });
        }
        assert_eq!(ws.action_fingerprints.len(), 2);
        assert_eq!(ws.action_fingerprints[0].iteration, 3);
        assert_eq!(ws.action_fingerprints[1].iteration, 4);
    }

    #[test]
    fn failed_attempts_truncate_independently_of_history_cap() {
        let mut ws = Workspace::new("t1", "u1", "objective");
        ws.max_failures = 1;
        ws.record_failure(FailedAttempt { iteration: 0, tool: "shell".into(), error: "boom".into() });
        ws.record_failure(FailedAttempt { iteration: 1, tool: "shell".into(), error: "boom2".into() });
        assert_eq!(ws.failed_attempts.len(), 1);
        assert_eq!(ws.failed_attempts[0].error, "boom2");
    }

    #[test]
    fn mode_switch_is_recorded_with_from_to_reason() {
        let mut ws = Workspace::new("t1", "u1", "objective");
        ws.switch_mode(Mode::Deep, "query needs multi-step planning", 0);
        assert_eq!(ws.mode, Mode::Deep);
        assert_eq!(ws.mode_switches.len(), 1);
        assert_eq!(ws.mode_switches[0].from, Mode::Fast);
        assert_eq!(ws.mode_switches[0].to, Mode::Deep);
    }

    #[test]
    fn mode_switch_cooldown_blocks_immediate_resubmission() {
        let mut ws = Workspace::new("t1", "u1", "objective");
        ws.switch_mode(Mode::Deep, "first switch", 0);
        assert!(!ws.can_switch_mode(1, 2));
        assert!(ws.can_switch_mode(2, 2));
    }

    #[test]
    fn tool_quality_reflects_aggregate_batch_outcome() {
        let mut ws = Workspace::new("t1", "u1", "objective");
        ws.update_tool_quality(0, 2);
        assert_eq!(ws.last_tool_quality, ToolQuality::Good);
        ws.update_tool_quality(2, 0);
        assert_eq!(ws.last_tool_quality, ToolQuality::Poor);
        ws.update_tool_quality(0, 0);
        assert_eq!(ws.last_tool_quality, ToolQuality::Unknown);
    }

    #[test]
    fn execution_is_terminal_when_response_or_stop_reason_set() {
        let mut ex = Execution::new(10);
        assert!(!ex.is_terminal());
        ex.stop_reason = Some(StopReason::MaxIterations);
        assert!(ex.is_terminal());
    }
}
