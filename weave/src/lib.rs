//! # Weave
//!
//! A streaming ReAct agent runtime: a delimited LLM token-stream protocol
//! parser, a Reason/Act/Respond execution engine with iteration budgeting
//! and forced completion, a three-horizon state model (Profile/Conversation,
//! Workspace, Execution), and a tool registry with a parallel/sequential
//! dispatch scheduler.
//!
//! ## Design principles
//!
//! - **Typed decisions, not stringly-typed JSON**: the parser turns the
//!   LLM's delimited output into a small set of [`parser::ParseEvent`]s;
//!   Reason resolves those into a typed `Direct`/`Actions`/`ParseError`
//!   decision rather than branching on raw strings.
//! - **Lifetime-partitioned state**: [`state::Profile`] and
//!   [`state::Conversation`] outlive a task, [`state::Workspace`] is
//!   task-scoped and persisted every phase, [`state::Execution`] is rebuilt
//!   fresh on every start/resume and never persisted.
//! - **No process-wide singletons**: the Store, Tool Registry, and LLM
//!   adapter are passed into [`engine::ExecutionEngine`] as explicit
//!   dependencies.
//! - **Collaborators are abstract**: concrete LLM providers, storage
//!   backends, and product-surface tools are out of scope here; this crate
//!   defines the traits ([`llm::LlmClient`], [`store::Store`], [`tools::Tool`])
//!   and ships a scripted mock of each for its own tests.
//!
//! ## Main modules
//!
//! - [`parser`]: [`parser::Parser`], [`parser::ParseEvent`], [`parser::parse_tokens`] — the
//!   Protocol Parser (§4.1), turning a token stream into typed events.
//! - [`engine`]: [`engine::ExecutionEngine`], [`engine::EngineConfig`], [`engine::EngineError`],
//!   [`engine::TaskOutcome`] — sequences Reason → Act → Respond and owns task lifecycle.
//! - [`react`]: [`react::reason`], [`react::act`], [`react::respond`] — the three phase functions
//!   the engine drives each iteration.
//! - [`state`]: [`state::Profile`], [`state::Conversation`], [`state::Workspace`],
//!   [`state::Execution`], [`state::KnowledgeArtifact`] — the three-horizon state model.
//! - [`store`]: [`store::Store`] trait plus [`store::in_memory::InMemoryStore`].
//! - [`tools`]: [`tools::Tool`] trait, [`tools::registry::ToolRegistry`],
//!   [`tools::scheduler::Scheduler`] — tool contract, registry, and dispatch.
//! - [`llm`]: [`llm::LlmClient`] trait, [`llm::Message`], [`llm::MockLlm`].
//! - [`events`]: [`events::EventSink`] — wraps `stream-event`'s typed event stream.
//! - [`profile_learner`]: [`profile_learner::ProfileLearner`] — the background worker that
//!   re-synthesizes a user's Profile once its message cadence threshold is crossed.
//! - [`error`]: the ambient error vocabulary re-exported in one place.

pub mod engine;
pub mod error;
pub mod events;
pub mod llm;
pub mod parser;
pub mod profile_learner;
pub mod react;
pub mod state;
pub mod store;
pub mod tools;

pub use engine::{EngineConfig, EngineError, ExecutionEngine, TaskOutcome};
pub use events::EventSink;
pub use llm::{LlmClient, LlmSession, Message, MockLlm, TokenStream};
pub use parser::{parse_tokens, ParseEvent, Parser, ParserError, Token};
pub use profile_learner::{MessageAppended, ProfileLearner};
pub use state::{
    ActionFingerprint, ActionOutcome, Conversation, ConversationMessage, Execution, FailedAttempt,
    KnowledgeArtifact, Mode, ModeSwitch, Profile, Role, StopReason, Thought, ToolQuality, Workspace,
};
pub use store::in_memory::InMemoryStore;
pub use store::{KnowledgeHit, Store, StoreError};
pub use tools::registry::ToolRegistry;
pub use tools::scheduler::{BatchResult, ExecutionMode as ToolExecutionMode, Scheduler};
pub use tools::{format_calls_readable, CallOutcome, Tool, ToolCall, ToolOutcome, ToolSourceError, ToolSpec};
