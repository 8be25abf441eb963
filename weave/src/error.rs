//! Ambient error vocabulary (§10.2): one `thiserror`-derived enum per
//! fallible boundary, re-exported here for callers that want the whole
//! vocabulary in one place. None of these cross a running task boundary
//! (§7) — they construct the `stop_reason`/event-payload values that do.
//!
//! Grounded on the `AgentError` (`graphweave/src/error.rs`) and
//! `CheckpointError` (`memory/checkpointer.rs`) style: one variant per
//! distinct cause, `#[error("...: {0}")]` messages, `Display`-tested inline.

pub use crate::engine::EngineError;
pub use crate::parser::ParserError;
pub use crate::store::StoreError;
pub use crate::tools::ToolSourceError;
