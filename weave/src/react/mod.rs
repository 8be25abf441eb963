//! ReAct Execution Engine phases (§4.5-§4.7): Reason, Act, Respond. Each
//! phase is a free function taking `&mut Workspace`/`&mut Execution` plus the
//! collaborators it needs, sequenced by `crate::engine::ExecutionEngine`.

mod act;
mod reason;
mod respond;

pub use act::act;
pub use reason::reason;
pub use respond::respond;
