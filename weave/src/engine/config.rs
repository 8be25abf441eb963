//! `EngineConfig` (§6 "Configuration", §10.3): the configuration surface the
//! core recognizes, materialized as a plain struct constructed by the
//! embedder and passed into the Execution Engine as an explicit dependency —
//! not loaded from the environment by the core itself (see DESIGN.md for why
//! the `config` crate, an XDG-directory/`.env` loader, was dropped).

use serde::{Deserialize, Serialize};

use crate::state::Mode;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    pub max_iterations: usize,
    pub mode: Mode,
    pub knowledge_retrieval_threshold: f32,
    pub automatic_retrieval_topk: usize,
    pub mode_switch_cooldown_iters: usize,
    /// Message-count cadence the background [`crate::profile_learner::ProfileLearner`]
    /// (§9 "Background profile learning") re-learns a profile at; the engine
    /// itself only reads the other six fields.
    pub profile_learning_cadence_messages: usize,
    pub sequential_dependency_heuristic: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            mode: Mode::Fast,
            knowledge_retrieval_threshold: 0.75,
            automatic_retrieval_topk: 2,
            mode_switch_cooldown_iters: 2,
            profile_learning_cadence_messages: 5,
            sequential_dependency_heuristic: true,
        }
    }
}
