//! Store Interface (§4.4): abstract persistence for Profile, Conversation,
//! Workspace, and KnowledgeArtifact, plus an in-memory reference
//! implementation.
//!
//! Grounded on the `Checkpointer<S>` trait shape (per-key async discipline,
//! typed `CheckpointError`) and the `memory::Store`/`Namespace` key-naming
//! convention, generalized from a single checkpoint key to four distinct
//! entity kinds and their own key shapes (§6 "Persisted state layout").

pub mod in_memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::state::{Conversation, KnowledgeArtifact, Profile, Workspace};

/// Errors a Store operation can surface. Per §4.4/§7, a Store never raises
/// across the engine — callers downgrade `Err` to a logged warning (writes)
/// or an absent value (`NotFound` on load).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// A scored knowledge search hit (§4.4 `search_knowledge`).
#[derive(Debug, Clone)]
pub struct KnowledgeHit {
    pub artifact: KnowledgeArtifact,
    pub score: f32,
}

/// Abstract persistence for the three-horizon entities (§4.4). Concrete
/// backends (filesystem/SQLite/Postgres/cloud KV) are out of scope (§1); only
/// the trait and an in-memory reference implementation live here.
#[async_trait]
pub trait Store: Send + Sync {
    async fn save_profile(&self, user_key: &str, profile: &Profile) -> Result<(), StoreError>;
    async fn load_profile(&self, user_key: &str) -> Result<Profile, StoreError>;
    async fn delete_profile(&self, user_key: &str) -> Result<(), StoreError>;

    async fn save_conversation(&self, conv: &Conversation) -> Result<(), StoreError>;
    async fn load_conversation(&self, id: &str, user: &str) -> Result<Conversation, StoreError>;
    async fn delete_conversation(&self, id: &str, user: &str) -> Result<(), StoreError>;

    async fn save_workspace(&self, task_id: &str, user: &str, ws: &Workspace) -> Result<(), StoreError>;
    async fn load_workspace(&self, task_id: &str, user: &str) -> Result<Workspace, StoreError>;
    async fn delete_workspace(&self, task_id: &str, user: &str) -> Result<(), StoreError>;
    async fn list_workspaces(&self, user: &str) -> Result<Vec<String>, StoreError>;

    async fn save_knowledge(&self, artifact: &KnowledgeArtifact) -> Result<(), StoreError>;
    async fn search_knowledge(
        &self,
        query: &str,
        user: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<KnowledgeHit>, StoreError>;
    async fn load_knowledge(&self, topic: &str, user: &str) -> Result<KnowledgeArtifact, StoreError>;
    async fn delete_knowledge(&self, topic: &str, user: &str) -> Result<(), StoreError>;
}
