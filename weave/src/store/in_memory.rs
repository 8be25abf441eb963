//! In-memory reference `Store` implementation (§4.4 "Reference
//! implementation"): per-key async locking via a lock map alongside the data
//! map (never holding a `DashMap` shard guard across an `.await`), and a
//! deterministic, dependency-free bag-of-words cosine similarity search.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::state::{Conversation, KnowledgeArtifact, Profile, Workspace};
use crate::store::{KnowledgeHit, Store, StoreError};

/// A name-spaced keyed map with one `tokio::sync::Mutex` per key, so
/// concurrent writers to the same key serialize while distinct keys proceed
/// independently (§4.4 "Concurrency").
struct KeyedStore<T> {
    locks: DashMap<String, Arc<Mutex<()>>>,
    data: DashMap<String, T>,
}

impl<T: Clone> KeyedStore<T> {
    fn new() -> Self {
        Self { locks: DashMap::new(), data: DashMap::new() }
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).value())
    }

    async fn save(&self, key: &str, value: T) {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;
        self.data.insert(key.to_string(), value);
    }

    async fn load(&self, key: &str) -> Option<T> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;
        self.data.get(key).map(|v| v.clone())
    }

    async fn delete(&self, key: &str) {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;
        self.data.remove(key);
    }
}

/// An in-memory `Store` keyed by `(user_id)` / `(task_id, user_id)` /
/// `(conversation_id, user_id)` / `(topic, user_id)` (§6 "Persisted state
/// layout").
pub struct InMemoryStore {
    profiles: KeyedStore<Profile>,
    conversations: KeyedStore<Conversation>,
    workspaces: KeyedStore<Workspace>,
    knowledge: KeyedStore<KnowledgeArtifact>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            profiles: KeyedStore::new(),
            conversations: KeyedStore::new(),
            workspaces: KeyedStore::new(),
            knowledge: KeyedStore::new(),
        }
    }
}

fn conversation_key(id: &str, user: &str) -> String {
    format!("{user}:{id}")
}

fn workspace_key(task_id: &str, user: &str) -> String {
    format!("{user}:{task_id}")
}

fn knowledge_key(topic: &str, user: &str) -> String {
    format!("{user}:{topic}")
}

#[async_trait]
impl Store for InMemoryStore {
    async fn save_profile(&self, user_key: &str, profile: &Profile) -> Result<(), StoreError> {
        let merged = match self.profiles.load(user_key).await {
            Some(existing) => existing.merge_newer(profile.clone()),
            None => profile.clone(),
        };
        self.profiles.save(user_key, merged).await;
        Ok(())
    }

    async fn load_profile(&self, user_key: &str) -> Result<Profile, StoreError> {
        self.profiles.load(user_key).await.ok_or(StoreError::NotFound)
    }

    async fn delete_profile(&self, user_key: &str) -> Result<(), StoreError> {
        self.profiles.delete(user_key).await;
        Ok(())
    }

    async fn save_conversation(&self, conv: &Conversation) -> Result<(), StoreError> {
        let key = conversation_key(&conv.conversation_id, &conv.user_id);
        self.conversations.save(&key, conv.clone()).await;
        Ok(())
    }

    async fn load_conversation(&self, id: &str, user: &str) -> Result<Conversation, StoreError> {
        let key = conversation_key(id, user);
        self.conversations.load(&key).await.ok_or(StoreError::NotFound)
    }

    async fn delete_conversation(&self, id: &str, user: &str) -> Result<(), StoreError> {
        let key = conversation_key(id, user);
        self.conversations.delete(&key).await;
        Ok(())
    }

    async fn save_workspace(&self, task_id: &str, user: &str, ws: &Workspace) -> Result<(), StoreError> {
        let key = workspace_key(task_id, user);
        self.workspaces.save(&key, ws.clone()).await;
        Ok(())
    }

    async fn load_workspace(&self, task_id: &str, user: &str) -> Result<Workspace, StoreError> {
        let key = workspace_key(task_id, user);
        self.workspaces.load(&key).await.ok_or(StoreError::NotFound)
    }

    async fn delete_workspace(&self, task_id: &str, user: &str) -> Result<(), StoreError> {
        let key = workspace_key(task_id, user);
        self.workspaces.delete(&key).await;
        Ok(())
    }

    async fn list_workspaces(&self, user: &str) -> Result<Vec<String>, StoreError> {
        let prefix = format!("{user}:");
        Ok(self
            .workspaces
            .data
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .map(|entry| entry.value().task_id.clone())
            .collect())
    }

    async fn save_knowledge(&self, artifact: &KnowledgeArtifact) -> Result<(), StoreError> {
        let key = knowledge_key(&artifact.topic, &artifact.user_id);
        self.knowledge.save(&key, artifact.clone()).await;
        Ok(())
    }

    async fn search_knowledge(
        &self,
        query: &str,
        user: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<KnowledgeHit>, StoreError> {
        let prefix = format!("{user}:");
        let query_vec = bag_of_words(query);

        let mut hits: Vec<KnowledgeHit> = self
            .knowledge
            .data
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .map(|entry| entry.value().clone())
            .map(|artifact| {
                let score = cosine_similarity(&query_vec, &bag_of_words(&artifact.content));
                KnowledgeHit { artifact, score }
            })
            .filter(|hit| hit.score >= threshold)
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn load_knowledge(&self, topic: &str, user: &str) -> Result<KnowledgeArtifact, StoreError> {
        let key = knowledge_key(topic, user);
        self.knowledge.load(&key).await.ok_or(StoreError::NotFound)
    }

    async fn delete_knowledge(&self, topic: &str, user: &str) -> Result<(), StoreError> {
        let key = knowledge_key(topic, user);
        self.knowledge.delete(&key).await;
        Ok(())
    }
}

/// A deterministic, dependency-free bag-of-words "embedding": lowercase,
/// split on non-alphanumeric runs, count term frequency (§4.4 "a deterministic
/// scoring function ... sufficient for tests").
fn bag_of_words(text: &str) -> HashMap<String, f32> {
    let mut counts = HashMap::new();
    for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        *counts.entry(word.to_string()).or_insert(0.0_f32) += 1.0;
    }
    counts
}

fn cosine_similarity(a: &HashMap<String, f32>, b: &HashMap<String, f32>) -> f32 {
    let (smaller, larger) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f32 = smaller.iter().map(|(term, count)| count * larger.get(term).copied().unwrap_or(0.0)).sum();
    let norm_a: f32 = a.values().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.values().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn profile(user: &str) -> Profile {
        Profile::new(user, Utc::now())
    }

    #[tokio::test]
    async fn save_then_load_profile_round_trips() {
        let store = InMemoryStore::new();
        let mut p = profile("u1");
        p.who = "a data scientist".to_string();
        store.save_profile("u1", &p).await.unwrap();

        let loaded = store.load_profile("u1").await.unwrap();
        assert_eq!(loaded.who, "a data scientist");
    }

    #[tokio::test]
    async fn load_missing_profile_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.load_profile("ghost").await.unwrap_err();
        assert_eq!(err, StoreError::NotFound);
    }

    #[tokio::test]
    async fn workspace_round_trips_and_lists_by_user() {
        let store = InMemoryStore::new();
        let ws = Workspace::new("t1", "u1", "find the bug");
        store.save_workspace("t1", "u1", &ws).await.unwrap();

        let loaded = store.load_workspace("t1", "u1").await.unwrap();
        assert_eq!(loaded.objective, "find the bug");

        let listed = store.list_workspaces("u1").await.unwrap();
        assert_eq!(listed, vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_interfere() {
        let store = InMemoryStore::new();
        let ws_a = Workspace::new("t1", "u1", "task a");
        let ws_b = Workspace::new("t1", "u2", "task b");
        store.save_workspace("t1", "u1", &ws_a).await.unwrap();
        store.save_workspace("t1", "u2", &ws_b).await.unwrap();

        assert_eq!(store.load_workspace("t1", "u1").await.unwrap().objective, "task a");
        assert_eq!(store.load_workspace("t1", "u2").await.unwrap().objective, "task b");
    }

    #[tokio::test]
    async fn knowledge_search_ranks_by_term_overlap_and_respects_threshold() {
        let store = InMemoryStore::new();
        store
            .save_knowledge(&KnowledgeArtifact {
                topic: "rust-ownership".to_string(),
                user_id: "u1".to_string(),
                content: "Rust ownership and borrowing rules prevent data races".to_string(),
                content_type: "note".to_string(),
                embedding: None,
            })
            .await
            .unwrap();
        store
            .save_knowledge(&KnowledgeArtifact {
                topic: "weather".to_string(),
                user_id: "u1".to_string(),
                content: "Tomorrow's forecast is sunny with a light breeze".to_string(),
                content_type: "note".to_string(),
                embedding: None,
            })
            .await
            .unwrap();

        let hits = store.search_knowledge("ownership and borrowing", "u1", 2, 0.2).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].artifact.topic, "rust-ownership");
    }

    #[tokio::test]
    async fn save_profile_resolves_concurrent_writes_last_writer_wins() {
        let store = InMemoryStore::new();
        let mut first = profile("u1");
        first.last_updated = Utc::now();
        let mut second = profile("u1");
        second.last_updated = first.last_updated + chrono::Duration::seconds(5);
        second.who = "second writer".to_string();

        store.save_profile("u1", &second).await.unwrap();
        store.save_profile("u1", &first).await.unwrap();

        let loaded = store.load_profile("u1").await.unwrap();
        assert_eq!(loaded.who, "second writer");
    }
}
