//! Background Profile Learner (§3 "Profile" lifecycle, §9 "Background
//! profile learning"): an explicit queue drained by a worker bound to the
//! process lifecycle, with bounded concurrency and clean shutdown.
//!
//! The source spawns a bare background task per profile update; here the
//! engine instead notifies this worker of every appended message, and the
//! worker re-synthesizes a user's Profile once the message count since its
//! last learn crosses `profile_learning_cadence_messages` (§6
//! `EngineConfig`).
//!
//! Grounded on `everruns-durable`'s `WorkerPool` shutdown discipline (a
//! `watch` signal plus a stored `JoinHandle` awaited by `shutdown()`,
//! `worker/pool.rs`) for bounded concurrency and clean shutdown, and on
//! `agenticlaw-agent`'s event queue (`queue.rs`, a single bounded `mpsc`
//! channel drained by one consumer loop) for the notify-by-queue shape;
//! `original_source/tests/unit/context/test_profile.py` (`should_learn`,
//! `learn_async`) for the cadence-then-LLM-synthesis semantics this worker
//! performs per user.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;

use crate::llm::{LlmClient, Message};
use crate::state::Profile;
use crate::store::Store;

/// Notification that a new message was appended to a user's conversation;
/// the unit of work the learner's queue carries.
#[derive(Debug, Clone)]
pub struct MessageAppended {
    pub user_id: String,
    pub conversation_id: String,
}

/// A spawned learner: the queue's send half plus the means to shut the
/// worker down cleanly. Cloning is cheap (it clones the channel senders);
/// the underlying worker task and its counters are shared.
#[derive(Clone)]
pub struct ProfileLearner {
    tx: mpsc::Sender<MessageAppended>,
    shutdown_tx: watch::Sender<bool>,
    worker: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl ProfileLearner {
    /// Spawns the worker loop. `cadence` is the message-count threshold
    /// (§3 "after a cadence threshold of new messages"); `max_concurrency`
    /// bounds how many users' profiles may be learned at once (§9 "bounded
    /// concurrency").
    pub fn spawn(store: Arc<dyn Store>, llm: Arc<dyn LlmClient>, cadence: usize, max_concurrency: usize) -> Self {
        let (tx, rx) = mpsc::channel(1024);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));

        let handle = tokio::spawn(Self::run(rx, shutdown_rx, store, llm, cadence.max(1), permits));

        Self { tx, shutdown_tx, worker: Arc::new(std::sync::Mutex::new(Some(handle))) }
    }

    /// Notifies the learner of a newly appended message. Never blocks the
    /// caller: a full queue (the worker falling behind) drops the
    /// notification rather than stalling the engine's Reason/Act/Respond
    /// loop, which is on the critical path and this worker is not.
    pub fn notify(&self, user_id: impl Into<String>, conversation_id: impl Into<String>) {
        let event = MessageAppended { user_id: user_id.into(), conversation_id: conversation_id.into() };
        if self.tx.try_send(event).is_err() {
            tracing::debug!("profile learner queue full or closed, dropping notification");
        }
    }

    /// Signals the worker to stop accepting new cadence triggers and waits
    /// for in-flight learn operations to finish (§9 "clean shutdown").
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.worker.lock().expect("learner worker mutex poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn run(
        mut rx: mpsc::Receiver<MessageAppended>,
        mut shutdown_rx: watch::Receiver<bool>,
        store: Arc<dyn Store>,
        llm: Arc<dyn LlmClient>,
        cadence: usize,
        permits: Arc<Semaphore>,
    ) {
        let mut since_last_learn: HashMap<String, usize> = HashMap::new();
        let mut in_flight = tokio::task::JoinSet::new();

        let trigger = |event: MessageAppended, in_flight: &mut tokio::task::JoinSet<()>| {
            let store = store.clone();
            let llm = llm.clone();
            let permits = permits.clone();
            in_flight.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else { return };
                learn_one(store.as_ref(), llm.as_ref(), &event.user_id, &event.conversation_id).await;
            });
        };

        loop {
            tokio::select! {
                biased;
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let count = since_last_learn.entry(event.user_id.clone()).or_insert(0);
                    *count += 1;
                    if *count < cadence {
                        continue;
                    }
                    *count = 0;
                    trigger(event, &mut in_flight);
                }
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        }

        // Drain whatever is already queued before exiting, so a shutdown
        // racing a burst of appends doesn't lose a just-crossed cadence.
        while let Ok(event) = rx.try_recv() {
            let count = since_last_learn.entry(event.user_id.clone()).or_insert(0);
            *count += 1;
            if *count >= cadence {
                trigger(event, &mut in_flight);
            }
        }

        // Clean shutdown (§9): wait for every learn operation already
        // admitted, rather than leaving it detached past this worker's exit.
        while in_flight.join_next().await.is_some() {}
    }
}

/// One learning pass: reads the messages appended since the profile's
/// `last_learned_at`, asks the LLM to synthesize an updated profile, and
/// merges the result in (§3 Profile attributes). Never propagates an error
/// to the caller — a failed learn just leaves the profile unchanged until
/// the next cadence trigger, matching the Store discipline of downgrading
/// failures to a logged warning rather than raising across the engine.
async fn learn_one(store: &dyn Store, llm: &dyn LlmClient, user_id: &str, conversation_id: &str) {
    let now = chrono::Utc::now();

    let mut profile = match store.load_profile(user_id).await {
        Ok(p) => p,
        Err(_) => Profile::new(user_id, now),
    };

    let conversation = match store.load_conversation(conversation_id, user_id).await {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(user_id, conversation_id, error = %e, "profile learner could not load conversation");
            return;
        }
    };

    let recent: Vec<&str> = conversation
        .messages
        .iter()
        .filter(|m| profile.last_learned_at.map_or(true, |t| m.timestamp > t))
        .map(|m| m.content.as_str())
        .collect();
    if recent.is_empty() {
        return;
    }

    let prompt = build_learning_prompt(&profile, &recent);
    let raw = match llm.generate(&[Message::system(LEARNING_SYSTEM_PROMPT), Message::user(prompt)]).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(user_id, error = %e, "profile learner LLM call failed");
            return;
        }
    };

    let update: ProfileUpdate = match serde_json::from_str(raw.trim()) {
        Ok(update) => update,
        Err(e) => {
            tracing::warn!(user_id, error = %e, "profile learner could not parse LLM output as JSON");
            return;
        }
    };
    apply_update(&mut profile, update);

    profile.last_learned_at = Some(now);
    profile.last_updated = now;

    if let Err(e) = store.save_profile(user_id, &profile).await {
        tracing::warn!(user_id, error = %e, "profile learner failed to persist updated profile");
    }
}

const LEARNING_SYSTEM_PROMPT: &str = "You maintain a compact user profile from conversation excerpts. \
Respond with a single JSON object containing only the fields you have new information for: \
who, communication_style, preferences, goals, expertise, projects.";

fn build_learning_prompt(profile: &Profile, recent_messages: &[&str]) -> String {
    let mut prompt = String::from("Current profile:\n");
    prompt.push_str(&format!("who: {}\n", profile.who));
    prompt.push_str(&format!("communication_style: {}\n", profile.communication_style));
    prompt.push_str("\nNew messages:\n");
    for message in recent_messages {
        prompt.push_str("- ");
        prompt.push_str(message);
        prompt.push('\n');
    }
    prompt
}

/// The LLM's sparse update: every field optional, since a learn pass is
/// only expected to report what it newly observed.
#[derive(Debug, Default, serde::Deserialize)]
struct ProfileUpdate {
    who: Option<String>,
    communication_style: Option<String>,
    #[serde(default)]
    preferences: HashMap<String, String>,
    #[serde(default)]
    goals: Vec<String>,
    #[serde(default)]
    expertise: Vec<String>,
    #[serde(default)]
    projects: HashMap<String, String>,
}

fn apply_update(profile: &mut Profile, update: ProfileUpdate) {
    if let Some(who) = update.who {
        profile.who = who;
    }
    if let Some(style) = update.communication_style {
        profile.communication_style = style;
    }
    profile.preferences.extend(update.preferences);
    profile.projects.extend(update.projects);
    for goal in update.goals {
        if !profile.goals.contains(&goal) {
            profile.goals.push(goal);
        }
    }
    profile.expertise.extend(update.expertise);
}
