//! A scripted `LlmClient` test double (§10.4), grounded on a
//! `MockLlm`/`StubLlm` fixed-response test-adapter convention — generalized
//! here to a FIFO queue of scripts so a test can drive several Reason turns
//! in sequence.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::Mutex;

use crate::engine::EngineError;
use crate::llm::{LlmClient, Message, TokenStream};

/// One scripted turn: either a whole string (for `generate`, or as the
/// fallback for `stream`) or a pre-chunked token sequence (to exercise the
/// protocol parser's split-delimiter handling end to end).
#[derive(Debug, Clone)]
pub enum Script {
    Text(String),
    Tokens(Vec<String>),
}

impl Script {
    fn into_text(self) -> String {
        match self {
            Script::Text(t) => t,
            Script::Tokens(toks) => toks.concat(),
        }
    }

    fn into_tokens(self) -> Vec<String> {
        match self {
            Script::Text(t) => vec![t],
            Script::Tokens(toks) => toks,
        }
    }
}

/// An `LlmClient` that replays a fixed FIFO queue of [`Script`]s, one per
/// call to `generate`/`stream`.
pub struct MockLlm {
    scripts: Mutex<VecDeque<Script>>,
}

impl MockLlm {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self { scripts: Mutex::new(scripts.into_iter().collect()) }
    }

    /// Convenience for tests driving a single fixed-text response.
    pub fn single(text: impl Into<String>) -> Self {
        Self::new(vec![Script::Text(text.into())])
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn generate(&self, _messages: &[Message]) -> Result<String, EngineError> {
        let mut scripts = self.scripts.lock().await;
        scripts
            .pop_front()
            .map(Script::into_text)
            .ok_or_else(|| EngineError::LlmFailed("MockLlm script exhausted".to_string()))
    }

    async fn stream(&self, _messages: &[Message]) -> Result<TokenStream, EngineError> {
        let mut scripts = self.scripts.lock().await;
        let tokens = scripts
            .pop_front()
            .map(Script::into_tokens)
            .ok_or_else(|| EngineError::LlmFailed("MockLlm script exhausted".to_string()))?;
        Ok(Box::pin(stream::iter(tokens.into_iter().map(Ok))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn generate_replays_scripts_in_order() {
        let llm = MockLlm::new(vec![Script::Text("first".into()), Script::Text("second".into())]);
        assert_eq!(llm.generate(&[]).await.unwrap(), "first");
        assert_eq!(llm.generate(&[]).await.unwrap(), "second");
    }

    #[tokio::test]
    async fn stream_replays_pre_chunked_tokens() {
        let llm = MockLlm::new(vec![Script::Tokens(vec!["§".into(), "think".into(), ": hi".into()])]);
        let mut tokens = llm.stream(&[]).await.unwrap();
        let mut collected = String::new();
        while let Some(tok) = tokens.next().await {
            collected.push_str(&tok.unwrap());
        }
        assert_eq!(collected, "§think: hi");
    }

    #[tokio::test]
    async fn exhausted_script_is_a_hard_failure() {
        let llm = MockLlm::new(vec![]);
        let err = llm.generate(&[]).await.unwrap_err();
        assert!(matches!(err, EngineError::LlmFailed(_)));
    }
}
