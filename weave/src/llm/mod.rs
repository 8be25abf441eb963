//! LLM adapter contract (§6): `generate`, `stream`, and `connect`/`send`/`close`
//! for long-lived session-oriented providers. Provider adapters themselves are
//! out of scope (§1) — this module defines only the trait plus a test-only
//! [`MockLlm`].
//!
//! Generalized from an `LlmClient::invoke`/`invoke_stream` pair (single-shot
//! request/response plus a default streaming fallback) into a
//! three-operation contract; the default-impl pattern (a cheap operation
//! backed by the richer one when a provider doesn't support it natively) is
//! kept for `stream`'s fallback onto `generate`.

pub mod mock;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::stream::{self, Stream};

pub use mock::MockLlm;

use crate::engine::EngineError;
use crate::parser::Token;
use crate::state::Role;

/// One chat message, role-tagged (§3 Conversation message shape, reused here
/// for prompt assembly).
#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

pub type TokenStream = Pin<Box<dyn Stream<Item = Token> + Send>>;

/// A long-lived, session-oriented connection to an LLM provider (§6
/// `connect(messages) / send(text) / close()`).
#[async_trait]
pub trait LlmSession: Send {
    async fn send(&mut self, text: &str) -> Result<String, EngineError>;
    async fn close(&mut self) -> Result<(), EngineError>;
}

/// The engine's three operations on an LLM adapter (§6). Authentication and
/// rate limiting are the adapter's concern; rate-limit exhaustion surfaces as
/// `EngineError::LlmFailed` (§6 "surfaces as a hard failure to the caller").
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Non-streaming fallback (§6 `generate(messages) -> string`).
    async fn generate(&self, messages: &[Message]) -> Result<String, EngineError>;

    /// Lazy token stream for Reason (§6 `stream(messages) -> lazy sequence`).
    /// Default: produce the full `generate` response as a single token, a
    /// "send the full content as one chunk" fallback for providers with no
    /// native streaming.
    async fn stream(&self, messages: &[Message]) -> Result<TokenStream, EngineError> {
        let content = self.generate(messages).await?;
        Ok(Box::pin(stream::iter(vec![Ok(content)])))
    }

    /// Opens a long-lived session (§6 `connect`). Default: unsupported: most
    /// providers are single-shot request/response.
    async fn connect(&self, _messages: &[Message]) -> Result<Box<dyn LlmSession>, EngineError> {
        Err(EngineError::LlmFailed("this adapter does not support session mode".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubLlm {
        content: String,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn generate(&self, _messages: &[Message]) -> Result<String, EngineError> {
            Ok(self.content.clone())
        }
    }

    #[tokio::test]
    async fn default_stream_yields_the_full_response_as_one_token() {
        use futures_util::StreamExt;

        let llm = StubLlm { content: "hello".to_string() };
        let mut tokens = llm.stream(&[]).await.unwrap();
        let first = tokens.next().await.unwrap().unwrap();
        assert_eq!(first, "hello");
        assert!(tokens.next().await.is_none());
    }

    #[tokio::test]
    async fn default_connect_is_unsupported() {
        let llm = StubLlm { content: String::new() };
        let err = llm.connect(&[]).await.unwrap_err();
        assert!(matches!(err, EngineError::LlmFailed(_)));
    }
}
