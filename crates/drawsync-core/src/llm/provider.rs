//! LLM provider trait: the seam to whatever backend runs the conversation.

use crate::BoxFuture;

use super::types::{ChatRequest, ChatResponse};

/// Errors from LLM provider calls.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    Request(String),

    #[error("authentication failed (check API key): {0}")]
    Auth(String),

    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("timeout")]
    Timeout,
}

/// Core trait for chat-completion providers.
///
/// Uses `BoxFuture` for object safety (allows `Box<dyn LlmProvider>`).
pub trait LlmProvider: Send + Sync {
    /// Provider display name (e.g. "Anthropic", "OpenAI").
    fn name(&self) -> &str;

    /// Perform a chat completion with tool use.
    fn chat(&self, request: &ChatRequest) -> BoxFuture<'_, Result<ChatResponse, LlmError>>;
}
