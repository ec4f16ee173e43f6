//! A conversation provider that replays a script.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use drawsync_core::BoxFuture;
use drawsync_core::llm::{
    ChatMessage, ChatRequest, ChatResponse, LlmError, LlmProvider, TokenUsage, ToolCall,
};

/// Fake [`LlmProvider`] returning queued responses in order.
///
/// Every request it receives is recorded in a [`RequestLog`] that stays
/// readable after the provider has been moved into a session. Once the script
/// runs out, further requests fail with [`LlmError::Request`].
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
    log: RequestLog,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            log: RequestLog::default(),
        }
    }

    /// Queue a plain assistant reply.
    pub fn then_reply(self, text: &str) -> Self {
        self.push(Ok(response(ChatMessage::assistant(text), "stop")))
    }

    /// Queue an assistant turn that requests `calls`.
    pub fn then_call(self, calls: Vec<ToolCall>) -> Self {
        self.push(Ok(response(
            ChatMessage::assistant_tool_calls(None, calls),
            "tool_use",
        )))
    }

    /// Queue a provider failure.
    pub fn then_fail(self, err: LlmError) -> Self {
        self.push(Err(err))
    }

    /// Handle to the requests this provider receives.
    pub fn log(&self) -> RequestLog {
        self.log.clone()
    }

    fn push(self, entry: Result<ChatResponse, LlmError>) -> Self {
        self.script
            .lock()
            .expect("script lock poisoned")
            .push_back(entry);
        self
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn chat(&self, request: &ChatRequest) -> BoxFuture<'_, Result<ChatResponse, LlmError>> {
        self.log.record(request.clone());
        let next = self
            .script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Request("script exhausted".to_string())));
        Box::pin(async move { next })
    }
}

/// Shared record of the requests a [`ScriptedProvider`] saw.
#[derive(Clone, Default)]
pub struct RequestLog {
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl RequestLog {
    fn record(&self, request: ChatRequest) {
        self.requests
            .lock()
            .expect("request log poisoned")
            .push(request);
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("request log poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.requests.lock().expect("request log poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn response(message: ChatMessage, finish_reason: &str) -> ChatResponse {
    ChatResponse {
        message,
        finish_reason: finish_reason.to_string(),
        usage: TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 20,
            total_tokens: 120,
        },
        model: "scripted".to_string(),
    }
}
