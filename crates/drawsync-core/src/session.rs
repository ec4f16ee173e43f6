//! Conversation driver: one user turn in, tool calls executed, reply out.
//!
//! Each turn starts by exporting the live diagram so the model always works
//! from what is actually on the canvas. The exported document is pretty-printed
//! and framed into the newest user message; earlier user messages are sent as
//! they were typed.

use std::sync::Arc;

use tracing::{debug, info, warn};

use drawsync_config::AgentConfig;

use crate::dispatch::{ToolDispatcher, ToolReport};
use crate::editor::LoadFailure;
use crate::export::ExportError;
use crate::llm::{Attachment, ChatMessage, ChatRequest, LlmError, LlmProvider, TokenUsage};
use crate::tools;
use crate::xml;

/// System prompt sent with every completion.
pub const SYSTEM_PROMPT: &str = "\
You are an expert diagram architect working in draw.io (mxGraph) XML.
The current diagram is attached to every user message.

Tools:
- display_diagram: show a complete new diagram. Use it for a first draft or a major rework.
- edit_diagram: change parts of the current diagram with exact search/replace pairs.

Rules for edit_diagram:
- Copy search text verbatim from the current diagram, including indentation.
- Include only the lines that change plus one or two lines of context.
- Each search replaces its first match only; edits apply in order.
- If an edit fails, read the returned diagram and retry, or fall back to display_diagram.

Rules for diagrams:
- Keep cell ids unique and keep the two base cells `0` and `1`.
- Give every vertex an mxGeometry and every edge a relative geometry.
";

/// Errors that end a turn without an answer.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("could not read the current diagram: {0}")]
    Export(#[from] ExportError),

    #[error("conversation provider failed: {0}")]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Load(#[from] LoadFailure),
}

/// Completion parameters for a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub model: String,
    pub max_steps: usize,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for SessionSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_steps: config.max_steps,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// What happened during one call to [`DiagramSession::send`].
#[derive(Debug, Clone, Default)]
pub struct TurnSummary {
    /// Final assistant text, if the model ended with one.
    pub reply: Option<String>,
    /// One report per tool call, in execution order.
    pub reports: Vec<ToolReport>,
    /// Completions requested during the turn.
    pub steps: usize,
    pub usage: TokenUsage,
    /// The model was still calling tools when `max_steps` ran out.
    pub step_limit_reached: bool,
}

/// A conversation about one diagram.
pub struct DiagramSession {
    provider: Box<dyn LlmProvider>,
    dispatcher: Arc<ToolDispatcher>,
    settings: SessionSettings,
    transcript: Vec<ChatMessage>,
}

impl DiagramSession {
    pub fn new(
        provider: Box<dyn LlmProvider>,
        dispatcher: Arc<ToolDispatcher>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            settings,
            transcript: Vec::new(),
        }
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn dispatcher(&self) -> &Arc<ToolDispatcher> {
        &self.dispatcher
    }

    /// Run one user turn to completion.
    ///
    /// A failed turn leaves the transcript as it was before the call; diagram
    /// changes made by tools that already ran stay in the history.
    pub async fn send(&mut self, user_text: &str) -> Result<TurnSummary, SessionError> {
        self.send_with_attachments(user_text, Vec::new()).await
    }

    /// Like [`send`](Self::send), with images or files attached to the turn.
    ///
    /// Attachments ride along on the framed message of every step.
    pub async fn send_with_attachments(
        &mut self,
        user_text: &str,
        attachments: Vec<Attachment>,
    ) -> Result<TurnSummary, SessionError> {
        let document = self.dispatcher.current_document().await?;
        let framed = user_turn(&xml::format_xml(&document), user_text);

        let turn_start = self.transcript.len();
        debug!(attachments = attachments.len(), "Starting turn");
        self.transcript
            .push(ChatMessage::user(user_text).with_attachments(attachments));

        match self.run_steps(&framed).await {
            Ok(summary) => Ok(summary),
            Err(err) => {
                self.transcript.truncate(turn_start);
                Err(err)
            }
        }
    }

    async fn run_steps(&mut self, framed: &str) -> Result<TurnSummary, SessionError> {
        let mut summary = TurnSummary::default();

        while summary.steps < self.settings.max_steps {
            summary.steps += 1;
            let request = self.request(framed);
            debug!(
                provider = self.provider.name(),
                step = summary.steps,
                messages = request.messages.len(),
                "Requesting completion"
            );

            let response = self.provider.chat(&request).await?;
            summary.usage += response.usage;
            let calls = response.message.calls().to_vec();
            let reply = response.message.content.clone();
            self.transcript.push(response.message);

            if calls.is_empty() {
                info!(
                    steps = summary.steps,
                    tool_calls = summary.reports.len(),
                    "Turn complete"
                );
                summary.reply = reply;
                return Ok(summary);
            }

            for call in &calls {
                let report = self.dispatcher.dispatch(call).await;
                self.transcript.push(report.to_message());
                summary.reports.push(report);
            }
        }

        warn!(
            max_steps = self.settings.max_steps,
            "Step limit reached with tool calls still pending"
        );
        summary.step_limit_reached = true;
        Ok(summary)
    }

    fn request(&self, framed: &str) -> ChatRequest {
        let mut messages = self.transcript.clone();
        if let Some(last) = messages.iter_mut().rev().find(|m| m.role == "user") {
            last.content = Some(framed.to_string());
        }

        ChatRequest {
            model: self.settings.model.clone(),
            messages,
            tools: tools::definitions(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            system: Some(SYSTEM_PROMPT.to_string()),
        }
    }

    /// Forget the conversation and reset the diagram.
    pub async fn clear(&mut self) -> Result<(), SessionError> {
        self.transcript.clear();
        self.dispatcher.clear().await?;
        Ok(())
    }
}

/// Frame the user's text together with the diagram it refers to.
pub fn user_turn(document: &str, user_text: &str) -> String {
    format!(
        "Current diagram XML:\n\"\"\"xml\n{document}\n\"\"\"\nUser input:\n\"\"\"md\n{user_text}\n\"\"\""
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;

    use crate::BoxFuture;
    use crate::editor::{ExportMode, HeadlessEditor};
    use crate::llm::{ChatResponse, ToolCall};

    /// Replays canned responses and keeps every request it saw.
    struct Script {
        responses: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
        requests: Arc<Mutex<Vec<ChatRequest>>>,
    }

    impl Script {
        fn new(
            responses: Vec<Result<ChatResponse, LlmError>>,
        ) -> (Box<Self>, Arc<Mutex<Vec<ChatRequest>>>) {
            let requests = Arc::new(Mutex::new(Vec::new()));
            let script = Self {
                responses: Mutex::new(responses.into()),
                requests: Arc::clone(&requests),
            };
            (Box::new(script), requests)
        }
    }

    impl LlmProvider for Script {
        fn name(&self) -> &str {
            "script"
        }

        fn chat(&self, request: &ChatRequest) -> BoxFuture<'_, Result<ChatResponse, LlmError>> {
            self.requests.lock().unwrap().push(request.clone());
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(reply("done")));
            Box::pin(async move { next })
        }
    }

    fn reply(text: &str) -> ChatResponse {
        respond(ChatMessage::assistant(text))
    }

    fn calls(calls: Vec<ToolCall>) -> ChatResponse {
        respond(ChatMessage::assistant_tool_calls(None, calls))
    }

    fn respond(message: ChatMessage) -> ChatResponse {
        ChatResponse {
            message,
            finish_reason: "stop".to_string(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 2,
                total_tokens: 12,
            },
            model: "scripted".to_string(),
        }
    }

    const MODEL: &str = "<mxGraphModel><root><mxCell id=\"0\"/><mxCell id=\"1\" parent=\"0\"/></root></mxGraphModel>";

    fn session(
        editor: HeadlessEditor,
        responses: Vec<Result<ChatResponse, LlmError>>,
        max_steps: usize,
    ) -> (DiagramSession, Arc<Mutex<Vec<ChatRequest>>>, Arc<HeadlessEditor>) {
        let editor = Arc::new(editor);
        let dispatcher = Arc::new(ToolDispatcher::new(
            editor.clone(),
            Duration::from_millis(50),
        ));
        let (provider, requests) = Script::new(responses);
        let settings = SessionSettings {
            max_steps,
            ..SessionSettings::default()
        };
        (DiagramSession::new(provider, dispatcher, settings), requests, editor)
    }

    #[test]
    fn test_user_turn_framing() {
        assert_eq!(
            user_turn("<a/>", "add a box"),
            "Current diagram XML:\n\"\"\"xml\n<a/>\n\"\"\"\nUser input:\n\"\"\"md\nadd a box\n\"\"\""
        );
    }

    #[tokio::test]
    async fn test_plain_reply() {
        let (mut session, requests, _editor) =
            session(HeadlessEditor::new(), vec![Ok(reply("Hello"))], 4);

        let summary = session.send("hi").await.unwrap();
        assert_eq!(summary.reply.as_deref(), Some("Hello"));
        assert_eq!(summary.steps, 1);
        assert!(summary.reports.is_empty());

        let requests = requests.lock().unwrap();
        let sent = &requests[0];
        assert_eq!(sent.system.as_deref(), Some(SYSTEM_PROMPT));
        assert_eq!(sent.tools.len(), 2);
        let framed = sent.messages[0].content.as_deref().unwrap();
        assert!(framed.starts_with("Current diagram XML:\n\"\"\"xml\n<mxGraphModel>\n  <root>"));
        assert!(framed.ends_with("User input:\n\"\"\"md\nhi\n\"\"\""));

        // The transcript keeps the text as typed.
        assert_eq!(session.transcript()[0].content.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_tool_calls_are_dispatched_and_answered() {
        let (mut session, requests, editor) = session(
            HeadlessEditor::new(),
            vec![
                Ok(calls(vec![ToolCall::new(
                    "call_1",
                    tools::DISPLAY_DIAGRAM,
                    json!({ "xml": MODEL }),
                )])),
                Ok(reply("Drawn.")),
            ],
            4,
        );

        let summary = session.send("draw it").await.unwrap();
        assert_eq!(summary.steps, 2);
        assert_eq!(summary.reports.len(), 1);
        assert!(summary.reports[0].is_success());
        assert_eq!(summary.usage.total_tokens, 24);
        assert_eq!(editor.document(), MODEL);

        let requests = requests.lock().unwrap();
        let second = &requests[1].messages;
        let answer = second.last().unwrap();
        assert_eq!(answer.role, "tool");
        assert_eq!(answer.tool_call_id.as_deref(), Some("call_1"));
        // The turn's user message stays framed for every step of the turn.
        assert_eq!(second[0].content, requests[0].messages[0].content);
        assert!(second[0].content.as_deref().unwrap().ends_with("draw it\n\"\"\""));
    }

    #[tokio::test]
    async fn test_attachments_reach_the_framed_message() {
        let (mut session, requests, _editor) =
            session(HeadlessEditor::new(), vec![Ok(reply("A cat."))], 4);
        let sketch = Attachment::new("image/png", "data:image/png;base64,iVBORw0KGgo=");

        session
            .send_with_attachments("copy this", vec![sketch.clone()])
            .await
            .unwrap();

        let requests = requests.lock().unwrap();
        let framed = &requests[0].messages[0];
        assert!(framed.content.as_deref().unwrap().ends_with("copy this\n\"\"\""));
        assert_eq!(framed.attachments, [sketch.clone()]);
        assert_eq!(session.transcript()[0].attachments, [sketch]);
    }

    #[tokio::test]
    async fn test_step_limit() {
        let looping = || {
            Ok(calls(vec![ToolCall::new(
                "again",
                tools::EDIT_DIAGRAM,
                json!({ "edits": [{ "search": "nowhere", "replace": "x" }] }),
            )]))
        };
        let (mut session, _requests, _editor) =
            session(HeadlessEditor::new(), vec![looping(), looping(), looping()], 2);

        let summary = session.send("loop").await.unwrap();
        assert!(summary.step_limit_reached);
        assert_eq!(summary.steps, 2);
        assert_eq!(summary.reports.len(), 2);
        assert!(summary.reports.iter().all(|r| !r.is_success()));
    }

    #[tokio::test]
    async fn test_export_failure_sends_nothing() {
        let (mut session, requests, _editor) = session(
            HeadlessEditor::new().with_export_mode(ExportMode::Silent),
            vec![Ok(reply("unused"))],
            4,
        );
        let err = session.send("hi").await.unwrap_err();
        assert!(matches!(err, SessionError::Export(ExportError::Timeout(_))));
        assert!(requests.lock().unwrap().is_empty());
        assert!(session.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_rolls_back_transcript() {
        let (mut session, _requests, _editor) =
            session(HeadlessEditor::new(), vec![Err(LlmError::Timeout)], 4);
        let err = session.send("hi").await.unwrap_err();
        assert!(matches!(err, SessionError::Llm(LlmError::Timeout)));
        assert!(session.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_clear_resets_conversation_and_canvas() {
        let (mut session, _requests, editor) = session(
            HeadlessEditor::new(),
            vec![
                Ok(calls(vec![ToolCall::new(
                    "c1",
                    tools::DISPLAY_DIAGRAM,
                    json!({ "xml": "<mxGraphModel><root><x/></root></mxGraphModel>" }),
                )])),
                Ok(reply("ok")),
            ],
            4,
        );
        session.send("draw").await.unwrap();
        assert_eq!(session.dispatcher().history_summary().len, 1);

        session.clear().await.unwrap();
        assert!(session.transcript().is_empty());
        assert_eq!(session.dispatcher().history_summary().len, 0);
        assert_eq!(editor.document(), xml::EMPTY_DIAGRAM);
    }
}
