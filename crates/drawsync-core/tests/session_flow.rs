//! Conversation turns driven by a scripted provider.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use drawsync_core::llm::LlmError;
use drawsync_core::session::{SessionSettings, user_turn};
use drawsync_core::{
    DiagramSession, ExportMode, HeadlessEditor, SessionError, ToolDispatcher, xml,
};
use drawsync_test_utils::config::TestConfigBuilder;
use drawsync_test_utils::fixtures::{FLOWCHART, display_call, edit_call};
use drawsync_test_utils::provider::ScriptedProvider;

fn session(
    editor: &Arc<HeadlessEditor>,
    provider: ScriptedProvider,
    max_steps: usize,
) -> DiagramSession {
    let config = TestConfigBuilder::new()
        .export_timeout_ms(50)
        .max_steps(max_steps)
        .model("diagram-model")
        .build();
    let dispatcher = Arc::new(ToolDispatcher::from_config(editor.clone(), &config.engine));
    DiagramSession::new(
        Box::new(provider),
        dispatcher,
        SessionSettings::from(&config.agent),
    )
}

#[tokio::test]
async fn test_draw_then_edit_across_turns() {
    let editor = Arc::new(HeadlessEditor::new());
    let provider = ScriptedProvider::new()
        .then_call(vec![display_call("call_1", FLOWCHART)])
        .then_reply("Here is the flowchart.")
        .then_call(vec![edit_call(
            "call_2",
            &[("value=\"Review\"", "value=\"Approve\"")],
        )])
        .then_reply("Renamed the decision.");
    let log = provider.log();
    let mut session = session(&editor, provider, 4);

    let first = session.send("Draw a review flow").await.unwrap();
    assert_eq!(first.reply.as_deref(), Some("Here is the flowchart."));
    assert_eq!(editor.document(), FLOWCHART);

    let second = session.send("Call the decision Approve").await.unwrap();
    assert_eq!(second.reports.len(), 1);
    assert!(second.reports[0].is_success());
    assert!(editor.document().contains("value=\"Approve\""));

    let requests = log.requests();
    assert_eq!(requests.len(), 4);
    assert_eq!(requests[0].model, "diagram-model");

    // The third request opens turn two: its newest message carries the
    // formatted live diagram, which by then is the flowchart.
    let framed = requests[2].messages.last().unwrap().content.clone().unwrap();
    assert_eq!(
        framed,
        user_turn(&xml::format_xml(FLOWCHART), "Call the decision Approve")
    );
    // Earlier user turns go out as typed.
    assert_eq!(
        requests[2].messages[0].content.as_deref(),
        Some("Draw a review flow")
    );
}

#[tokio::test]
async fn test_failed_edit_is_fed_back_to_the_model() {
    let editor = Arc::new(HeadlessEditor::with_document(FLOWCHART));
    let provider = ScriptedProvider::new()
        .then_call(vec![edit_call("bad", &[("value=\"Missing\"", "x")])])
        .then_call(vec![edit_call("good", &[("value=\"Start\"", "value=\"Go\"")])])
        .then_reply("Fixed.");
    let log = provider.log();
    let mut session = session(&editor, provider, 4);

    let summary = session.send("Rename start").await.unwrap();
    assert_eq!(summary.steps, 3);
    assert!(!summary.reports[0].is_success());
    assert!(summary.reports[1].is_success());

    let requests = log.requests();
    let tool_message = requests[1].messages.last().unwrap();
    assert_eq!(tool_message.tool_call_id.as_deref(), Some("bad"));
    let content = tool_message.content.as_deref().unwrap();
    assert!(content.starts_with("Edit failed: edit 0:"));
    assert!(content.contains(FLOWCHART));
}

#[tokio::test]
async fn test_unresponsive_editor_aborts_turn() {
    let editor = Arc::new(HeadlessEditor::new().with_export_mode(ExportMode::Silent));
    let provider = ScriptedProvider::new().then_reply("never sent");
    let log = provider.log();
    let mut session = session(&editor, provider, 4);

    let err = session.send("hello").await.unwrap_err();
    assert!(matches!(err, SessionError::Export(_)));
    assert!(log.is_empty());
}

#[tokio::test]
async fn test_provider_error_surfaces() {
    let editor = Arc::new(HeadlessEditor::new());
    let provider = ScriptedProvider::new().then_fail(LlmError::RateLimited {
        retry_after_secs: 30,
    });
    let mut session = session(&editor, provider, 4);

    let err = session.send("hello").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "conversation provider failed: rate limited: retry after 30s"
    );
    assert!(session.transcript().is_empty());
}

#[tokio::test]
async fn test_step_limit_stops_tool_loop() {
    let editor = Arc::new(HeadlessEditor::new());
    let provider = ScriptedProvider::new()
        .then_call(vec![display_call("a", FLOWCHART)])
        .then_call(vec![display_call("b", FLOWCHART)])
        .then_reply("unreached");
    let log = provider.log();
    let mut session = session(&editor, provider, 2);

    let summary = session.send("loop").await.unwrap();
    assert!(summary.step_limit_reached);
    assert_eq!(summary.reply, None);
    assert_eq!(log.len(), 2);
    assert_eq!(session.dispatcher().history_summary().len, 2);
}
