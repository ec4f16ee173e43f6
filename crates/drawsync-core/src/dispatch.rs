//! Tool Dispatch Loop: turns validated tool calls into engine operations.
//!
//! Every call walks `Received → Executing → {Succeeded, Failed} → Reported`
//! and produces exactly one [`ToolReport`]. Failures never escape as errors;
//! they become structured reports the agent can act on.
//!
//! Edit calls hold the edit gate for their whole export/patch/load round trip,
//! so the export bridge never sees two requests at once. Display calls skip
//! the gate since they do not export.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use drawsync_config::EngineConfig;

use crate::editor::{EditorPort, LoadFailure};
use crate::export::{ExportBridge, ExportError};
use crate::history::{Snapshot, SnapshotOrigin};
use crate::llm::types::{ChatMessage, ToolCall};
use crate::loader::{DiagramLoader, LoaderError};
use crate::patch::{EditOperation, apply_edits};
use crate::tools::{DiagramCall, EDIT_DIAGRAM};
use crate::xml;

/// Why a call failed, plus the document the agent should reason from next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub reason: String,
    pub last_known_document: String,
}

/// Result of executing one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Succeeded { message: String },
    Failed(FailureReport),
}

/// The single report emitted for a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolReport {
    pub call_id: String,
    pub tool: String,
    #[serde(flatten)]
    pub outcome: ToolOutcome,
}

impl ToolReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Succeeded { .. })
    }

    /// Text handed back to the model for this call.
    pub fn content(&self) -> String {
        match &self.outcome {
            ToolOutcome::Succeeded { message } => message.clone(),
            ToolOutcome::Failed(report) if self.tool == EDIT_DIAGRAM => format!(
                "Edit failed: {}\n\nCurrent diagram XML:\n```xml\n{}\n```\n\n\
                 Please retry with an adjusted search pattern or use display_diagram \
                 if retries are exhausted.",
                report.reason, report.last_known_document
            ),
            ToolOutcome::Failed(report) => format!(
                "Tool call {} failed: {}\n\nCurrent diagram XML:\n```xml\n{}\n```",
                self.tool, report.reason, report.last_known_document
            ),
        }
    }

    /// The conversation tool-result message answering this call.
    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::tool_result(&self.call_id, self.content())
    }
}

#[derive(Debug, Clone, Copy)]
enum CallState {
    Received,
    Executing,
    Succeeded,
    Failed,
    Reported,
}

impl CallState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Executing => "executing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Reported => "reported",
        }
    }
}

/// One line of [`HistorySummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub position: usize,
    pub origin: SnapshotOrigin,
    pub bytes: usize,
    pub taken_at_ms: u64,
}

/// Serializable overview of the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub len: usize,
    pub cursor: Option<usize>,
    pub entries: Vec<HistoryEntry>,
}

/// Routes tool calls onto the export bridge, the patch applier and the loader.
pub struct ToolDispatcher {
    bridge: ExportBridge,
    loader: Mutex<DiagramLoader>,
    edit_gate: tokio::sync::Mutex<()>,
    export_timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(editor: Arc<dyn EditorPort>, export_timeout: Duration) -> Self {
        Self {
            bridge: ExportBridge::attach(Arc::clone(&editor)),
            loader: Mutex::new(DiagramLoader::new(editor)),
            edit_gate: tokio::sync::Mutex::new(()),
            export_timeout,
        }
    }

    pub fn from_config(editor: Arc<dyn EditorPort>, config: &EngineConfig) -> Self {
        Self::new(editor, config.export_timeout())
    }

    pub fn export_timeout(&self) -> Duration {
        self.export_timeout
    }

    /// Execute one tool call and report on it. Never fails.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolReport {
        trace_state(call, CallState::Received);

        let outcome = match DiagramCall::try_from(call) {
            Ok(parsed) => {
                trace_state(call, CallState::Executing);
                self.execute(parsed).await
            }
            Err(err) => self.failed(err.to_string(), None),
        };

        match &outcome {
            ToolOutcome::Succeeded { message } => {
                trace_state(call, CallState::Succeeded);
                info!(call_id = %call.id, tool = %call.name, %message, "Tool call succeeded");
            }
            ToolOutcome::Failed(report) => {
                trace_state(call, CallState::Failed);
                warn!(
                    call_id = %call.id,
                    tool = %call.name,
                    reason = %report.reason,
                    "Tool call failed"
                );
            }
        }

        let report = ToolReport {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            outcome,
        };
        trace_state(call, CallState::Reported);
        report
    }

    async fn execute(&self, call: DiagramCall) -> ToolOutcome {
        match call {
            DiagramCall::Display { document } => self.display(&document),
            DiagramCall::Edit { edits } => self.edit(&edits).await,
        }
    }

    fn display(&self, document: &str) -> ToolOutcome {
        let document = xml::normalize_document(document);
        let loaded = self.loader().load_diagram(&document, SnapshotOrigin::Display);
        match loaded {
            Ok(_) => ToolOutcome::Succeeded {
                message: "Successfully displayed the diagram.".to_string(),
            },
            Err(err) => self.failed(err.to_string(), None),
        }
    }

    async fn edit(&self, edits: &[EditOperation]) -> ToolOutcome {
        let _gate = self.edit_gate.lock().await;

        let snapshot = match self.bridge.request_snapshot(self.export_timeout).await {
            Ok(document) => document,
            Err(err) => return self.failed(err.to_string(), self.bridge.last_delivered()),
        };

        let patched = match apply_edits(&snapshot, edits) {
            Ok(patched) => patched,
            Err(err) => return self.failed(err.to_string(), Some(snapshot)),
        };

        let origin = SnapshotOrigin::Edit { edits: edits.len() };
        let loaded = self.loader().load_diagram(&patched, origin);
        match loaded {
            Ok(_) => ToolOutcome::Succeeded {
                message: format!(
                    "Successfully applied {} edit(s) to the diagram.",
                    edits.len()
                ),
            },
            Err(err) => self.failed(err.to_string(), Some(snapshot)),
        }
    }

    fn failed(&self, reason: String, last_known: Option<String>) -> ToolOutcome {
        ToolOutcome::Failed(FailureReport {
            reason,
            last_known_document: last_known.unwrap_or_else(|| self.visible_document()),
        })
    }

    /// Export the live document, serialized with edit calls.
    pub async fn current_document(&self) -> Result<String, ExportError> {
        let _gate = self.edit_gate.lock().await;
        self.bridge.request_snapshot(self.export_timeout).await
    }

    /// Load a document supplied by the host rather than the agent.
    pub async fn load_host_document(&self, document: &str) -> Result<usize, LoadFailure> {
        let _gate = self.edit_gate.lock().await;
        self.loader()
            .load_diagram(&xml::normalize_document(document), SnapshotOrigin::Host)
    }

    /// Show an earlier history position.
    pub async fn restore(&self, position: usize) -> Result<Snapshot, LoaderError> {
        let _gate = self.edit_gate.lock().await;
        self.loader().restore(position).cloned()
    }

    /// Empty the history and reset the canvas.
    pub async fn clear(&self) -> Result<(), LoadFailure> {
        let _gate = self.edit_gate.lock().await;
        self.loader().clear()
    }

    /// The document most recently loaded, without a round trip to the editor.
    pub fn visible_document(&self) -> String {
        self.loader().visible().to_string()
    }

    pub fn export_pending(&self) -> bool {
        self.bridge.is_awaiting()
    }

    pub fn history_summary(&self) -> HistorySummary {
        let loader = self.loader();
        let history = loader.history();
        HistorySummary {
            len: history.len(),
            cursor: history.cursor(),
            entries: history
                .iter()
                .enumerate()
                .map(|(position, snapshot)| HistoryEntry {
                    position,
                    origin: snapshot.origin(),
                    bytes: snapshot.document().len(),
                    taken_at_ms: snapshot
                        .taken_at()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_millis() as u64)
                        .unwrap_or_default(),
                })
                .collect(),
        }
    }

    fn loader(&self) -> MutexGuard<'_, DiagramLoader> {
        self.loader.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn trace_state(call: &ToolCall, state: CallState) {
    debug!(call_id = %call.id, tool = %call.name, state = state.as_str(), "Tool call state");
}

/// Errors from talking to a running [`DispatchService`].
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatch service channel closed")]
    ChannelClosed,
}

/// Commands accepted by the dispatch service.
#[derive(Debug)]
pub enum DispatchCommand {
    Call(ToolCall),
    Shutdown,
}

/// Async loop that executes submitted tool calls and streams their reports.
pub struct DispatchService {
    dispatcher: Arc<ToolDispatcher>,
    command_rx: mpsc::Receiver<DispatchCommand>,
    report_tx: mpsc::Sender<ToolReport>,
}

/// Handle for submitting calls to a running [`DispatchService`].
#[derive(Clone)]
pub struct DispatchHandle {
    command_tx: mpsc::Sender<DispatchCommand>,
}

impl DispatchHandle {
    pub async fn submit(&self, call: ToolCall) -> Result<(), DispatchError> {
        self.command_tx
            .send(DispatchCommand::Call(call))
            .await
            .map_err(|_| DispatchError::ChannelClosed)
    }

    /// Stop accepting calls; calls already submitted are still reported.
    pub async fn shutdown(&self) -> Result<(), DispatchError> {
        self.command_tx
            .send(DispatchCommand::Shutdown)
            .await
            .map_err(|_| DispatchError::ChannelClosed)
    }
}

impl DispatchService {
    /// Create the service, its handle and the receiving end of the report stream.
    pub fn new(
        dispatcher: Arc<ToolDispatcher>,
    ) -> (Self, DispatchHandle, mpsc::Receiver<ToolReport>) {
        let (command_tx, command_rx) = mpsc::channel(256);
        let (report_tx, report_rx) = mpsc::channel(256);

        let service = Self {
            dispatcher,
            command_rx,
            report_tx,
        };

        (service, DispatchHandle { command_tx }, report_rx)
    }

    /// Run until shutdown (or every handle is dropped), then drain in-flight calls.
    pub async fn run(mut self) {
        info!("Dispatch service started");
        let mut in_flight = JoinSet::new();
        let mut pending: HashMap<tokio::task::Id, (String, String)> = HashMap::new();

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(DispatchCommand::Call(call)) => {
                        let dispatcher = Arc::clone(&self.dispatcher);
                        let report_tx = self.report_tx.clone();
                        let label = (call.id.clone(), call.name.clone());
                        let task = in_flight.spawn(async move {
                            let report = dispatcher.dispatch(&call).await;
                            if report_tx.send(report).await.is_err() {
                                warn!(call_id = %call.id, "Report receiver dropped");
                            }
                        });
                        pending.insert(task.id(), label);
                    }
                    Some(DispatchCommand::Shutdown) | None => break,
                },
                Some(joined) = in_flight.join_next_with_id(), if !in_flight.is_empty() => {
                    self.settle(joined, &mut pending).await;
                }
            }
        }

        info!(in_flight = in_flight.len(), "Dispatch service draining");
        while let Some(joined) = in_flight.join_next_with_id().await {
            self.settle(joined, &mut pending).await;
        }
        info!("Dispatch service stopped");
    }

    /// Reports a call whose task died before it could report itself.
    async fn settle(
        &self,
        joined: Result<(tokio::task::Id, ()), tokio::task::JoinError>,
        pending: &mut HashMap<tokio::task::Id, (String, String)>,
    ) {
        match joined {
            Ok((id, ())) => {
                pending.remove(&id);
            }
            Err(err) => {
                let Some((call_id, tool)) = pending.remove(&err.id()) else {
                    return;
                };
                error!(%call_id, %tool, error = %err, "Tool call task aborted");
                let report = ToolReport {
                    call_id,
                    tool,
                    outcome: self.dispatcher.failed(
                        format!("tool call aborted: {err}"),
                        None,
                    ),
                };
                let _ = self.report_tx.send(report).await;
            }
        }
    }
}
