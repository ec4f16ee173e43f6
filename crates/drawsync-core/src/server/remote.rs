//! Editor port backed by a browser editor that polls for commands.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::editor::{EditorPort, ExportHandler, LoadFailure};
use crate::export::deadline_after;

/// Work for the attached editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum EditorCommand {
    /// Export the current document and post it back to `/editor/export`
    /// together with `ticket`.
    Export { ticket: u64 },
    /// Replace the displayed document.
    Load { document: String },
}

/// [`EditorPort`] whose editor lives on the other side of the HTTP bridge.
///
/// Commands are broadcast to every subscriber. The bridge's own mailbox keeps
/// them buffered between polls, so a command issued while no poll is open is
/// delivered on the next one.
pub struct RemoteEditor {
    sender: broadcast::Sender<EditorCommand>,
    mailbox: tokio::sync::Mutex<broadcast::Receiver<EditorCommand>>,
    handler: Mutex<Option<ExportHandler>>,
    attached: AtomicBool,
}

impl RemoteEditor {
    pub fn new() -> Self {
        let (sender, mailbox) = broadcast::channel(64);
        Self {
            sender,
            mailbox: tokio::sync::Mutex::new(mailbox),
            handler: Mutex::new(None),
            attached: AtomicBool::new(false),
        }
    }

    /// Observe every command sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EditorCommand> {
        self.sender.subscribe()
    }

    /// Whether an editor has polled for commands at least once.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Wait up to `wait` for the next command from the mailbox.
    ///
    /// Calling this marks the editor as attached.
    pub async fn next_command(&self, wait: Duration) -> Option<EditorCommand> {
        if !self.attached.swap(true, Ordering::AcqRel) {
            debug!("Editor attached");
        }

        let deadline = deadline_after(wait);
        let mut mailbox = self.mailbox.lock().await;
        loop {
            match tokio::time::timeout_at(deadline, mailbox.recv()).await {
                Ok(Ok(command)) => return Some(command),
                Ok(Err(RecvError::Lagged(skipped))) => {
                    warn!(skipped, "Editor fell behind, oldest commands dropped");
                }
                Ok(Err(RecvError::Closed)) | Err(_) => return None,
            }
        }
    }

    /// The editor finished the export for `ticket`.
    ///
    /// Returns `false` if the request behind `ticket` is no longer waiting.
    pub fn export_complete(&self, ticket: u64, document: String) -> bool {
        let handler = self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match handler {
            Some(handler) => handler(ticket, document),
            None => {
                warn!("Export posted before any handler was registered");
                false
            }
        }
    }
}

impl Default for RemoteEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorPort for RemoteEditor {
    fn trigger_export(&self, ticket: u64) {
        if !self.is_attached() {
            warn!(ticket, "Export requested with no editor attached");
        }
        // The mailbox receiver keeps the channel open, so this cannot fail.
        let _ = self.sender.send(EditorCommand::Export { ticket });
    }

    fn on_export_complete(&self, handler: ExportHandler) {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    fn replace_visible_document(&self, document: &str) -> Result<(), LoadFailure> {
        if !self.is_attached() {
            return Err(LoadFailure::new("no editor is attached"));
        }
        let _ = self.sender.send(EditorCommand::Load {
            document: document.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const WAIT: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn test_load_requires_attached_editor() {
        let editor = RemoteEditor::new();
        assert!(editor.replace_visible_document("<mxGraphModel/>").is_err());

        assert_eq!(editor.next_command(WAIT).await, None);
        assert!(editor.is_attached());
        editor.replace_visible_document("<mxGraphModel/>").unwrap();
        assert_eq!(
            editor.next_command(WAIT).await,
            Some(EditorCommand::Load {
                document: "<mxGraphModel/>".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_commands_buffer_between_polls() {
        let editor = RemoteEditor::new();
        editor.trigger_export(1);
        editor.trigger_export(2);
        assert_eq!(
            editor.next_command(WAIT).await,
            Some(EditorCommand::Export { ticket: 1 })
        );
        assert_eq!(
            editor.next_command(WAIT).await,
            Some(EditorCommand::Export { ticket: 2 })
        );
        assert_eq!(editor.next_command(WAIT).await, None);
    }

    #[tokio::test]
    async fn test_unbounded_poll_window_does_not_overflow() {
        let editor = RemoteEditor::new();
        editor.trigger_export(1);
        assert_eq!(
            editor.next_command(Duration::MAX).await,
            Some(EditorCommand::Export { ticket: 1 })
        );
    }

    #[tokio::test]
    async fn test_subscribers_see_broadcasts() {
        let editor = RemoteEditor::new();
        let mut observer = editor.subscribe();
        editor.trigger_export(5);
        assert_eq!(
            observer.recv().await.unwrap(),
            EditorCommand::Export { ticket: 5 }
        );
    }

    #[test]
    fn test_export_complete_reaches_handler() {
        let editor = RemoteEditor::new();
        assert!(!editor.export_complete(1, "early".to_string()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        editor.on_export_complete(Arc::new(move |ticket: u64, doc: String| {
            sink.lock().unwrap().push((ticket, doc));
            ticket == 2
        }));
        assert!(!editor.export_complete(1, "stale".to_string()));
        assert!(editor.export_complete(2, "<mxGraphModel/>".to_string()));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_command_wire_format() {
        let json = serde_json::to_value(EditorCommand::Load {
            document: "<x/>".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "command": "load", "document": "<x/>" }));
        assert_eq!(
            serde_json::to_value(EditorCommand::Export { ticket: 3 }).unwrap(),
            serde_json::json!({ "command": "export", "ticket": 3 })
        );
    }
}
