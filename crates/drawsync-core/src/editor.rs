//! Editor ports: the boundary between the engine and the embedded diagram editor.
//!
//! The editor's rendering, import and export mechanics stay outside this crate.
//! The engine only needs three things from it:
//!
//! - [`EditorPort::trigger_export`]: fire-and-forget request for the live document,
//!   tagged with a ticket the editor echoes back
//! - [`EditorPort::on_export_complete`]: where the finished export is delivered
//! - [`EditorPort::replace_visible_document`]: the load primitive
//!
//! [`HeadlessEditor`] is an in-process implementation used by the CLI and tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::xml;

/// Callback invoked with the ticket of the export request and the exported
/// document text. Returns whether a waiting request accepted the document.
pub type ExportHandler = Arc<dyn Fn(u64, String) -> bool + Send + Sync>;

/// The editor rejected a full-document load.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("editor rejected the diagram: {reason}")]
pub struct LoadFailure {
    pub reason: String,
}

impl LoadFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Port to an embedded diagram editor.
///
/// Implementations must be `Send + Sync`; the engine shares one port between
/// the export bridge and the loader.
pub trait EditorPort: Send + Sync {
    /// Ask the editor to export its current document. The result arrives later
    /// through the registered export handler, carrying `ticket`, or never.
    fn trigger_export(&self, ticket: u64);

    /// Register the handler that receives completed exports, replacing any
    /// previously registered one.
    fn on_export_complete(&self, handler: ExportHandler);

    /// Replace the document the editor displays.
    fn replace_visible_document(&self, document: &str) -> Result<(), LoadFailure>;
}

/// How a [`HeadlessEditor`] answers export requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportMode {
    /// Deliver synchronously from inside `trigger_export`.
    #[default]
    Immediate,
    /// Deliver from a spawned task after the given delay.
    Delayed(Duration),
    /// Hold the request until [`HeadlessEditor::flush_exports`] is called.
    Silent,
}

#[derive(Default)]
struct HeadlessState {
    document: String,
    handler: Option<ExportHandler>,
    mode: ExportMode,
    held_exports: VecDeque<u64>,
    reject_loads: bool,
    loads: usize,
}

/// An in-process editor without a rendering surface.
///
/// Accepts any document rooted at `<mxGraphModel>` and exports whatever it
/// currently holds.
pub struct HeadlessEditor {
    state: Mutex<HeadlessState>,
}

impl HeadlessEditor {
    /// Create an editor showing the canonical empty canvas.
    pub fn new() -> Self {
        Self::with_document(xml::EMPTY_DIAGRAM)
    }

    /// Create an editor that already shows `document`.
    pub fn with_document(document: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(HeadlessState {
                document: document.into(),
                ..HeadlessState::default()
            }),
        }
    }

    /// Builder: set the export answering mode.
    pub fn with_export_mode(self, mode: ExportMode) -> Self {
        self.set_export_mode(mode);
        self
    }

    pub fn set_export_mode(&self, mode: ExportMode) {
        self.lock().mode = mode;
    }

    /// Make every subsequent load fail (or succeed again).
    pub fn set_reject_loads(&self, reject: bool) {
        self.lock().reject_loads = reject;
    }

    /// The document currently on the canvas.
    pub fn document(&self) -> String {
        self.lock().document.clone()
    }

    /// Overwrite the canvas directly, as a user editing by hand would.
    pub fn user_edit(&self, document: impl Into<String>) {
        self.lock().document = document.into();
    }

    /// Number of successful loads so far.
    pub fn load_count(&self) -> usize {
        self.lock().loads
    }

    /// Number of export requests held back in [`ExportMode::Silent`].
    pub fn held_exports(&self) -> usize {
        self.lock().held_exports.len()
    }

    /// Deliver every held export now, oldest first. Returns how many were delivered.
    pub fn flush_exports(&self) -> usize {
        let (handler, document, tickets) = {
            let mut state = self.lock();
            let tickets = std::mem::take(&mut state.held_exports);
            (state.handler.clone(), state.document.clone(), tickets)
        };
        if let Some(handler) = handler {
            for &ticket in &tickets {
                handler(ticket, document.clone());
            }
        }
        tickets.len()
    }

    /// Deliver only the oldest held export.
    ///
    /// Returns `None` if nothing was held, otherwise whether a waiting request
    /// accepted the document.
    pub fn release_next_export(&self) -> Option<bool> {
        let (handler, document, ticket) = {
            let mut state = self.lock();
            let ticket = state.held_exports.pop_front()?;
            (state.handler.clone(), state.document.clone(), ticket)
        };
        Some(handler.is_some_and(|handler| handler(ticket, document)))
    }

    fn lock(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for HeadlessEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorPort for HeadlessEditor {
    fn trigger_export(&self, ticket: u64) {
        let (mode, handler, document) = {
            let mut state = self.lock();
            if state.mode == ExportMode::Silent {
                state.held_exports.push_back(ticket);
                debug!(ticket, held = state.held_exports.len(), "Headless export held");
                return;
            }
            (state.mode, state.handler.clone(), state.document.clone())
        };

        let Some(handler) = handler else {
            debug!("Headless export requested with no handler registered");
            return;
        };

        match mode {
            ExportMode::Immediate => {
                handler(ticket, document);
            }
            ExportMode::Delayed(delay) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    handler(ticket, document);
                });
            }
            ExportMode::Silent => {}
        }
    }

    fn on_export_complete(&self, handler: ExportHandler) {
        self.lock().handler = Some(handler);
    }

    fn replace_visible_document(&self, document: &str) -> Result<(), LoadFailure> {
        let mut state = self.lock();
        if state.reject_loads {
            return Err(LoadFailure::new("editor is not accepting documents"));
        }
        if !xml::is_graph_model(document) {
            return Err(LoadFailure::new(
                "document is not rooted at an <mxGraphModel> element",
            ));
        }
        state.document = document.to_string();
        state.loads += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture() -> (ExportHandler, Arc<Mutex<Vec<(u64, String)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: ExportHandler = Arc::new(move |ticket, doc| {
            sink.lock().unwrap().push((ticket, doc));
            true
        });
        (handler, seen)
    }

    #[test]
    fn test_immediate_export_delivers_current_document() {
        let editor = HeadlessEditor::new();
        let (handler, seen) = capture();
        editor.on_export_complete(handler);

        editor.trigger_export(7);
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            [(7, xml::EMPTY_DIAGRAM.to_string())]
        );
    }

    #[test]
    fn test_silent_export_is_held_until_flush() {
        let editor = HeadlessEditor::new().with_export_mode(ExportMode::Silent);
        let (handler, seen) = capture();
        editor.on_export_complete(handler);

        editor.trigger_export(1);
        editor.trigger_export(2);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(editor.held_exports(), 2);

        assert_eq!(editor.flush_exports(), 2);
        let tickets: Vec<u64> = seen.lock().unwrap().iter().map(|(t, _)| *t).collect();
        assert_eq!(tickets, [1, 2]);
        assert_eq!(editor.held_exports(), 0);
    }

    #[test]
    fn test_release_next_export_goes_oldest_first() {
        let editor = HeadlessEditor::new().with_export_mode(ExportMode::Silent);
        assert_eq!(editor.release_next_export(), None);

        let (handler, seen) = capture();
        editor.on_export_complete(handler);
        editor.trigger_export(3);
        editor.trigger_export(4);

        assert_eq!(editor.release_next_export(), Some(true));
        assert_eq!(seen.lock().unwrap()[0].0, 3);
        assert_eq!(editor.held_exports(), 1);
    }

    #[tokio::test]
    async fn test_delayed_export() {
        let editor =
            HeadlessEditor::new().with_export_mode(ExportMode::Delayed(Duration::from_millis(20)));
        let (handler, seen) = capture();
        editor.on_export_complete(handler);

        editor.trigger_export(1);
        assert!(seen.lock().unwrap().is_empty());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_load_rejects_unrooted_markup() {
        let editor = HeadlessEditor::new();
        let err = editor.replace_visible_document("<root/>").unwrap_err();
        assert!(err.reason.contains("mxGraphModel"));
        assert_eq!(editor.document(), xml::EMPTY_DIAGRAM);
        assert_eq!(editor.load_count(), 0);
    }

    #[test]
    fn test_forced_rejection() {
        let editor = HeadlessEditor::new();
        editor.set_reject_loads(true);
        assert!(editor.replace_visible_document(xml::EMPTY_DIAGRAM).is_err());
        editor.set_reject_loads(false);
        assert!(editor.replace_visible_document(xml::EMPTY_DIAGRAM).is_ok());
        assert_eq!(editor.load_count(), 1);
    }
}
