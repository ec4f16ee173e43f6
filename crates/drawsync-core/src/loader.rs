//! Diagram Loader: the only way a document becomes visible.
//!
//! Every successful load is recorded into [`History`]. A load the editor
//! rejects leaves both the visible document and the history untouched.

use std::sync::Arc;

use tracing::{debug, info};

use crate::editor::{EditorPort, LoadFailure};
use crate::history::{History, HistoryError, Snapshot, SnapshotOrigin};
use crate::xml;

/// Errors from browsing or clearing through the loader.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Load(#[from] LoadFailure),
}

/// Owns the visible document and the history of everything shown.
pub struct DiagramLoader {
    editor: Arc<dyn EditorPort>,
    history: History,
    visible: String,
}

impl DiagramLoader {
    /// Create a loader over `editor`, assuming it starts on the empty canvas.
    pub fn new(editor: Arc<dyn EditorPort>) -> Self {
        Self {
            editor,
            history: History::new(),
            visible: xml::EMPTY_DIAGRAM.to_string(),
        }
    }

    /// Make `document` visible and append it to the history.
    ///
    /// Returns the new snapshot's history position.
    pub fn load_diagram(
        &mut self,
        document: &str,
        origin: SnapshotOrigin,
    ) -> Result<usize, LoadFailure> {
        self.editor.replace_visible_document(document)?;
        self.visible = document.to_string();
        let position = self.history.push(Snapshot::new(document, origin));
        info!(position, origin = ?origin, bytes = document.len(), "Diagram loaded");
        Ok(position)
    }

    /// Show the snapshot at `position` without changing the history's contents.
    pub fn restore(&mut self, position: usize) -> Result<&Snapshot, LoaderError> {
        let document = self
            .history
            .get(position)
            .ok_or(HistoryError::OutOfRange {
                position,
                len: self.history.len(),
            })?
            .document()
            .to_string();

        self.editor.replace_visible_document(&document)?;
        self.visible = document;
        let snapshot = self.history.restore(position)?;
        debug!(position, "History position restored");
        Ok(snapshot)
    }

    /// Empty the history and reset the canvas to the canonical empty diagram.
    pub fn clear(&mut self) -> Result<(), LoadFailure> {
        self.editor.replace_visible_document(xml::EMPTY_DIAGRAM)?;
        self.visible = xml::EMPTY_DIAGRAM.to_string();
        self.history.clear();
        info!("Diagram and history cleared");
        Ok(())
    }

    /// The document most recently made visible through this loader.
    pub fn visible(&self) -> &str {
        &self.visible
    }

    pub fn history(&self) -> &History {
        &self.history
    }
}
