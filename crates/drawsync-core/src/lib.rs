#![deny(unsafe_code)]

//! drawsync core: the diagram patch and synchronization engine.
//!
//! An AI agent edits a diagram that lives inside an embedded editor by issuing
//! tool calls. This crate turns those calls into document operations:
//!
//! ```text
//! ToolCall ──▶ ToolDispatcher ──┬─ edit_diagram ──▶ ExportBridge ──▶ apply_edits ──┐
//!                               │                                                 ▼
//!                               └─ display_diagram ───────────────────────▶ DiagramLoader ──▶ History
//! ```
//!
//! The editor itself stays outside, reached through the [`EditorPort`] trait.

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future: the standard return type for async
/// trait methods that require dynamic dispatch (`dyn Trait`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Daemon runtime hosting the HTTP bridge.
pub mod daemon;
/// Tool Dispatch Loop: routes tool calls onto engine operations.
pub mod dispatch;
/// Editor port trait and the in-process headless editor.
pub mod editor;
/// Export Bridge: one live snapshot from the editor, under a deadline.
pub mod export;
/// Browsable store of full document snapshots.
pub mod history;
/// Conversation types and the provider trait.
pub mod llm;
/// Diagram Loader: makes a document visible and records it.
pub mod loader;
/// Patch Applier: atomic ordered search/replace.
pub mod patch;
/// HTTP bridge for browser-hosted editors.
pub mod server;
/// Conversation driver that feeds tool calls into the dispatcher.
pub mod session;
/// Tool definitions and the tool-call boundary.
pub mod tools;
/// Document helpers: canonical empty canvas, normalization, formatting.
pub mod xml;

pub use daemon::Daemon;
pub use dispatch::{DispatchHandle, DispatchService, ToolDispatcher, ToolOutcome, ToolReport};
pub use editor::{EditorPort, ExportHandler, ExportMode, HeadlessEditor, LoadFailure};
pub use export::{ExportBridge, ExportError};
pub use history::{History, HistoryError, Snapshot, SnapshotOrigin};
pub use loader::{DiagramLoader, LoaderError};
pub use patch::{EditOperation, PatchError, apply_edits};
pub use session::{DiagramSession, SessionError};
pub use tools::{DiagramCall, ToolCallError};
