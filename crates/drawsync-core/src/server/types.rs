//! Request/response bodies for the HTTP bridge.
//!
//! Tool calls and reports travel as [`ToolCall`](crate::llm::ToolCall) and
//! [`ToolReport`](crate::dispatch::ToolReport) directly; the types here cover
//! everything else.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Bridge runtime status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub running: bool,
    pub version: String,
    pub uptime_secs: u64,
    pub editor_attached: bool,
    pub export_pending: bool,
    pub history_len: usize,
    pub history_cursor: Option<usize>,
}

/// Optional long-poll window override for `GET /editor/commands`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollParams {
    /// Milliseconds to wait; capped at the configured window.
    pub wait_ms: Option<u64>,
}

/// An export the editor finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRequest {
    /// Ticket from the `export` command being answered.
    pub ticket: u64,
    pub document: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    /// Whether the request behind the ticket was still waiting and took the document.
    pub awaited: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreRequest {
    pub position: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreResponse {
    pub position: usize,
    pub document: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearResponse {
    pub cleared: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
