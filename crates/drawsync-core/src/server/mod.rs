//! HTTP bridge: lets a browser-hosted editor act as the engine's [`EditorPort`].
//!
//! The editor long-polls for commands and posts its exports back; tool calls
//! and history controls arrive as JSON requests.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  GET  /editor/commands   ┌──────────────┐
//! │   Browser    │◀─────────────────────────│  HTTP bridge │
//! │   editor     │  POST /editor/export     │  (axum)      │
//! └──────────────┘─────────────────────────▶└──────┬───────┘
//!                                                  │ POST /tools
//!                                           ┌──────▼───────┐
//!                                           │ToolDispatcher│
//!                                           └──────────────┘
//! ```
//!
//! [`EditorPort`]: crate::editor::EditorPort

pub mod remote;
pub mod routes;
pub mod types;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

use crate::daemon::ShutdownSignal;

pub use remote::{EditorCommand, RemoteEditor};
pub use routes::{ServerState, router};
pub use types::*;

/// Serve the bridge on `listener` until the shutdown signal is received.
pub async fn serve(
    listener: TcpListener,
    state: Arc<ServerState>,
    mut shutdown_rx: broadcast::Receiver<ShutdownSignal>,
) -> Result<(), std::io::Error> {
    info!(addr = %listener.local_addr()?, "HTTP bridge listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("HTTP bridge shutting down");
        })
        .await
}
