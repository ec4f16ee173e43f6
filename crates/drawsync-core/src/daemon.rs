//! Daemon process: wires the remote editor, the dispatcher and the HTTP bridge.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

use drawsync_config::AppConfig;

use crate::dispatch::ToolDispatcher;
use crate::server::{self, RemoteEditor, ServerState};

/// Shutdown signal sent via broadcast channel.
#[derive(Debug, Clone)]
pub struct ShutdownSignal;

/// The drawsync daemon.
pub struct Daemon {
    config: AppConfig,
    editor: Arc<RemoteEditor>,
    dispatcher: Arc<ToolDispatcher>,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    _shutdown_rx: broadcast::Receiver<ShutdownSignal>,
    local_addr: OnceLock<SocketAddr>,
}

impl Daemon {
    /// Create a new daemon instance with the given configuration.
    pub fn new(config: AppConfig) -> Self {
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);
        let editor = Arc::new(RemoteEditor::new());
        let dispatcher = Arc::new(ToolDispatcher::from_config(
            editor.clone(),
            &config.engine,
        ));

        Self {
            config,
            editor,
            dispatcher,
            shutdown_tx,
            _shutdown_rx,
            local_addr: OnceLock::new(),
        }
    }

    /// Serve the HTTP bridge until Ctrl-C or [`Daemon::shutdown`].
    pub async fn run(&self) -> Result<(), DaemonError> {
        let server_config = &self.config.server;
        let addr = format!("{}:{}", server_config.listen_addr, server_config.listen_port);
        info!(
            %addr,
            export_timeout_ms = self.config.engine.export_timeout_ms,
            "drawsync daemon starting"
        );

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| DaemonError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let state = Arc::new(ServerState::new(
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.editor),
            server_config.clone(),
        ));

        // Subscribe before publishing the address so an early shutdown is not missed.
        let shutdown_rx = self.shutdown_tx.subscribe();
        let _ = self.local_addr.set(listener.local_addr()?);

        let server = server::serve(listener, state, shutdown_rx);
        tokio::pin!(server);

        tokio::select! {
            result = &mut server => {
                result?;
                info!("Daemon stopped");
                return Ok(());
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Ctrl-C received, initiating graceful shutdown");
                self.shutdown();
            }
        }

        server.await?;
        info!("Daemon stopped");
        Ok(())
    }

    /// Request a graceful shutdown of the daemon.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(ShutdownSignal);
    }

    /// Address the bridge is bound to, once [`Daemon::run`] has bound it.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    pub fn dispatcher(&self) -> &Arc<ToolDispatcher> {
        &self.dispatcher
    }

    pub fn editor(&self) -> &Arc<RemoteEditor> {
        &self.editor
    }

    /// Get a reference to the daemon's configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// Errors from the daemon runtime.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
