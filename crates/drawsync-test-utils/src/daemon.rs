//! Daemon test helpers.
//!
//! Helpers for running a real [`Daemon`] in tests, bound to an ephemeral port
//! and configured from a temporary TOML file.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use drawsync_config::AppConfig;
use drawsync_core::Daemon;
use drawsync_core::daemon::DaemonError;
use tempfile::TempDir;
use tokio::task::JoinHandle;

/// A test-scoped daemon with an owned temp directory for config files.
///
/// The temp directory is deleted automatically when this value is dropped,
/// guaranteeing cleanup even on panic.
pub struct TestDaemon {
    pub daemon: Arc<Daemon>,
    pub config_path: PathBuf,
    task: Option<JoinHandle<Result<(), DaemonError>>>,
    _temp_dir: TempDir,
}

impl TestDaemon {
    /// Create a daemon from a temporary config file containing `toml_content`.
    ///
    /// The listen port is always replaced with an ephemeral one.
    pub async fn with_toml(toml_content: &str) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let config_path = temp_dir.path().join("drawsync.toml");
        tokio::fs::write(&config_path, toml_content)
            .await
            .expect("failed to write test config");

        let mut config = AppConfig::load(&config_path)
            .await
            .expect("failed to parse test config");
        config.server.listen_port = 0;

        Self {
            daemon: Arc::new(Daemon::new(config)),
            config_path,
            task: None,
            _temp_dir: temp_dir,
        }
    }

    /// Create a daemon with default config in a temp directory.
    pub async fn default_config() -> Self {
        Self::with_toml("").await
    }

    /// Spawn the daemon and wait until it is listening.
    pub async fn start(&mut self) -> SocketAddr {
        let daemon = Arc::clone(&self.daemon);
        self.task = Some(tokio::spawn(async move { daemon.run().await }));

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(addr) = self.daemon.local_addr() {
                    return addr;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("daemon did not start listening")
    }

    /// Request shutdown and wait for the daemon task to finish.
    pub async fn stop(mut self) -> Result<(), DaemonError> {
        self.daemon.shutdown();
        match self.task.take() {
            Some(task) => task.await.expect("daemon task panicked"),
            None => Ok(()),
        }
    }
}
