//! Configuration builders for tests.

use drawsync_config::AppConfig;

/// Fluent builder for [`AppConfig`] in tests.
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .export_timeout_ms(50)
///     .ephemeral_port()
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn export_timeout_ms(mut self, ms: u64) -> Self {
        self.config.engine.export_timeout_ms = ms;
        self
    }

    pub fn max_steps(mut self, steps: usize) -> Self {
        self.config.agent.max_steps = steps;
        self
    }

    pub fn model(mut self, model: &str) -> Self {
        self.config.agent.model = model.to_string();
        self
    }

    pub fn listen_addr(mut self, addr: &str) -> Self {
        self.config.server.listen_addr = addr.to_string();
        self
    }

    pub fn listen_port(mut self, port: u16) -> Self {
        self.config.server.listen_port = port;
        self
    }

    /// Let the OS pick the port. Such a config no longer passes `validate()`,
    /// which is fine for daemons built directly from it.
    pub fn ephemeral_port(self) -> Self {
        self.listen_port(0)
    }

    pub fn command_poll_secs(mut self, secs: u64) -> Self {
        self.config.server.command_poll_secs = secs;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
