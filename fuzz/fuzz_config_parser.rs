//! Fuzz target for the TOML configuration parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser
//!
//! Feeds arbitrary text to `AppConfig::parse()`, covering TOML decoding and
//! the timeout and step-limit validation.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = drawsync_config::AppConfig::parse(s) {
            assert!(config.engine.export_timeout_ms > 0);
            assert!(config.engine.export_timeout_ms <= drawsync_config::MAX_EXPORT_TIMEOUT_MS);
            assert!(config.server.command_poll_secs <= drawsync_config::MAX_COMMAND_POLL_SECS);
            assert!(config.agent.max_steps > 0);
        }
    }
});
