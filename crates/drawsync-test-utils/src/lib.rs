#![deny(unsafe_code)]

//! Shared test utilities for the drawsync workspace.
//!
//! Provides reusable fixtures, config builders, a scripted conversation
//! provider, and tracing helpers so that individual crate tests stay concise
//! and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! drawsync-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod daemon;
pub mod fixtures;
pub mod provider;
pub mod tracing_setup;
