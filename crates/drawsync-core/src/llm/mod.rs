//! Conversation types and the provider boundary.
//!
//! The streaming conversation loop and provider selection live outside this
//! crate. What stays here is the shared vocabulary ([`ChatMessage`],
//! [`ToolCall`], [`ToolDefinition`]) and the [`LlmProvider`] trait the
//! [`DiagramSession`](crate::session::DiagramSession) drives.

pub mod provider;
pub mod types;

pub use provider::{LlmError, LlmProvider};
pub use types::*;
