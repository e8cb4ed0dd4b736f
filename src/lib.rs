//! Helix: a resumable coding-agent loop.
//!
//! The [`Agent`] calls a model, runs the tools it asks for, and pauses on
//! requests that need a human decision. Paused turns live in a
//! [`ConversationStore`](conversation_store::ConversationStore) and resume
//! when the last pending call is resolved.
//!
//! # Public API Overview
//! - Drive turns with [`Agent::submit_prompt`], [`Agent::resolve_pending_call`] and [`Agent::cancel`].
//! - Decide what may run unattended with [`ApprovalGate`] and [`PermissionRule`].
//! - Register host tools in a [`ToolRegistry`]; [`BuiltinTools`] provides the stock set.
//! - Observe progress through a [`NotificationSink`].

pub mod agent;
pub mod approval;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod prompt;
pub mod retry;
pub mod tools;

pub use agent::{Agent, TurnOutcome};
pub use approval::{ApprovalGate, GateDecision, PermissionRule, SHELL_TOOL_NAME};
pub use config::{load_settings, save_settings, AgentConfig, Permissions, Settings, SettingsError};
pub use error::{AgentError, ToolError};
pub use notify::{AgentEvent, NotificationSink, NullSink, RecordingSink};
pub use retry::RetryPolicy;
pub use tools::{BuiltinTools, RegistryError, Tool, ToolCategory, ToolRegistry};
