use std::path::PathBuf;

use agent_provider::ProviderError;
use conversation_store::StoreError;
use thiserror::Error;

use crate::tools::RegistryError;

/// Failure surfaced to whoever drives a turn.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("no pending call {call_id} in conversation {conversation_id}")]
    PendingCallNotFound {
        conversation_id: String,
        call_id: String,
    },

    #[error("conversation {0} not found")]
    ConversationNotFound(String),

    #[error("model call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(StoreError),

    #[error("a turn is already running for conversation {0}")]
    TurnInProgress(String),

    #[error("conversation {conversation_id} is waiting on approval for {}", call_ids.join(", "))]
    ConversationPaused {
        conversation_id: String,
        call_ids: Vec<String>,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl From<StoreError> for AgentError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { id } => Self::ConversationNotFound(id),
            other => Self::Store(other),
        }
    }
}

impl AgentError {
    /// True when the store rejected a stale write.
    #[must_use]
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::ConcurrencyConflict { .. }))
    }
}

/// Failure of one tool invocation. Rendered into the tool result, never propagated.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("missing required argument `{0}`")]
    MissingArgument(String),

    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("Path escapes workspace root: {}", .0.display())]
    WorkspaceEscape(PathBuf),

    #[error("{operation} {}: {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Execution(String),

    #[error("command timed out after {0}s")]
    Timeout(u64),
}

impl ToolError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
