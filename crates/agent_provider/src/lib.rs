//! Minimal provider-agnostic contract for one model completion.
//!
//! This crate defines only the message history, tool-calling envelopes, and
//! the streamed response shape shared by the agent loop and its providers.
//! It excludes transport details, retry policy, and loop orchestration.

use std::fmt;
use std::sync::{atomic::AtomicBool, Arc};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Shared cancellation flag for an in-flight turn.
pub type CancelSignal = Arc<AtomicBool>;

/// Ordered mapping of parameter name to stringified value.
///
/// Values are kept as display strings: they feed permission matching and the
/// approval prompt, never typed invocation.
pub type ToolArguments = IndexMap<String, String>;

/// Lazy, finite, non-restartable sequence of response fragments.
pub type ResponseStream = BoxStream<'static, Result<ResponseFragment, ProviderError>>;

/// Error returned while constructing/configuring a provider before any call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInitError {
    message: String,
}

impl ProviderInitError {
    /// Creates a new provider initialization error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the underlying error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ProviderInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProviderInitError {}

impl From<String> for ProviderInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ProviderInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Failure of a single model call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Transient rate limiting; the only class the agent retries.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Authentication failure, malformed request, or any other non-retryable status.
    #[error("{}", permanent_display(*status, message))]
    Permanent { status: Option<u16>, message: String },

    /// Connection-level failure before a response arrived.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ProviderError {
    #[must_use]
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after,
        }
    }

    #[must_use]
    pub fn permanent(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Permanent {
            status,
            message: message.into(),
        }
    }

    /// Returns true for provider-signalled rate limiting.
    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Provider-supplied retry hint, when one accompanied a rate limit.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

fn permanent_display(status: Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("HTTP {status} {message}"),
        None => message.to_string(),
    }
}

/// Provider-neutral model-facing message history item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum RunMessage {
    System {
        text: String,
    },
    UserText {
        text: String,
    },
    AssistantText {
        text: String,
    },
    ToolCall {
        call_id: String,
        tool_name: String,
        arguments: ToolArguments,
    },
    ToolResult {
        call_id: String,
        tool_name: String,
        content: String,
        is_error: bool,
    },
}

impl RunMessage {
    #[must_use]
    pub fn is_system(&self) -> bool {
        matches!(self, Self::System { .. })
    }

    /// Correlation id for tool request/result messages.
    #[must_use]
    pub fn call_id(&self) -> Option<&str> {
        match self {
            Self::ToolCall { call_id, .. } | Self::ToolResult { call_id, .. } => Some(call_id),
            _ => None,
        }
    }
}

/// Generic host-mediated tool definition advertised to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// One tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: ToolArguments,
}

impl ToolCallRequest {
    #[must_use]
    pub fn new(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: ToolArguments,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }

    /// The history entry recording this request.
    #[must_use]
    pub fn to_message(&self) -> RunMessage {
        RunMessage::ToolCall {
            call_id: self.call_id.clone(),
            tool_name: self.tool_name.clone(),
            arguments: self.arguments.clone(),
        }
    }
}

/// Host tool call result fed back to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub is_error: bool,
    pub content: String,
}

impl ToolResult {
    /// Constructs a successful tool result.
    #[must_use]
    pub fn success(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            is_error: false,
            content: content.into(),
        }
    }

    /// Constructs a tool error result.
    #[must_use]
    pub fn error(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            is_error: true,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn into_message(self) -> RunMessage {
        RunMessage::ToolResult {
            call_id: self.call_id,
            tool_name: self.tool_name,
            content: self.content,
            is_error: self.is_error,
        }
    }
}

/// Input for one model call: full history (system prompt already prepended)
/// plus the advertised tools.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<RunMessage>,
    pub tools: Vec<ToolDefinition>,
}

/// One piece of a streamed model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseFragment {
    Text(String),
    ToolCall(ToolCallRequest),
}

/// Accumulated model response: text, tool requests, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ModelResponse {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Appends one fragment, preserving tool request order.
    pub fn push(&mut self, fragment: ResponseFragment) {
        match fragment {
            ResponseFragment::Text(text) => self.text.push_str(&text),
            ResponseFragment::ToolCall(call) => self.tool_calls.push(call),
        }
    }

    /// Drains a response stream into one logical response.
    pub async fn collect(mut stream: ResponseStream) -> Result<Self, ProviderError> {
        let mut response = Self::default();
        while let Some(fragment) = stream.next().await {
            response.push(fragment?);
        }
        Ok(response)
    }

    /// True when the response carries no tool requests.
    #[must_use]
    pub fn is_plain_text(&self) -> bool {
        self.tool_calls.is_empty()
    }

    /// Returns the text when it carries anything besides whitespace.
    #[must_use]
    pub fn visible_text(&self) -> Option<&str> {
        let trimmed = self.text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    }
}

/// Builds a response stream from already-materialized fragments.
#[must_use]
pub fn fragment_stream(fragments: Vec<Result<ResponseFragment, ProviderError>>) -> ResponseStream {
    stream::iter(fragments).boxed()
}

/// Converts JSON tool arguments into display strings.
///
/// String values are kept verbatim; everything else is rendered as compact
/// JSON. Non-object input is stored under the `input` key.
#[must_use]
pub fn stringify_arguments(value: &Value) -> ToolArguments {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| (key.clone(), stringify_value(value)))
            .collect(),
        Value::Null => ToolArguments::new(),
        other => {
            let mut arguments = ToolArguments::new();
            arguments.insert("input".to_string(), stringify_value(other));
            arguments
        }
    }
}

fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Immutable metadata describing a model provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider_id: String,
    pub model_id: String,
}

/// Provider interface for executing one model call.
#[async_trait]
pub trait ModelProvider: Send + Sync + 'static {
    /// Returns provider/model identity metadata.
    fn profile(&self) -> ProviderProfile;

    /// Starts one completion and returns its fragment stream.
    ///
    /// Errors may surface either from this call or from any stream item.
    async fn complete(&self, request: CompletionRequest) -> Result<ResponseStream, ProviderError>;
}
