use std::sync::OnceLock;
use std::time::Duration;

use agent_provider::ProviderError;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("invalid Ollama base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status} {message}")]
    Status {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("stream failed: {0}")]
    StreamFailed(String),
}

impl OllamaError {
    /// Whether a retry after a pause could succeed.
    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        match self {
            Self::Status {
                status, message, ..
            } => *status == 429 || is_rate_limit_message(message),
            Self::StreamFailed(message) => is_rate_limit_message(message),
            _ => false,
        }
    }
}

impl From<OllamaError> for ProviderError {
    fn from(error: OllamaError) -> Self {
        if error.is_rate_limit() {
            let retry_after = match &error {
                OllamaError::Status { retry_after, .. } => *retry_after,
                _ => None,
            };
            return ProviderError::rate_limited(error.to_string(), retry_after);
        }
        match error {
            OllamaError::Status {
                status, message, ..
            } => ProviderError::permanent(Some(status), message),
            OllamaError::Request(error) => ProviderError::Transport(error.to_string()),
            other => ProviderError::permanent(None, other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: Option<String>,
}

fn rate_limit_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)rate.?limit|too many requests|server busy|overloaded")
            .expect("rate limit regex must compile")
    })
}

pub fn is_rate_limit_message(message: &str) -> bool {
    rate_limit_regex().is_match(message)
}

/// Error text from an Ollama error body (`{"error": "..."}`), the raw body, or
/// the status reason.
pub fn parse_error_message(status: u16, body: &str) -> String {
    let body = body.trim();
    if let Ok(ErrorPayload {
        error: Some(message),
    }) = serde_json::from_str::<ErrorPayload>(body)
    {
        if !message.trim().is_empty() {
            return message;
        }
    }
    if !body.is_empty() {
        return body.to_string();
    }
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("request failed")
        .to_string()
}

/// `Retry-After` in delta-seconds. HTTP-date values are ignored.
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    let seconds = value?.trim().parse::<f64>().ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        Some(Duration::from_secs_f64(seconds))
    } else {
        None
    }
}
