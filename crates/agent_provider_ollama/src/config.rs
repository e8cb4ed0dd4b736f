use std::time::Duration;

use crate::url::DEFAULT_OLLAMA_BASE_URL;

/// Model pulled by default for coding sessions.
pub const DEFAULT_MODEL: &str = "qwen3-coder";
/// Context window requested through `options.num_ctx`.
pub const DEFAULT_NUM_CTX: u32 = 128_000;
/// Budget for the `/api/tags` status check.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport configuration for Ollama requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub num_ctx: u32,
    /// Optional whole-request timeout for chat calls.
    pub timeout: Option<Duration>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            num_ctx: DEFAULT_NUM_CTX,
            timeout: None,
        }
    }
}

impl OllamaConfig {
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_num_ctx(mut self, num_ctx: u32) -> Self {
        self.num_ctx = num_ctx;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
