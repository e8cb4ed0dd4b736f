use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response};
use serde::Deserialize;

use crate::config::{OllamaConfig, STATUS_TIMEOUT};
use crate::error::{parse_error_message, parse_retry_after, OllamaError};
use crate::payload::ChatRequest;
use crate::url::endpoint;

/// Result of probing `/api/tags`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OllamaStatus {
    pub is_running: bool,
    pub model_available: bool,
    /// Model names with the `:tag` suffix stripped.
    pub available_models: Vec<String>,
    pub error_message: Option<String>,
}

impl OllamaStatus {
    fn unreachable(message: impl Into<String>) -> Self {
        Self {
            is_running: false,
            model_available: false,
            available_models: Vec::new(),
            error_message: Some(message.into()),
        }
    }

    fn running_with_error(message: impl Into<String>) -> Self {
        Self {
            is_running: true,
            model_available: false,
            available_models: Vec::new(),
            error_message: Some(message.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    config: OllamaConfig,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self, OllamaError> {
        endpoint(&config.base_url, "api/chat")?;
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    pub fn chat_endpoint(&self) -> Result<String, OllamaError> {
        endpoint(&self.config.base_url, "api/chat")
    }

    pub fn tags_endpoint(&self) -> Result<String, OllamaError> {
        endpoint(&self.config.base_url, "api/tags")
    }

    /// Sends one chat request and returns the streaming response once the
    /// status line has been checked.
    pub async fn send_chat(&self, request: &ChatRequest) -> Result<Response, OllamaError> {
        let url = self.chat_endpoint()?;
        tracing::debug!(
            url = %url,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "sending Ollama chat request"
        );

        let response = self.http.post(url).json(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = parse_retry_after(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok()),
        );
        let body = response.text().await.unwrap_or_default();
        Err(OllamaError::Status {
            status: status.as_u16(),
            message: parse_error_message(status.as_u16(), &body),
            retry_after,
        })
    }

    /// Names of locally available models, tag suffix stripped.
    pub async fn list_models(&self) -> Result<Vec<String>, OllamaError> {
        let response = self
            .http
            .get(self.tags_endpoint()?)
            .timeout(STATUS_TIMEOUT)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(OllamaError::Status {
                status: status.as_u16(),
                message: parse_error_message(status.as_u16(), &body),
                retry_after: None,
            });
        }

        let tags: TagsResponse = serde_json::from_str(&body)?;
        Ok(tags
            .models
            .into_iter()
            .map(|model| base_model_name(&model.name).to_string())
            .collect())
    }

    /// Queries the server and checks that the configured model is pulled.
    ///
    /// Never fails: problems are reported through the returned status.
    pub async fn check_status(&self) -> OllamaStatus {
        let models = match self.list_models().await {
            Ok(models) => models,
            Err(OllamaError::Request(error)) if error.is_timeout() => {
                return OllamaStatus::unreachable("Connection to Ollama timed out");
            }
            Err(OllamaError::Request(error)) => {
                return OllamaStatus::unreachable(format!("Cannot connect to Ollama: {error}"));
            }
            Err(OllamaError::InvalidBaseUrl { url, reason }) => {
                return OllamaStatus::unreachable(format!("Invalid Ollama URL '{url}': {reason}"));
            }
            Err(OllamaError::Serde(_)) => {
                return OllamaStatus::running_with_error("Invalid response from Ollama API");
            }
            Err(other) => return OllamaStatus::running_with_error(other.to_string()),
        };

        let required = base_model_name(&self.config.model);
        OllamaStatus {
            is_running: true,
            model_available: models.iter().any(|name| name == required),
            available_models: models,
            error_message: None,
        }
    }
}

fn base_model_name(name: &str) -> &str {
    name.split(':').next().unwrap_or(name)
}
