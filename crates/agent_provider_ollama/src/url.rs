use url::Url;

use crate::error::OllamaError;

/// Default base URL of a local Ollama server.
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Joins `path` onto `base`, falling back to the default base when blank.
///
/// Any path on the base is kept, so `http://host/ollama/` + `api/chat`
/// becomes `http://host/ollama/api/chat`.
pub fn endpoint(base: &str, path: &str) -> Result<String, OllamaError> {
    let base = match base.trim() {
        "" => DEFAULT_OLLAMA_BASE_URL,
        trimmed => trimmed,
    };
    let parsed = Url::parse(base).map_err(|error| OllamaError::InvalidBaseUrl {
        url: base.to_string(),
        reason: error.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(OllamaError::InvalidBaseUrl {
            url: base.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }

    let trimmed = parsed.as_str().trim_end_matches('/');
    Ok(format!("{trimmed}/{}", path.trim_start_matches('/')))
}
