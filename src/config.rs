//! Workspace settings (`.helix/settings.json`) and in-process agent configuration.

use std::path::{Path, PathBuf};

use agent_provider_ollama::config::{DEFAULT_MODEL, DEFAULT_NUM_CTX};
use agent_provider_ollama::url::DEFAULT_OLLAMA_BASE_URL;
use command_parser::ShellDialect;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::approval::PermissionRule;
use crate::prompt::DEFAULT_SYSTEM_INSTRUCTIONS;
use crate::retry::RetryPolicy;

pub const SETTINGS_DIR: &str = ".helix";
pub const SETTINGS_FILE: &str = "settings.json";
pub const DEFAULT_MAX_ITERATIONS: usize = 20;

pub const MODEL_ENV_VAR: &str = "HELIX_MODEL";
pub const OLLAMA_URL_ENV_VAR: &str = "HELIX_OLLAMA_URL";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Permissions {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub permissions: Permissions,
    pub model: String,
    pub context_window_size: u32,
    pub max_iterations: usize,
    pub ollama_base_url: String,
    pub shell_dialect: ShellDialect,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            permissions: Permissions::default(),
            model: DEFAULT_MODEL.to_string(),
            context_window_size: DEFAULT_NUM_CTX,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            shell_dialect: ShellDialect::host(),
        }
    }
}

impl Settings {
    /// Appends `rule` to the allow list. Returns false when it was already there.
    pub fn add_allow_rule(&mut self, rule: &PermissionRule) -> bool {
        let rule = rule.to_string();
        if self.permissions.allow.contains(&rule) {
            return false;
        }
        self.permissions.allow.push(rule);
        true
    }

    /// Applies `HELIX_MODEL` and `HELIX_OLLAMA_URL` from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(model) = env_string_opt(&lookup, MODEL_ENV_VAR) {
            self.model = model;
        }
        if let Some(url) = env_string_opt(&lookup, OLLAMA_URL_ENV_VAR) {
            self.ollama_base_url = url;
        }
        self
    }
}

fn env_string_opt(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to {operation} {}: {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[must_use]
pub fn settings_path(cwd: &Path) -> PathBuf {
    cwd.join(SETTINGS_DIR).join(SETTINGS_FILE)
}

/// Reads `<cwd>/.helix/settings.json`. A missing or unreadable file yields defaults.
#[must_use]
pub fn load_settings(cwd: &Path) -> Settings {
    let path = settings_path(cwd);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Settings::default(),
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "cannot read settings; using defaults");
            return Settings::default();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(settings) => settings,
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "invalid settings file; using defaults");
            Settings::default()
        }
    }
}

pub fn save_settings(cwd: &Path, settings: &Settings) -> Result<(), SettingsError> {
    let dir = cwd.join(SETTINGS_DIR);
    std::fs::create_dir_all(&dir).map_err(|source| SettingsError::Io {
        operation: "create",
        path: dir.clone(),
        source,
    })?;

    let path = settings_path(cwd);
    let mut body = serde_json::to_string_pretty(settings)?;
    body.push('\n');
    std::fs::write(&path, body).map_err(|source| SettingsError::Io {
        operation: "write",
        path,
        source,
    })
}

/// In-process configuration handed to the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub max_iterations: usize,
    /// Full system prompt prepended to every model request.
    pub system_prompt: String,
    pub retry: RetryPolicy,
    pub shell_dialect: ShellDialect,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            system_prompt: DEFAULT_SYSTEM_INSTRUCTIONS.to_string(),
            retry: RetryPolicy::default(),
            shell_dialect: ShellDialect::host(),
        }
    }
}

impl AgentConfig {
    #[must_use]
    pub fn from_settings(settings: &Settings, system_prompt: impl Into<String>) -> Self {
        Self {
            max_iterations: settings.max_iterations.max(1),
            system_prompt: system_prompt.into(),
            retry: RetryPolicy::default(),
            shell_dialect: settings.shell_dialect,
        }
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
